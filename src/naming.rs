//! Identifier-safe names for wells, properties and sources.
//!
//! These only produce lookup keys; data values are never touched.

/// Sanitise a property (or source) name.
///
/// Every character that is not ASCII alphanumeric or `_` becomes `_`, and a
/// leading digit gets a `_` prefix so the result is a valid identifier.
///
/// `"Zoneloglinkedto'CerisaTops'"` → `"Zoneloglinkedto_CerisaTops_"`.
pub fn sanitize_property_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Sanitise a well name.
///
/// Runs of separators collapse into a single `_` and leading/trailing
/// separators are dropped: `"36/7-5 A"` → `"36_7_5_A"`. Unlike property names
/// a leading digit is kept, because manager keys carry a `well_` prefix.
pub fn sanitize_well_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Manager key for a well: `well_{sanitized}`.
pub fn well_key(name: &str) -> String {
    format!("well_{}", sanitize_well_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_become_identifiers() {
        assert_eq!(
            sanitize_property_name("Zoneloglinkedto'CerisaTops'"),
            "Zoneloglinkedto_CerisaTops_"
        );
        assert_eq!(sanitize_property_name("PHIE"), "PHIE");
        assert_eq!(sanitize_property_name("NTG Flag"), "NTG_Flag");
        assert_eq!(sanitize_property_name("2025_SW"), "_2025_SW");
        assert_eq!(sanitize_property_name(""), "_");
    }

    #[test]
    fn well_names_collapse_separators() {
        assert_eq!(sanitize_well_name("36/7-5 A"), "36_7_5_A");
        assert_eq!(sanitize_well_name("12/3-2 B"), "12_3_2_B");
        assert_eq!(sanitize_well_name(" well--A "), "well_A");
        assert_eq!(well_key("36/7-5 A"), "well_36_7_5_A");
    }
}
