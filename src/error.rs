use thiserror::Error;

/// Errors raised by the property, well and manager layers.
///
/// Messages list the available alternatives where that helps, but only the
/// variant is meant to be matched on.
#[derive(Debug, Error)]
pub enum WellLogError {
    /// A property could not be resolved, or a property has no parent well to
    /// resolve filter names against.
    #[error("{0}")]
    PropertyNotFound(String),

    /// A property of the wrong kind was used, e.g. filtering by a continuous log.
    #[error("{0}")]
    PropertyType(String),

    /// A name matches properties in more than one source of the same well.
    #[error("{0}")]
    AmbiguousProperty(String),

    /// Depth ranges do not overlap or an interpolator could not be built.
    #[error("depth alignment failed: {0}")]
    DepthAlignment(String),

    /// Well-level failure: missing depth column, grid mismatch, empty well.
    #[error("{0}")]
    Well(String),

    #[error("{0}")]
    WellNotFound(String),

    #[error("{0}")]
    WellNameMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Ingestion failed in the data layer.
    #[error("load failed: {0:#}")]
    Load(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WellLogError>;

/// Join names for "available: ..." style messages.
pub(crate) fn list_or_none<S: AsRef<str>>(names: &[S]) -> String {
    if names.is_empty() {
        return "none".to_string();
    }
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
