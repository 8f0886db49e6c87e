use thiserror::Error;

/// An anchor that no longer resolves against the current document.
/// Callers hide the annotation instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    #[error("anchor {from}..{to} is out of range (length {len})")]
    OutOfRange { from: usize, to: usize, len: usize },

    #[error("malformed anchor: {0}")]
    Malformed(String),
}

/// Invalid grouping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown grouping '{0}' (expected one of: {presets})", presets = crate::grouping::PRESETS.join(", "))]
    UnknownGrouping(String),

    #[error("batch_size must be at least 1")]
    ZeroBatchSize,
}
