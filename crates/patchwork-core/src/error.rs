use thiserror::Error;

use crate::types::ChangeHash;

/// Errors raised while decoding changes or querying a change log.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed change: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("change hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch {
        recorded: ChangeHash,
        computed: ChangeHash,
    },

    #[error("author metadata is not a document URL: '{0}'")]
    InvalidAuthor(String),

    #[error("unknown change: {0}")]
    UnknownChange(ChangeHash),

    #[error("change {change} depends on missing change {missing}")]
    MissingDependency {
        change: ChangeHash,
        missing: ChangeHash,
    },

    #[error("cannot apply op at path '{0}'")]
    InvalidPath(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
