//! Crate-wide error taxonomy.

use uuid::Uuid;

/// Result type alias for pattern engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the pattern engine, per the error handling design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pattern not found: {0}")]
    NotFound(String),

    #[error("pattern name collision: {0}")]
    NameCollision(String),

    #[error("pattern id collision: {0}")]
    IdCollision(Uuid),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("schema error for pattern {id}: {reason}")]
    SchemaError { id: String, reason: String },

    #[error("sanitizer rejected content: {0}")]
    SecurityReject(String),

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("concurrent modification detected for pattern {0}")]
    ConcurrentModification(Uuid),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is one the retriever/classifier/consolidator
    /// recover from locally, per the error handling design: skip the
    /// offending pattern/update rather than aborting the caller.
    #[must_use]
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_)
                | Error::SchemaError { .. }
                | Error::ConcurrentModification(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_is_recoverable() {
        let err = Error::ProviderUnavailable("timeout".into());
        assert!(err.is_locally_recoverable());
    }

    #[test]
    fn not_found_is_not_recoverable() {
        let err = Error::NotFound("foo".into());
        assert!(!err.is_locally_recoverable());
    }
}
