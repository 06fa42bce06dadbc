use thiserror::Error;

/// Result type for object store operations.
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Errors from object store operations.
///
/// The variant split is what drives retry classification: see
/// [`ObjectClient::is_retryable`](crate::ObjectClient::is_retryable) and
/// [`ObjectClient::is_not_exist`](crate::ObjectClient::is_not_exist).
#[derive(Debug, Error)]
pub enum ObjectError {
    /// No object at the given key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Malformed or out-of-root key.
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Local filesystem error.
    #[error("i/o error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Transport-level error talking to a remote vendor.
    #[error("object store error: {source}")]
    Network {
        #[source]
        source: object_store::Error,
    },

    /// Backend name not recognized by the registry.
    #[error("unsupported object store backend: {name}")]
    UnsupportedBackend { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<object_store::Error> for ObjectError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => ObjectError::NotFound { key: path },
            other => ObjectError::Network { source: other },
        }
    }
}
