//! Error types for store access.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Invalid object key
    #[error("invalid object key: {0}")]
    Key(#[from] object_store::path::Error),

    /// IO error
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure while walking the local tree
    #[error("failed to walk local tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before publishing.")]
    BucketNotFound(String),

    /// Blocking task failed
    #[error("worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::ObjectStore(e) => !matches!(
                e,
                object_store::Error::NotImplemented | object_store::Error::UnknownConfigurationKey { .. }
            ),
            StoreError::Io { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
