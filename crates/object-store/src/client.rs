use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// An object observed in the remote store during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Hex MD5 of the object contents, when the backend can tell.
    pub content_hash: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Minimal key/value surface the publisher and retention pass need.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    async fn head(&self, key: &str) -> Result<Option<RemoteObject>>;

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
