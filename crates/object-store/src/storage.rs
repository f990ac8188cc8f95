//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions};
use serde::{Deserialize, Serialize};

use crate::client::{ObjectStoreClient, RemoteObject};
use crate::error::{Result, StoreError};
use crate::local::content_hash;

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Where the content hash of a remote object comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashSource {
    /// The object's ETag, which S3 sets to the MD5 of single-part uploads.
    Etag,
    /// Download each listed object and hash it.
    Fetch,
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
    hash_source: HashSource,
    /// Whether the backend keeps object attributes such as content type.
    attributes: bool,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let storage = match &config {
            ObjectStoreConfig::Memory => Self::memory(),

            ObjectStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(StoreError::io(path))?;
                let store = LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
                Self {
                    inner: Arc::new(store),
                    hash_source: HashSource::Fetch,
                    attributes: false,
                }
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                );

                // Fail fast if the bucket doesn't exist
                let prefix = ObjectPath::from("");
                let mut stream = store.list(Some(&prefix));
                match stream.try_next().await {
                    Ok(_) => {}
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(StoreError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        if msg.contains("NoSuchBucket") {
                            return Err(StoreError::BucketNotFound(bucket.clone()));
                        }
                        return Err(e.into());
                    }
                }
                drop(stream);

                Self {
                    inner: store,
                    hash_source: HashSource::Etag,
                    attributes: true,
                }
            }
        };

        Ok(storage)
    }

    /// An in-memory backend.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            hash_source: HashSource::Fetch,
            attributes: true,
        }
    }

    /// Override how remote content hashes are obtained.
    pub fn with_hash_source(mut self, hash_source: HashSource) -> Self {
        self.hash_source = hash_source;
        self
    }

    pub fn hash_source(&self) -> HashSource {
        self.hash_source
    }

    /// Read an object's bytes, `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = ObjectPath::parse(key)?;
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn describe(&self, meta: ObjectMeta) -> Result<RemoteObject> {
        let key = meta.location.to_string();
        let content_hash = match self.hash_source {
            HashSource::Etag => meta
                .e_tag
                .as_deref()
                .map(|tag| tag.trim_matches('"'))
                // multipart ETags are not content hashes
                .filter(|tag| !tag.contains('-'))
                .map(str::to_ascii_lowercase),
            HashSource::Fetch => self.get(&key).await?.map(|bytes| content_hash(&bytes)),
        };
        Ok(RemoteObject {
            key,
            content_hash,
            last_modified: meta.last_modified,
        })
    }
}

#[async_trait]
impl ObjectStoreClient for Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let prefix = ObjectPath::parse(prefix.trim_end_matches('/'))?;
        let metas: Vec<ObjectMeta> = self.inner.list(Some(&prefix)).try_collect().await?;

        futures::stream::iter(metas)
            .map(|meta| self.describe(meta))
            .buffered(16)
            .try_collect()
            .await
    }

    async fn head(&self, key: &str) -> Result<Option<RemoteObject>> {
        let path = ObjectPath::parse(key)?;
        match self.inner.head(&path).await {
            Ok(meta) => Ok(Some(self.describe(meta).await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let path = ObjectPath::parse(key)?;
        let mut options = PutOptions::default();
        if self.attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }
        self.inner.put_opts(&path, bytes.into(), options).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = ObjectPath::parse(key)?;
        // Ignore NotFound errors - the object may already be deleted
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = Storage::memory();
        let key = "version/v1/index";

        storage.put(key, Bytes::from("[\"v1\"]"), "application/json").await.unwrap();
        let listed = storage.list("version").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, key);
        assert_eq!(listed[0].content_hash, Some(content_hash(b"[\"v1\"]")));

        assert!(storage.head(key).await.unwrap().is_some());

        storage.delete(key).await.unwrap();
        assert!(storage.head(key).await.unwrap().is_none());
        // deleting again is fine
        storage.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };
        let storage = Storage::new(config).await.unwrap();

        let data = Bytes::from("test data");
        storage
            .put("a/b/export.zip", data.clone(), "application/zip")
            .await
            .unwrap();
        assert_eq!(storage.get("a/b/export.zip").await.unwrap().unwrap(), data);

        // Verify file exists on disk
        assert!(temp_dir.path().join("a/b/export.zip").exists());

        let listed = storage.list("a/").await.unwrap();
        assert_eq!(listed[0].content_hash, Some(content_hash(&data)));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_prefix() {
        let storage = Storage::memory();
        for key in ["x/1", "x/2", "y/1"] {
            storage.put(key, Bytes::from(key), "text/plain").await.unwrap();
        }
        let mut keys: Vec<_> = storage
            .list("x")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["x/1", "x/2"]);
    }
}
