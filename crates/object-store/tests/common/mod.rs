#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tekdist_object_store::{ObjectStoreClient, RemoteObject, Result, Storage, StoreError};

/// Memory storage whose puts and deletes fail a configured number of times
/// per key.
pub struct FlakyClient {
    pub inner: Storage,
    failures: Mutex<HashMap<String, u32>>,
    pub puts: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

impl FlakyClient {
    pub fn new(inner: Storage) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            puts: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(self, key: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(key.to_string(), times);
        self
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.puts.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn delete_attempts(&self, key: &str) -> usize {
        self.deletes.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    fn injected_failure(&self, key: &str) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Io {
                    path: key.into(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStoreClient for FlakyClient {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        self.inner.list(prefix).await
    }

    async fn head(&self, key: &str) -> Result<Option<RemoteObject>> {
        self.inner.head(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.puts.lock().unwrap().push(key.to_string());
        self.injected_failure(key)?;
        self.inner.put(key, bytes, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        self.injected_failure(key)?;
        self.inner.delete(key).await
    }
}

/// Writes a small distribution-shaped tree:
///
/// ```text
/// country/index
/// country/DE/date/index
/// country/DE/date/2021-01-01/export.zip
/// country/DE/date/2021-01-02/export.zip
/// ```
pub fn write_tree(root: &Path) {
    let date = root.join("country/DE/date");
    for day in ["2021-01-01", "2021-01-02"] {
        std::fs::create_dir_all(date.join(day)).unwrap();
        std::fs::write(
            date.join(day).join("export.zip"),
            [b"PK\x03\x04".as_slice(), day.as_bytes()].concat(),
        )
        .unwrap();
    }
    std::fs::write(date.join("index"), br#"["2021-01-01","2021-01-02"]"#).unwrap();
    std::fs::write(root.join("country/index"), br#"["DE"]"#).unwrap();
}

pub async fn remote_keys(storage: &Storage, prefix: &str) -> Vec<String> {
    let mut keys: Vec<_> = storage
        .list(prefix)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    keys.sort();
    keys
}
