//! Shared fixtures for run-once integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, TimeZone, Utc};
use common::crypto::{PublicKey, SecretKey, SignatureInfo, Signer, SigningError};
use common::diagnosis_key::{interval_number, DiagnosisKey};
use object_store::{ObjectStoreClient, RemoteObject, Storage, StoreError};
use tekdist::{Distribution, DistributionConfig, JsonFileKeySource};
use tempfile::TempDir;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A key whose rolling start is `hour:00` UTC on `date`.
pub fn key(byte: u8, country: &str, date: NaiveDate, hour: u32) -> DiagnosisKey {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap());
    DiagnosisKey::new([byte; 16], interval_number(start), 144, 3, country).unwrap()
}

/// Scratch directory holding a signing key, a key file and a config file.
pub struct Workspace {
    pub dir: TempDir,
    pub public_key: PublicKey,
}

impl Workspace {
    pub async fn new(keys: &[DiagnosisKey], extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let secret = SecretKey::from([7u8; 32]);
        std::fs::write(dir.path().join("private.pem"), secret.to_pem()).unwrap();
        JsonFileKeySource::write(&dir.path().join("keys.json"), keys)
            .await
            .unwrap();

        let config = format!(
            r#"
output_dir = "{root}/out"
keys_path = "{root}/keys.json"
{extra}

[bundling]
min_keys_per_hour = 2
supported_countries = ["DE", "FR"]
retention_days = 2

[signature]
key_id = "262"
private_key_path = "{root}/private.pem"

[publish]
retry_backoff_ms = 1
max_retries = 1

[retention]
retention_days = 2
delete_local = true
"#,
            root = dir.path().display(),
        );
        std::fs::write(dir.path().join("tekdist.toml"), config).unwrap();

        Self {
            dir,
            public_key: secret.public(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> DistributionConfig {
        DistributionConfig::load(&self.root().join("tekdist.toml")).unwrap()
    }

    pub fn source(&self) -> JsonFileKeySource {
        JsonFileKeySource::new(self.root().join("keys.json"))
    }

    pub fn distribution(&self, store: Arc<dyn ObjectStoreClient>) -> Distribution {
        let config = self.config();
        let signer = tekdist::load_signer(&config).unwrap();
        Distribution::new(config, Arc::new(signer), store).unwrap()
    }
}

/// Signer whose every signature fails.
pub struct FailingSigner {
    info: SignatureInfo,
}

impl FailingSigner {
    pub fn new() -> Self {
        Self {
            info: SignatureInfo {
                verification_key_id: "262".into(),
                verification_key_version: "v1".into(),
                signature_algorithm: "1.3.101.112".into(),
            },
        }
    }
}

impl Signer for FailingSigner {
    fn signature_info(&self) -> &SignatureInfo {
        &self.info
    }

    fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Err(SigningError::Failed {
            key_id: self.info.verification_key_id.clone(),
            reason: "hardware key unavailable".into(),
        })
    }
}

/// Memory storage that refuses every put whose key ends with `suffix`.
pub struct RejectingClient {
    pub inner: Storage,
    pub suffix: String,
}

#[async_trait]
impl ObjectStoreClient for RejectingClient {
    async fn list(&self, prefix: &str) -> object_store::Result<Vec<RemoteObject>> {
        self.inner.list(prefix).await
    }

    async fn head(&self, key: &str) -> object_store::Result<Option<RemoteObject>> {
        self.inner.head(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> object_store::Result<()> {
        if key.ends_with(&self.suffix) {
            return Err(StoreError::Io {
                path: key.into(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "refused"),
            });
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn delete(&self, key: &str) -> object_store::Result<()> {
        self.inner.delete(key).await
    }
}

pub async fn remote_keys(storage: &Storage) -> Vec<String> {
    let mut keys: Vec<_> = storage
        .list("")
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    keys.sort();
    keys
}
