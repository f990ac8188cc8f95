//! Where diagnosis keys come from. Persistence lives outside this crate;
//! a run only needs a snapshot of the keys eligible for distribution.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::diagnosis_key::{DiagnosisKey, DiagnosisKeyRecord};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read keys from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed key file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait KeySource: Send + Sync {
    /// Every key currently eligible for distribution.
    async fn fetch(&self) -> Result<Vec<DiagnosisKey>, SourceError>;
}

/// A JSON array of [`DiagnosisKeyRecord`]s. Records that do not describe a
/// valid key are skipped with a warning.
#[derive(Debug, Clone)]
pub struct JsonFileKeySource {
    path: PathBuf,
}

impl JsonFileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `keys` in the format this source reads.
    pub async fn write(path: &Path, keys: &[DiagnosisKey]) -> Result<(), SourceError> {
        let records: Vec<DiagnosisKeyRecord> = keys.iter().map(DiagnosisKeyRecord::from).collect();
        let json = serde_json::to_vec_pretty(&records).map_err(|source| SourceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl KeySource for JsonFileKeySource {
    async fn fetch(&self) -> Result<Vec<DiagnosisKey>, SourceError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let records: Vec<DiagnosisKeyRecord> =
            serde_json::from_slice(&raw).map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let total = records.len();
        let keys: Vec<DiagnosisKey> = records
            .into_iter()
            .enumerate()
            .filter_map(|(i, record)| match DiagnosisKey::try_from(record) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(record = i, error = %e, "skipping invalid key record");
                    None
                }
            })
            .collect();

        tracing::info!(
            path = %self.path.display(),
            keys = keys.len(),
            skipped = total - keys.len(),
            "loaded diagnosis keys"
        );
        Ok(keys)
    }
}

/// Keys handed over in memory, e.g. by an embedding service.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    keys: Vec<DiagnosisKey>,
}

impl StaticKeySource {
    pub fn new(keys: Vec<DiagnosisKey>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<Vec<DiagnosisKey>, SourceError> {
        Ok(self.keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> DiagnosisKey {
        DiagnosisKey::new([byte; 16], 2_683_296, 144, 3, "DE").unwrap()
    }

    #[tokio::test]
    async fn test_json_file_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("keys.json");
        let keys = vec![key(1), key(2)];

        JsonFileKeySource::write(&path, &keys).await.unwrap();
        let loaded = JsonFileKeySource::new(&path).fetch().await.unwrap();
        assert_eq!(loaded, keys);
    }

    #[tokio::test]
    async fn test_invalid_records_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("keys.json");
        let raw = r#"[
            {"key_data": "AQEBAQEBAQEBAQEBAQEBAQ==", "rolling_start_interval_number": 2683296,
             "transmission_risk_level": 3, "origin_country": "DE"},
            {"key_data": "AQID", "rolling_start_interval_number": 2683296,
             "transmission_risk_level": 3, "origin_country": "DE"}
        ]"#;
        std::fs::write(&path, raw).unwrap();

        let loaded = JsonFileKeySource::new(&path).fetch().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key_data(), &[1u8; 16]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let source = JsonFileKeySource::new("/nonexistent/keys.json");
        assert!(matches!(source.fetch().await, Err(SourceError::Io { .. })));
    }
}
