//! Diff-based upload of a local tree.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::client::ObjectStoreClient;
use crate::error::{Result, StoreError};
use crate::local::{LocalFile, LocalTree};
use crate::retry::Backoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Maximum uploads in flight.
    pub concurrency: usize,
    /// Retries after the first failed attempt of one object.
    pub max_retries: u32,
    /// Base delay before a retry; doubles with every attempt.
    pub retry_backoff_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl PublishConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(StoreError::InvalidConfig(
                "publish concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Reading the local file failed.
    Read(String),
    /// Every attempt failed, or the error was not worth retrying.
    Exhausted { attempts: u32, error: String },
    /// Not uploaded because an object below this index failed.
    Withheld { blocked_by: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Read(error) => write!(f, "local read failed: {error}"),
            FailureReason::Exhausted { attempts, error } => {
                write!(f, "failed after {attempts} attempt(s): {error}")
            }
            FailureReason::Withheld { blocked_by } => {
                write!(f, "withheld, {blocked_by} failed to upload")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    pub key: String,
    pub reason: FailureReason,
}

/// Non-fatal summary of objects that could not be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialPublishWarning {
    pub failed: usize,
    pub attempted: usize,
}

impl fmt::Display for PartialPublishWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} objects failed to publish",
            self.failed, self.attempted
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub uploaded: Vec<String>,
    pub unchanged: usize,
    pub failures: Vec<PublishFailure>,
}

impl PublishSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn warning(&self) -> Option<PartialPublishWarning> {
        (!self.failures.is_empty()).then(|| PartialPublishWarning {
            failed: self.failures.len(),
            attempted: self.uploaded.len() + self.failures.len(),
        })
    }
}

pub struct Publisher {
    client: Arc<dyn ObjectStoreClient>,
    config: PublishConfig,
}

impl Publisher {
    pub fn new(client: Arc<dyn ObjectStoreClient>, config: PublishConfig) -> Self {
        Self { client, config }
    }

    /// Upload every file of `tree` that is missing remotely or whose content
    /// differs.
    ///
    /// Non-index files go first. Index files follow level by level, deepest
    /// first, and an index is withheld when anything below its directory
    /// failed, so a published index never lists an unavailable object.
    /// Remote objects without a local counterpart are left alone.
    pub async fn publish(&self, tree: &LocalTree) -> Result<PublishSummary> {
        self.config.validate()?;
        let remote = self.remote_hashes(tree).await?;

        let mut summary = PublishSummary::default();
        let mut data = Vec::new();
        let mut levels: BTreeMap<usize, Vec<&LocalFile>> = BTreeMap::new();
        for file in tree.files() {
            if remote.get(&file.key) == Some(&Some(file.content_hash.clone())) {
                summary.unchanged += 1;
            } else if file.is_index {
                levels.entry(file.depth).or_default().push(file);
            } else {
                data.push(file);
            }
        }

        tracing::info!(
            pending = data.len() + levels.values().map(Vec::len).sum::<usize>(),
            unchanged = summary.unchanged,
            "publishing distribution tree"
        );

        self.upload_all(data, &mut summary).await;

        for (_, indexes) in levels.into_iter().rev() {
            let mut ready = Vec::new();
            for index in indexes {
                let prefix = index.directory_prefix();
                let blocker = summary
                    .failures
                    .iter()
                    .find(|f| f.key.starts_with(prefix))
                    .map(|f| f.key.clone());
                match blocker {
                    Some(blocked_by) => {
                        tracing::warn!(key = %index.key, %blocked_by, "withholding index");
                        summary.failures.push(PublishFailure {
                            key: index.key.clone(),
                            reason: FailureReason::Withheld { blocked_by },
                        });
                    }
                    None => ready.push(index),
                }
            }
            self.upload_all(ready, &mut summary).await;
        }

        match summary.warning() {
            Some(warning) => tracing::warn!(%warning, "publish incomplete"),
            None => tracing::info!(uploaded = summary.uploaded.len(), "publish complete"),
        }
        Ok(summary)
    }

    async fn remote_hashes(&self, tree: &LocalTree) -> Result<HashMap<String, Option<String>>> {
        let prefix = common_prefix(tree.files().iter().map(|f| f.key.as_str()));

        let prefix = prefix.as_str();
        let objects = self
            .backoff()
            .run("list", prefix, move || self.client.list(prefix))
            .await
            .map_err(|(_, e)| e)?;

        Ok(objects
            .into_iter()
            .map(|o| (o.key, o.content_hash))
            .collect())
    }

    async fn upload_all(&self, files: Vec<&LocalFile>, summary: &mut PublishSummary) {
        let uploads: Vec<_> = files
            .into_iter()
            .map(|file| async move { (file.key.clone(), self.upload(file).await) }.boxed())
            .collect();
        let results: Vec<_> = futures::stream::iter(uploads)
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(()) => summary.uploaded.push(key),
                Err(reason) => {
                    tracing::error!(%key, %reason, "upload failed");
                    summary.failures.push(PublishFailure { key, reason });
                }
            }
        }
    }

    async fn upload(&self, file: &LocalFile) -> std::result::Result<(), FailureReason> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| FailureReason::Read(e.to_string()))?;
        let bytes = Bytes::from(bytes);

        self.backoff()
            .run("upload", &file.key, move || {
                self.client.put(&file.key, bytes.clone(), file.content_type)
            })
            .await
            .map_err(|(attempts, e)| FailureReason::Exhausted {
                attempts,
                error: e.to_string(),
            })
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.config.max_retries, self.config.retry_backoff_ms)
    }
}

/// Longest `/`-terminated prefix shared by all keys.
fn common_prefix<'a>(mut keys: impl Iterator<Item = &'a str>) -> String {
    let Some(first) = keys.next() else {
        return String::new();
    };
    let mut prefix = match first.rfind('/') {
        Some(i) => &first[..=i],
        None => "",
    };
    for key in keys {
        while !key.starts_with(prefix) {
            prefix = match prefix[..prefix.len() - 1].rfind('/') {
                Some(i) => &prefix[..=i],
                None => "",
            };
        }
    }
    prefix.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_common_prefix() {
        let keys = ["v/1/a/x", "v/1/b/y", "v/1/a/z"];
        assert_eq!(common_prefix(keys.into_iter()), "v/1/");
        assert_eq!(common_prefix(["a/x", "b/y"].into_iter()), "");
        assert_eq!(common_prefix(std::iter::empty()), "");
        assert_eq!(common_prefix(["only/one"].into_iter()), "only/");
    }

    #[test]
    fn test_warning_only_on_failure() {
        let mut summary = PublishSummary::default();
        assert!(summary.warning().is_none());
        summary.uploaded.push("a".into());
        summary.failures.push(PublishFailure {
            key: "b".into(),
            reason: FailureReason::Read("gone".into()),
        });
        assert_eq!(
            summary.warning(),
            Some(PartialPublishWarning {
                failed: 1,
                attempted: 2
            })
        );
    }
}
