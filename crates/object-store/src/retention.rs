//! Purging of dated artifacts past the retention horizon.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{Days, NaiveDate};
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::ObjectStoreClient;
use crate::error::{Result, StoreError};
use crate::retry::Backoff;

static DATE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Artifacts dated before `today - retention_days` are deleted.
    pub retention_days: u32,
    /// Also remove expired date directories from the local output.
    pub delete_local: bool,
    /// Concurrent deletes.
    pub concurrency: usize,
    /// Retries of a failed list or delete.
    pub max_retries: u32,
    /// Base delay before a retry; doubles with every attempt.
    pub retry_backoff_ms: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 14,
            delete_local: false,
            concurrency: 8,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl RetentionConfig {
    /// Today and yesterday must never fall outside the horizon.
    pub fn validate(&self) -> Result<()> {
        if self.retention_days < 2 {
            return Err(StoreError::InvalidConfig(
                "retention_days must be at least 2".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(StoreError::InvalidConfig(
                "retention concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionSummary {
    pub cutoff: Option<NaiveDate>,
    pub deleted: Vec<String>,
    pub retained: usize,
    pub local_deleted: Vec<PathBuf>,
    /// Keys (or local paths) that could not be deleted, with the error.
    pub failures: Vec<(String, String)>,
}

impl RetentionSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RetentionPolicy {
    client: Arc<dyn ObjectStoreClient>,
    config: RetentionConfig,
    /// Remote prefix holding dated artifacts.
    prefix: String,
}

impl RetentionPolicy {
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        config: RetentionConfig,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            prefix: prefix.into(),
        }
    }

    /// First date that is kept.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - Days::new(u64::from(self.config.retention_days))
    }

    /// Whether `key` lies under a date segment strictly before `cutoff`.
    pub fn is_expired(key: &str, cutoff: NaiveDate) -> bool {
        key_date(key).is_some_and(|date| date < cutoff)
    }

    /// Delete every remote object (and, if configured, local date directory
    /// below `local_root`) dated strictly before the cutoff.
    pub async fn apply(&self, today: NaiveDate, local_root: Option<&Path>) -> Result<RetentionSummary> {
        self.config.validate()?;
        let cutoff = self.cutoff(today);
        let backoff = Backoff::new(self.config.max_retries, self.config.retry_backoff_ms);
        let prefix = self.prefix.as_str();
        let objects = backoff
            .run("list", prefix, move || self.client.list(prefix))
            .await
            .map_err(|(_, e)| e)?;

        let mut summary = RetentionSummary {
            cutoff: Some(cutoff),
            ..Default::default()
        };
        let (expired, kept): (Vec<_>, Vec<_>) = objects
            .into_iter()
            .map(|o| o.key)
            .partition(|key| Self::is_expired(key, cutoff));
        summary.retained = kept.len();

        let results: Vec<_> = futures::stream::iter(expired)
            .map(|key| async move {
                let result = backoff
                    .run("delete", &key, || self.client.delete(&key))
                    .await;
                (key, result)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(()) => summary.deleted.push(key),
                Err((attempts, e)) => {
                    tracing::error!(%key, attempts, error = %e, "failed to delete expired object");
                    summary.failures.push((key, e.to_string()));
                }
            }
        }
        summary.deleted.sort();

        if self.config.delete_local {
            if let Some(root) = local_root {
                self.purge_local(root, cutoff, &mut summary).await;
            }
        }

        tracing::info!(
            %cutoff,
            deleted = summary.deleted.len(),
            retained = summary.retained,
            local_deleted = summary.local_deleted.len(),
            failures = summary.failures.len(),
            "retention pass complete"
        );
        Ok(summary)
    }

    async fn purge_local(&self, root: &Path, cutoff: NaiveDate, summary: &mut RetentionSummary) {
        let mut expired = Vec::new();
        let mut walker = walkdir::WalkDir::new(root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() && is_expired_dir(entry.path(), cutoff) {
                expired.push(entry.into_path());
                walker.skip_current_dir();
            }
        }

        for dir in expired {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => summary.local_deleted.push(dir),
                Err(e) => summary
                    .failures
                    .push((dir.display().to_string(), e.to_string())),
            }
        }
    }
}

fn key_date(key: &str) -> Option<NaiveDate> {
    key.split('/')
        .filter(|segment| DATE_SEGMENT.is_match(segment))
        .find_map(|segment| NaiveDate::parse_from_str(segment, "%Y-%m-%d").ok())
}

fn is_expired_dir(path: &Path, cutoff: NaiveDate) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| DATE_SEGMENT.is_match(name))
        .and_then(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
        .is_some_and(|date| date < cutoff)
}
