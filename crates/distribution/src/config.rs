//! TOML configuration of a distribution run.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use common::assembly::{AssemblyConfig, AssemblyError};
use common::bundler::{BundlerError, BundlingConfig};
use common::export::{ExportConfig, ExportError};
use object_store::{HashSource, ObjectStoreConfig, PublishConfig, RetentionConfig, StoreError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "tekdist.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid log level {0:?}")]
    LogLevel(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid bundling configuration: {0}")]
    Bundling(#[from] BundlerError),
    #[error("invalid export configuration: {0}")]
    Export(#[from] ExportError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which key signs the archives and how clients identify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub key_id: String,
    #[serde(default = "default_key_version")]
    pub key_version: String,
    /// PEM file holding the Ed25519 private key.
    pub private_key_path: PathBuf,
}

fn default_key_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(flatten)]
    pub config: PublishConfig,
    /// Remote key prefix the local tree is mirrored under.
    #[serde(default)]
    pub prefix: String,
    /// Overrides the backend's natural hash source.
    #[serde(default)]
    pub hash_source: Option<HashSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Where the tree is materialized.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// JSON file of diagnosis key records.
    #[serde(default)]
    pub keys_path: Option<PathBuf>,
    /// Opaque client configuration published as a signed archive.
    #[serde(default)]
    pub app_config_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (logs to stdout only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(flatten)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub bundling: BundlingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    pub signature: SignatureConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DistributionConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        self.assembly.validate()?;
        self.bundling.validate()?;
        self.export.validate()?;
        self.publish.config.validate()?;
        self.retention.validate()?;

        if self.signature.key_id.is_empty() {
            return Err(ConfigError::Invalid("signature.key_id must be set".into()));
        }
        if self.bundling.retention_days > self.retention.retention_days {
            return Err(ConfigError::Invalid(format!(
                "bundling.retention_days ({}) exceeds retention.retention_days ({}); \
                 every run would publish dates the retention pass deletes",
                self.bundling.retention_days, self.retention.retention_days
            )));
        }
        if self.publish.prefix.split('/').any(|s| s == "..") {
            return Err(ConfigError::Invalid(format!(
                "publish.prefix {:?} must not contain '..'",
                self.publish.prefix
            )));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    /// Remote key prefix of the dated country hierarchy.
    pub fn remote_country_prefix(&self) -> String {
        join_key(&self.publish.prefix, &self.assembly.paths.country_prefix())
    }

    /// Local directory of the dated country hierarchy.
    pub fn local_country_dir(&self) -> PathBuf {
        self.output_dir.join(self.assembly.paths.country_prefix())
    }
}

pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}
