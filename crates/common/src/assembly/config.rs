use serde::{Deserialize, Serialize};

use super::AssemblyError;

/// Path segments of the published hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub version: String,
    pub version_v1: String,
    pub diagnosis_keys: String,
    pub country: String,
    pub date: String,
    pub hour: String,
    pub configuration: String,
    pub app_config: String,
    pub index: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            version: "version".into(),
            version_v1: "v1".into(),
            diagnosis_keys: "diagnosis-keys".into(),
            country: "country".into(),
            date: "date".into(),
            hour: "hour".into(),
            configuration: "configuration".into(),
            app_config: "app_config".into(),
            index: "index".into(),
        }
    }
}

impl PathConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        let segments = [
            ("version", &self.version),
            ("version_v1", &self.version_v1),
            ("diagnosis_keys", &self.diagnosis_keys),
            ("country", &self.country),
            ("date", &self.date),
            ("hour", &self.hour),
            ("configuration", &self.configuration),
            ("app_config", &self.app_config),
            ("index", &self.index),
        ];
        for (field, value) in segments {
            if value.is_empty() || value == "." || value == ".." || value.contains('/') {
                return Err(AssemblyError::InvalidConfig(format!(
                    "paths.{field} is not a valid path segment: {value:?}"
                )));
            }
        }
        if self.diagnosis_keys == self.configuration {
            return Err(AssemblyError::InvalidConfig(
                "paths.diagnosis_keys and paths.configuration must differ".into(),
            ));
        }
        Ok(())
    }

    /// Key prefix (relative to the output root) under which package
    /// directories live.
    pub fn country_prefix(&self) -> String {
        [
            self.version.as_str(),
            self.version_v1.as_str(),
            self.diagnosis_keys.as_str(),
            self.country.as_str(),
        ]
        .join("/")
    }

    /// Key prefix of the directory holding the signed app configuration.
    pub fn configuration_prefix(&self) -> String {
        [
            self.version.as_str(),
            self.version_v1.as_str(),
            self.configuration.as_str(),
        ]
        .join("/")
    }
}

/// Which levels of the hierarchy carry an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub version: bool,
    pub country: bool,
    pub date: bool,
    pub hour: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            version: true,
            country: true,
            date: true,
            hour: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Emit per-hour directories at all.
    #[serde(default = "default_include_hours")]
    pub include_hours: bool,
    /// Hour directories are only emitted for dates after
    /// `today - hour_retention_days`.
    #[serde(default = "default_hour_retention_days")]
    pub hour_retention_days: u32,
    /// Upper bound on concurrently built or written subtrees.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_include_hours() -> bool {
    true
}

fn default_hour_retention_days() -> u32 {
    2
}

fn default_workers() -> usize {
    8
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            indexing: IndexingConfig::default(),
            include_hours: default_include_hours(),
            hour_retention_days: default_hour_retention_days(),
            workers: default_workers(),
        }
    }
}

impl AssemblyConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        self.paths.validate()?;
        if self.workers == 0 {
            return Err(AssemblyError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
