//! One distribution cycle: fetch, bundle, build, materialize, publish,
//! purge.
//!
//! Every fatal error surfaces before anything is published. Upload failures
//! of individual objects are not fatal; they end up in the
//! [`RunSummary`] as a [`PartialPublishWarning`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use common::assembly::{AssemblyError, TreeBuilder};
use common::bundler::{BundlerError, KeyBundler};
use common::crypto::{CryptoError, Ed25519Signer, SecretKey, Signer};
use common::export::ExportCodec;
use common::structure::StructureError;
use object_store::{
    LocalTree, ObjectStoreClient, PartialPublishWarning, PublishSummary, Publisher,
    RetentionPolicy, RetentionSummary, Storage, StoreError,
};

use crate::config::{ConfigError, DistributionConfig};
use crate::source::{KeySource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("signing key unavailable: {0}")]
    Key(#[from] CryptoError),
    #[error("failed to fetch keys: {0}")]
    Source(#[from] SourceError),
    #[error("bundling failed: {0}")]
    Bundling(#[from] BundlerError),
    #[error("signing failed: {0}")]
    Signing(StructureError),
    #[error("serialization failed: {0}")]
    Serialization(AssemblyError),
    #[error("building the distribution tree failed: {0}")]
    Assembly(AssemblyError),
    #[error("object store failure: {0}")]
    Store(#[from] StoreError),
    #[error("failed to prepare {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<AssemblyError> for DistributionError {
    fn from(e: AssemblyError) -> Self {
        match e {
            AssemblyError::Structure(inner @ StructureError::Signing(_)) => {
                DistributionError::Signing(inner)
            }
            e @ AssemblyError::Export(_) => DistributionError::Serialization(e),
            e @ AssemblyError::InvalidConfig(_) => {
                DistributionError::Configuration(ConfigError::Assembly(e))
            }
            e => DistributionError::Assembly(e),
        }
    }
}

/// Outcome of building the local tree.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub today: NaiveDate,
    /// Real keys across all packages, union package included.
    pub keys: usize,
    pub packages: Vec<String>,
    /// Root directory of the materialized tree.
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub build: BuildSummary,
    pub publish: PublishSummary,
    pub retention: RetentionSummary,
}

impl RunSummary {
    pub fn warning(&self) -> Option<PartialPublishWarning> {
        self.publish.warning()
    }

    pub fn is_success(&self) -> bool {
        self.publish.is_success() && self.retention.is_success()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "built {} keys in {} packages for {} at {}",
            self.build.keys,
            self.build.packages.len(),
            self.build.today,
            self.build.root.display()
        )?;
        writeln!(
            f,
            "published {} objects, {} unchanged",
            self.publish.uploaded.len(),
            self.publish.unchanged
        )?;
        write!(
            f,
            "retention deleted {} objects, kept {}",
            self.retention.deleted.len(),
            self.retention.retained
        )?;
        if let Some(warning) = self.warning() {
            write!(f, "\nwarning: {warning}")?;
        }
        Ok(())
    }
}

/// Wires configuration, signer and object store together for run-once
/// operation.
pub struct Distribution {
    config: DistributionConfig,
    signer: Arc<dyn Signer>,
    store: Arc<dyn ObjectStoreClient>,
}

impl Distribution {
    /// Validate `config` and use the given signer and store.
    pub fn new(
        config: DistributionConfig,
        signer: Arc<dyn Signer>,
        store: Arc<dyn ObjectStoreClient>,
    ) -> Result<Self, DistributionError> {
        config.validate()?;
        Ok(Self {
            config,
            signer,
            store,
        })
    }

    /// Load the signing key and connect to the configured backend.
    pub async fn from_config(config: DistributionConfig) -> Result<Self, DistributionError> {
        config.validate()?;
        let signer = load_signer(&config)?;

        let mut storage = Storage::new(config.object_store.clone()).await?;
        if let Some(source) = config.publish.hash_source {
            storage = storage.with_hash_source(source);
        }
        Self::new(config, Arc::new(signer), Arc::new(storage))
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Bundle the keys of `source` and write the complete tree for `today`
    /// below the output directory, replacing any previous tree.
    pub async fn build(
        &self,
        source: &dyn KeySource,
        today: NaiveDate,
    ) -> Result<BuildSummary, DistributionError> {
        let config = &self.config;
        let codec = Arc::new(ExportCodec::new(config.export.clone()).map_err(ConfigError::from)?);
        let builder = TreeBuilder::new(
            config.assembly.clone(),
            codec,
            self.signer.clone(),
            today,
        )?;
        let bundler = KeyBundler::new(config.bundling.clone(), today)?;

        let app_config = match &config.app_config_path {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|source| {
                ConfigError::Io {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let keys = source.fetch().await?;
        let bundles = bundler.bundle(keys)?;
        let summary_keys = bundles.key_count();
        let packages: Vec<String> = bundles.package_names().map(str::to_string).collect();
        tracing::info!(%today, keys = summary_keys, packages = packages.len(), "keys bundled");

        // nothing touches the output directory until the whole tree is built
        let tree = builder.build(bundles, app_config).await?;

        let version = &config.assembly.paths.version;
        let staging = staging_dir(&config.output_dir).await?;
        if let Err(e) = builder.materialize(tree, &staging).await {
            remove_dir(&staging).await?;
            return Err(e.into());
        }
        let root = swap_in(&staging, &config.output_dir, version).await?;
        tracing::info!(root = %root.display(), "distribution tree materialized");

        Ok(BuildSummary {
            today,
            keys: summary_keys,
            packages,
            root,
        })
    }

    /// Mirror the local tree to the object store.
    pub async fn publish(&self) -> Result<PublishSummary, DistributionError> {
        let config = &self.config;
        let version = config.output_dir.join(&config.assembly.paths.version);
        if !tokio::fs::try_exists(&version).await.unwrap_or(false) {
            return Err(DistributionError::Output {
                path: version,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no distribution tree to publish",
                ),
            });
        }

        let output = config.output_dir.clone();
        let prefix = config.publish.prefix.clone();
        let index = config.assembly.paths.index.clone();
        let tree = tokio::task::spawn_blocking(move || LocalTree::scan(&output, &prefix, &index))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))??;

        let publisher = Publisher::new(self.store.clone(), config.publish.config.clone());
        Ok(publisher.publish(&tree).await?)
    }

    /// Delete remote (and optionally local) artifacts past the horizon.
    pub async fn retain(&self, today: NaiveDate) -> Result<RetentionSummary, DistributionError> {
        let config = &self.config;
        let policy = RetentionPolicy::new(
            self.store.clone(),
            config.retention.clone(),
            config.remote_country_prefix(),
        );
        let local = config.local_country_dir();
        Ok(policy.apply(today, Some(local.as_path())).await?)
    }

    /// Build, publish, then purge.
    ///
    /// Retention runs last: an expired date has already left the published
    /// indexes when its objects are deleted.
    pub async fn run_once(
        &self,
        source: &dyn KeySource,
        today: NaiveDate,
    ) -> Result<RunSummary, DistributionError> {
        let build = self.build(source, today).await?;
        let publish = self.publish().await?;
        let retention = self.retain(today).await?;

        let summary = RunSummary {
            build,
            publish,
            retention,
        };
        match summary.warning() {
            Some(warning) => tracing::warn!(%warning, "run finished with unpublished objects"),
            None => tracing::info!("run complete"),
        }
        Ok(summary)
    }
}

/// Empty directory next to `output` that a build materializes into. It is
/// outside `output`, so a publish never scans it.
async fn staging_dir(output: &Path) -> Result<PathBuf, DistributionError> {
    let output_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DistributionError::Output { path, source }
    };
    tokio::fs::create_dir_all(output)
        .await
        .map_err(output_err(output))?;
    let output = tokio::fs::canonicalize(output)
        .await
        .map_err(output_err(output))?;
    let Some(name) = output.file_name() else {
        return Err(DistributionError::Output {
            path: output.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output_dir must not be a filesystem root",
            ),
        });
    };
    let staging = output.with_file_name(format!(".{}.staging", name.to_string_lossy()));

    remove_dir(&staging).await?;
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(output_err(&staging))?;
    Ok(staging)
}

/// Replace `output/version` with the freshly built `staging/version`. The
/// old tree is moved aside first and deleted only once the new one is in
/// place.
async fn swap_in(staging: &Path, output: &Path, version: &str) -> Result<PathBuf, DistributionError> {
    let built = staging.join(version);
    let target = output.join(version);
    let retired = staging.join("previous");

    let rename = |from: PathBuf, to: PathBuf| async move {
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|source| DistributionError::Output { path: to, source })
    };
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        rename(target.clone(), retired).await?;
    }
    rename(built, target.clone()).await?;
    remove_dir(staging).await?;
    Ok(target)
}

async fn remove_dir(path: &Path) -> Result<(), DistributionError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DistributionError::Output {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read the PEM private key named by `[signature]`.
pub fn load_signer(config: &DistributionConfig) -> Result<Ed25519Signer, DistributionError> {
    let signature = &config.signature;
    let pem = std::fs::read_to_string(&signature.private_key_path).map_err(|source| {
        ConfigError::Io {
            path: signature.private_key_path.clone(),
            source,
        }
    })?;
    let key = SecretKey::from_pem(&pem)?;
    Ok(Ed25519Signer::new(
        key,
        signature.key_id.clone(),
        signature.key_version.clone(),
    ))
}
