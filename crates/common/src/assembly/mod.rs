//! Turns a [`BundleSet`] into the complete distribution tree of one run.
//!
//! Each hierarchy level has its own provider (package, date, hour,
//! configuration). Providers are pure functions of their data slice and the
//! shared read-only [`BuildContext`], so package subtrees are built on
//! independent workers. The finished tree is only handed out once every
//! subtree is done; writing it to disk (and with it all signing) happens
//! afterwards.

mod config;
mod configuration;
mod country;
mod date;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use futures::{StreamExt, TryStreamExt};

use crate::bundler::{BundleSet, KeyBundle};
use crate::crypto::Signer;
use crate::export::{ExportCodec, ExportError};
use crate::structure::{
    materialize_concurrently, Directory, EntryArchive, IndexFormat, IndexingDecorator, Node,
    SigningDecorator, StructureError,
};

pub use config::{AssemblyConfig, IndexingConfig, PathConfig};

/// Depth of individual date directories below the root
/// (`version/v1/diagnosis-keys/country/<package>/date/<date>`).
const DATE_DEPTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("invalid assembly configuration: {0}")]
    InvalidConfig(String),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("structure failed: {0}")]
    Structure(#[from] StructureError),
    #[error("build worker failed: {0}")]
    Worker(String),
}

/// Read-only inputs shared by every provider.
pub(crate) struct BuildContext {
    pub config: AssemblyConfig,
    pub codec: Arc<ExportCodec>,
    pub signer: Arc<dyn Signer>,
    pub today: NaiveDate,
}

impl BuildContext {
    /// Wrap a directory in an index when `enabled`.
    pub fn indexed(&self, dir: Directory, enabled: bool, format: IndexFormat) -> Node {
        if enabled {
            Node::directory(IndexingDecorator::new(dir, &self.config.paths.index, format))
        } else {
            Node::directory(dir)
        }
    }

    /// Signed export archives for a bundle, one per batch.
    pub fn export_archives(&self, bundle: &KeyBundle) -> Result<Vec<Node>, AssemblyError> {
        let export = self.codec.config();
        let batches = self.codec.encode(bundle, self.signer.signature_info())?;

        batches
            .into_iter()
            .map(|batch| {
                let mut archive = EntryArchive::new(export.batch_archive_name(batch.batch_num));
                archive.add(export.payload_entry.clone(), batch.bytes)?;
                let signed =
                    SigningDecorator::new(archive, self.signer.clone(), self.codec.clone())
                        .with_batch(batch.batch_num, batch.batch_size);
                Ok(Node::archive(signed))
            })
            .collect()
    }

    /// Whether hour directories are emitted for `date`.
    pub fn includes_hours(&self, date: NaiveDate) -> bool {
        let horizon = self.today - Days::new(u64::from(self.config.hour_retention_days));
        self.config.include_hours && date > horizon
    }
}

pub struct TreeBuilder {
    context: Arc<BuildContext>,
}

impl TreeBuilder {
    /// Fails on invalid configuration, before anything is built.
    pub fn new(
        config: AssemblyConfig,
        codec: Arc<ExportCodec>,
        signer: Arc<dyn Signer>,
        today: NaiveDate,
    ) -> Result<Self, AssemblyError> {
        config.validate()?;
        codec.config().validate()?;
        Ok(Self {
            context: Arc::new(BuildContext {
                config,
                codec,
                signer,
                today,
            }),
        })
    }

    pub fn paths(&self) -> &PathConfig {
        &self.context.config.paths
    }

    /// Build the root node of the distribution.
    ///
    /// `app_config` is the opaque client configuration payload; when present
    /// it is published as a signed archive next to the key hierarchy.
    pub async fn build(
        &self,
        bundles: BundleSet,
        app_config: Option<Vec<u8>>,
    ) -> Result<Node, AssemblyError> {
        let ctx = &self.context;
        let paths = &ctx.config.paths;
        let workers = ctx.config.workers;

        let packages: Vec<Node> = futures::stream::iter(bundles.packages)
            .map(|(name, bundles)| {
                let ctx = ctx.clone();
                async move {
                    tokio::task::spawn_blocking(move || country::build(&ctx, &name, &bundles))
                        .await
                        .map_err(|e| AssemblyError::Worker(e.to_string()))?
                }
            })
            .buffered(workers)
            .try_collect()
            .await?;

        tracing::debug!(packages = packages.len(), "package subtrees built");

        let mut country = Directory::new(&paths.country);
        for package in packages {
            country.add(package)?;
        }

        let diagnosis_keys = Directory::new(&paths.diagnosis_keys)
            .with_child(ctx.indexed(country, ctx.config.indexing.country, IndexFormat::Strings))?;

        let mut v1 = Directory::new(&paths.version_v1);
        v1.add(Node::directory(diagnosis_keys))?;
        if let Some(payload) = app_config {
            v1.add(configuration::build(ctx, payload)?)?;
        }

        let version = Directory::new(&paths.version).with_child(Node::directory(v1))?;
        Ok(ctx.indexed(version, ctx.config.indexing.version, IndexFormat::Strings))
    }

    /// Write a built tree below `output`, signing archives as they are
    /// sealed. Date subtrees are written concurrently.
    pub async fn materialize(&self, root: Node, output: &Path) -> Result<PathBuf, AssemblyError> {
        tokio::fs::create_dir_all(output)
            .await
            .map_err(|source| StructureError::Io {
                path: output.to_path_buf(),
                source,
            })?;
        let path = materialize_concurrently(
            Arc::new(root),
            output.to_path_buf(),
            DATE_DEPTH,
            self.context.config.workers,
        )
        .await?;
        Ok(path)
    }
}
