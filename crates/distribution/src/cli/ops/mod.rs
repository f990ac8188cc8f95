pub mod build;
pub mod keygen;
pub mod publish;
pub mod retain;
pub mod run;
pub mod verify;
pub mod version;

pub use build::Build;
pub use keygen::Keygen;
pub use publish::Publish;
pub use retain::Retain;
pub use run::Run;
pub use verify::Verify;
pub use version::Version;

use std::path::PathBuf;

use tekdist::{ConfigError, DistributionConfig, DistributionError, JsonFileKeySource};

/// Errors of the ops that drive a distribution run.
#[derive(Debug, thiserror::Error)]
pub enum DistributionOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("no key source: pass --keys or set keys_path")]
    NoKeySource,
    #[error("run incomplete: {0}")]
    Incomplete(String),
}

/// `--keys` if given, otherwise the configured `keys_path`.
pub(crate) fn key_source(
    explicit: Option<&PathBuf>,
    config: &DistributionConfig,
) -> Result<JsonFileKeySource, DistributionOpError> {
    explicit
        .or(config.keys_path.as_ref())
        .map(JsonFileKeySource::new)
        .ok_or(DistributionOpError::NoKeySource)
}
