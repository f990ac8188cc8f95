// Distribution run modules
pub mod config;
pub mod process;
pub mod runner;
pub mod source;

pub use config::{ConfigError, DistributionConfig, PublishSettings, SignatureConfig};
pub use runner::{load_signer, BuildSummary, Distribution, DistributionError, RunSummary};
pub use source::{JsonFileKeySource, KeySource, SourceError, StaticKeySource};
