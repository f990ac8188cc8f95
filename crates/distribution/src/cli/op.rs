use std::error::Error;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use tekdist::process::init_logging;
use tekdist::{ConfigError, DistributionConfig};

#[derive(Clone, Debug)]
pub struct OpContext {
    /// Configuration file the ops load on demand
    pub config_path: PathBuf,
}

impl OpContext {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn load_config(&self) -> Result<DistributionConfig, ConfigError> {
        DistributionConfig::load(&self.config_path)
    }

    /// Load the configuration and start logging as it prescribes. The
    /// returned guards must outlive the op.
    pub fn load_with_logging(
        &self,
    ) -> Result<
        (
            DistributionConfig,
            Vec<tracing_appender::non_blocking::WorkerGuard>,
        ),
        ConfigError,
    > {
        let config = self.load_config()?;
        let guards = init_logging(config.log_level()?, config.log_dir.as_deref());
        Ok((config, guards))
    }
}

/// Distribution date: the explicit one, or today in UTC.
pub fn today(explicit: Option<NaiveDate>) -> NaiveDate {
    explicit.unwrap_or_else(|| Utc::now().date_naive())
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
