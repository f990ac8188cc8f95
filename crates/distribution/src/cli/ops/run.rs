use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use tekdist::Distribution;

use super::{key_source, DistributionOpError};
use crate::cli::op::today;

/// Build, publish and purge in one go.
#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Distribution date (defaults to today in UTC)
    #[arg(long)]
    pub today: Option<NaiveDate>,

    /// JSON key file (overrides keys_path)
    #[arg(long)]
    pub keys: Option<PathBuf>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = DistributionOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, _guards) = ctx.load_with_logging()?;
        let source = key_source(self.keys.as_ref(), &config)?;
        let distribution = Distribution::from_config(config).await?;

        let summary = distribution
            .run_once(&source, today(self.today))
            .await?;
        if !summary.is_success() {
            return Err(DistributionOpError::Incomplete(summary.to_string()));
        }
        Ok(summary.to_string())
    }
}
