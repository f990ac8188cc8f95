use chrono::NaiveDate;
use clap::Args;
use tekdist::Distribution;

use super::DistributionOpError;
use crate::cli::op::today;

/// Delete artifacts older than the retention horizon.
#[derive(Args, Debug, Clone)]
pub struct Retain {
    /// Reference date (defaults to today in UTC)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Retain {
    type Error = DistributionOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, _guards) = ctx.load_with_logging()?;
        let distribution = Distribution::from_config(config).await?;

        let summary = distribution.retain(today(self.today)).await?;
        let cutoff = summary
            .cutoff
            .map(|c| c.to_string())
            .unwrap_or_default();
        let line = format!(
            "cutoff {cutoff}: deleted {} objects and {} local directories, kept {}",
            summary.deleted.len(),
            summary.local_deleted.len(),
            summary.retained
        );
        if summary.is_success() {
            Ok(line)
        } else {
            Err(DistributionOpError::Incomplete(format!(
                "{line}; {} deletions failed",
                summary.failures.len()
            )))
        }
    }
}
