use clap::Args;
use tekdist::Distribution;

use super::DistributionOpError;

/// Publish an already materialized tree.
#[derive(Args, Debug, Clone)]
pub struct Publish;

#[async_trait::async_trait]
impl crate::cli::op::Op for Publish {
    type Error = DistributionOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, _guards) = ctx.load_with_logging()?;
        let distribution = Distribution::from_config(config).await?;

        let summary = distribution.publish().await?;
        let line = format!(
            "published {} objects, {} unchanged",
            summary.uploaded.len(),
            summary.unchanged
        );
        match summary.warning() {
            Some(warning) => {
                let failed = summary
                    .failures
                    .iter()
                    .map(|f| format!("  {}: {}", f.key, f.reason))
                    .collect::<Vec<_>>()
                    .join("\n");
                Err(DistributionOpError::Incomplete(format!(
                    "{line}; {warning}\n{failed}"
                )))
            }
            None => Ok(line),
        }
    }
}
