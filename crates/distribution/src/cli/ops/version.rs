use clap::Args;
use tekdist::process::utils::build_profile;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(format!("tekdist {} ({})", env!("CARGO_PKG_VERSION"), build_profile()))
    }
}
