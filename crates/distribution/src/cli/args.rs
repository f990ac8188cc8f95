pub use clap::Parser;

use std::path::PathBuf;

use tekdist::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "tekdist")]
#[command(about = "Bundle, sign and publish diagnosis keys")]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: crate::Command,
}
