// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Build, Keygen, Publish, Retain, Run, Verify, Version};

command_enum! {
    (Run, Run),
    (Build, Build),
    (Publish, Publish),
    (Retain, Retain),
    (Keygen, Keygen),
    (Verify, Verify),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.config);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
