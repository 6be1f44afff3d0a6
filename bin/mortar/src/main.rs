//! mortar deploys and wires smart contracts from a declarative, per-network plan.

mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Command::Deploy(args) => {
            let settings = Settings::load(config, args.overrides())?;
            commands::deploy(&settings, args.redeploy, args.dry_run).await
        }
        Command::Check(args) => {
            let settings = Settings::load(config, args.overrides())?;
            commands::check(&settings)
        }
        Command::Status(args) => {
            let settings = Settings::load(config, args.overrides())?;
            commands::status(&settings, args.format)
        }
    }
}
