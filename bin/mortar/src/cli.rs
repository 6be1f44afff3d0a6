use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::Overrides;

/// How `status` prints the deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "mortar")]
#[command(
    author,
    version,
    about = "Deploy and wire smart contracts from a declarative plan"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "MORTAR_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a settings file providing defaults for `plan`, `network` and `outdata`.
    ///
    /// Values from `MORTAR_PLAN`, `MORTAR_NETWORK` and `MORTAR_OUTDATA` take precedence
    /// over the file, and command-line flags over both.
    #[arg(long, global = true, alias = "conf", env = "MORTAR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the plan to a network, skipping what the record shows is already there.
    Deploy(DeployArgs),

    /// Validate a plan and print the steps that would run.
    Check(CheckArgs),

    /// Print what has been deployed to a network.
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// The plan file, or a directory containing `Mortar.toml`.
    #[arg(short, long)]
    pub plan: Option<PathBuf>,

    /// The network section of the plan to deploy to.
    #[arg(short, long)]
    pub network: Option<String>,

    /// The directory holding the per-network deployment records.
    #[arg(long)]
    pub outdata: Option<PathBuf>,

    /// Redeploy every enabled step, ignoring the deployment record.
    #[arg(long, default_value_t = false)]
    pub redeploy: bool,

    /// Check that the plan can run against the network without sending transactions.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl DeployArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            plan: self.plan.clone(),
            network: self.network.clone(),
            outdata: self.outdata.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// The plan file, or a directory containing `Mortar.toml`.
    #[arg(short, long)]
    pub plan: Option<PathBuf>,

    /// Apply the deploy switches of this network.
    #[arg(short, long)]
    pub network: Option<String>,
}

impl CheckArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            plan: self.plan.clone(),
            network: self.network.clone(),
            outdata: None,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// The network to report on.
    #[arg(short, long)]
    pub network: Option<String>,

    /// The directory holding the per-network deployment records.
    #[arg(long)]
    pub outdata: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl StatusArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            plan: None,
            network: self.network.clone(),
            outdata: self.outdata.clone(),
        }
    }
}
