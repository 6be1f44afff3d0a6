//! Layered command settings.
//!
//! Built-in defaults, then the optional settings file, then `MORTAR_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// The default directory holding per-network deployment records.
pub const DEFAULT_OUTDATA: &str = "deployments";

/// Environment variable prefix for settings.
const ENV_PREFIX: &str = "MORTAR_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Plan file, or a directory containing `Mortar.toml`.
    pub plan: PathBuf,
    pub network: Option<String>,
    pub outdata: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plan: PathBuf::from("."),
            network: None,
            outdata: PathBuf::from(DEFAULT_OUTDATA),
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdata: Option<PathBuf>,
}

impl Settings {
    pub fn load(config: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config {
            if !path.exists() {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).only(&["plan", "network", "outdata"]))
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("Failed to load settings")?;

        tracing::debug!(
            plan = %settings.plan.display(),
            network = ?settings.network,
            outdata = %settings.outdata.display(),
            "Settings loaded"
        );
        Ok(settings)
    }

    /// The selected network, which every on-chain command needs.
    pub fn network(&self) -> Result<&str> {
        self.network
            .as_deref()
            .context("No network selected; pass --network or set MORTAR_NETWORK")
    }
}
