use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The name of the per-network deployment record file.
pub const RECORD_FILENAME: &str = "deployments.json";

/// The name of the lock file guarding a network's record.
pub const LOCK_FILENAME: &str = ".mortar.lock";

/// Inputs that determine what a step deploys.
///
/// When any of them changes, the recorded address no longer describes the
/// contract the plan asks for and the step must be deployed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFingerprint {
    /// Chain the contract lives on.
    pub chain_id: u64,
    /// Artifact name.
    pub artifact: String,
    /// SHA-256 of the creation bytecode followed by the encoded constructor arguments.
    pub init_code_hash: String,
}

impl StepFingerprint {
    pub fn new(chain_id: u64, artifact: &str, init_code: &Bytes) -> Self {
        Self {
            chain_id,
            artifact: artifact.to_string(),
            init_code_hash: hex::encode(Sha256::digest(init_code)),
        }
    }

    /// Compute a SHA-256 hash of this fingerprint.
    ///
    /// The struct is serialized to JSON before hashing, so the same inputs always
    /// produce the same hash.
    pub fn compute_hash(&self) -> Result<String> {
        hash_json(self)
    }
}

/// Inputs that determine what a wiring call does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringFingerprint {
    pub chain_id: u64,
    /// Address of the contract receiving the call.
    pub target: Address,
    /// Hex-encoded calldata.
    pub calldata: String,
}

impl WiringFingerprint {
    pub fn new(chain_id: u64, target: Address, calldata: &Bytes) -> Self {
        Self {
            chain_id,
            target,
            calldata: hex::encode(calldata),
        }
    }

    pub fn compute_hash(&self) -> Result<String> {
        hash_json(self)
    }
}

fn hash_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).context("Failed to serialize fingerprint")?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}

/// A contract deployed by a previous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub deployed_at: DateTime<Utc>,
}

/// A wiring call executed by a previous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringRecord {
    pub tx_hash: String,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub executed_at: DateTime<Utc>,
}

/// Everything deployed to one network, persisted as `<outdata>/<network>/deployments.json`.
///
/// The file is rewritten after every mined transaction, so an aborted run leaves
/// behind an accurate account of what is already on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    pub chain_id: u64,
    /// Version of mortar that last wrote this record.
    pub mortar_version: String,
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
    #[serde(default)]
    pub wiring: BTreeMap<String, WiringRecord>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl DeploymentRecord {
    /// Create an empty record that lives only in memory.
    pub fn new(network: impl Into<String>, chain_id: u64) -> Self {
        Self {
            network: network.into(),
            chain_id,
            mortar_version: env!("CARGO_PKG_VERSION").to_string(),
            steps: BTreeMap::new(),
            wiring: BTreeMap::new(),
            path: None,
        }
    }

    /// The record location for `network` under `outdata`.
    pub fn path_for(outdata: &Path, network: &str) -> PathBuf {
        outdata.join(network).join(RECORD_FILENAME)
    }

    /// Load the record for `network`, or start a new one if none exists yet.
    ///
    /// Fails when the existing record was written for a different chain.
    pub fn load_or_new(outdata: &Path, network: &str, chain_id: u64) -> Result<Self> {
        let path = Self::path_for(outdata, network);

        let mut record = if path.exists() {
            let record = Self::load_from_file(&path)?;
            if record.chain_id != chain_id {
                anyhow::bail!(
                    "Deployment record {} belongs to chain {}, but the node reports chain {}",
                    path.display(),
                    record.chain_id,
                    chain_id
                );
            }
            tracing::info!(
                path = %path.display(),
                steps = record.steps.len(),
                wiring = record.wiring.len(),
                "Deployment record loaded"
            );
            record
        } else {
            tracing::debug!(path = %path.display(), "No deployment record yet, starting a new one");
            Self::new(network, chain_id)
        };

        record.path = Some(path);
        Ok(record)
    }

    /// Load a record from a file.
    ///
    /// Returns an error if the file doesn't exist, is malformed, or cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment record from {}",
            path.display()
        ))?;

        let mut record: Self =
            serde_json::from_str(&content).context("Failed to parse deployment record JSON")?;
        record.path = Some(path.to_path_buf());

        Ok(record)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the record to its file, if it has one.
    ///
    /// The content goes to a temporary file first and is renamed into place, so a
    /// crash never leaves a truncated record.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create deployment record directory {}",
                parent.display()
            ))?;
        }

        self.mortar_version = env!("CARGO_PKG_VERSION").to_string();
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).context(format!(
            "Failed to write deployment record to {}",
            tmp_path.display()
        ))?;
        std::fs::rename(&tmp_path, &path).context(format!(
            "Failed to move deployment record into {}",
            path.display()
        ))?;

        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.get(name)
    }

    pub fn wiring(&self, key: &str) -> Option<&WiringRecord> {
        self.wiring.get(key)
    }

    pub fn record_step(&mut self, name: impl Into<String>, record: StepRecord) {
        self.steps.insert(name.into(), record);
    }

    pub fn record_wiring(&mut self, key: impl Into<String>, record: WiringRecord) {
        self.wiring.insert(key.into(), record);
    }
}

/// Exclusive lock on a network's record, released on drop.
///
/// Two runs against the same network would race on nonces and on the record file.
#[derive(Debug)]
pub struct RecordLock {
    _file: File,
    path: PathBuf,
}

impl RecordLock {
    pub fn acquire(outdata: &Path, network: &str) -> Result<Self> {
        let dir = outdata.join(network);
        std::fs::create_dir_all(&dir)
            .context(format!("Failed to create directory {}", dir.display()))?;

        let path = dir.join(LOCK_FILENAME);
        let file = File::create(&path)
            .context(format!("Failed to create lock file {}", path.display()))?;
        file.try_lock_exclusive().context(format!(
            "Another deployment to '{network}' is in progress ({} is locked)",
            path.display()
        ))?;

        tracing::debug!(path = %path.display(), "Acquired deployment lock");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
