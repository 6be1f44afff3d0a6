//! Progress reporting for deployment runs.
//!
//! The orchestrator only emits events; how they are presented is up to the
//! [`DeploymentReporter`] it is given.

use alloy_core::primitives::Address;
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};

use crate::{DeploymentOutcome, DeploymentRecord, StepStatus, WiringStatus};

/// A contract deployed during the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport<'a> {
    pub step: &'a str,
    pub artifact: &'a str,
    pub address: Address,
    pub tx_hash: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Observer of a deployment run. Every method defaults to doing nothing.
pub trait DeploymentReporter: Send + Sync {
    fn run_started(&self, _network: &str, _chain_id: u64, _sender: Address) {}

    fn step_skipped(&self, _step: &str) {}

    fn step_reused(&self, _step: &str, _address: Address) {}

    fn step_started(&self, _step: &str, _artifact: &str, _args: &[String]) {}

    fn step_deployed(&self, _report: &StepReport<'_>) {}

    fn wiring_started(&self, _label: &str, _target: Address, _args: &[String]) {}

    fn wiring_reused(&self, _label: &str) {}

    fn wiring_executed(&self, _label: &str, _tx_hash: &str) {}

    fn run_finished(&self, _outcome: &DeploymentOutcome) {}
}

/// Reporter emitting structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl DeploymentReporter for TracingReporter {
    fn run_started(&self, network: &str, chain_id: u64, sender: Address) {
        tracing::info!(network, chain_id, sender = %sender, "Starting deployment run...");
    }

    fn step_skipped(&self, step: &str) {
        tracing::info!(step, "Step disabled, skipping");
    }

    fn step_reused(&self, step: &str, address: Address) {
        tracing::info!(step, address = %address, "Already deployed, reusing recorded address");
    }

    fn step_started(&self, step: &str, artifact: &str, args: &[String]) {
        tracing::info!(step, artifact, ?args, "Deploying contract...");
    }

    fn step_deployed(&self, report: &StepReport<'_>) {
        tracing::info!(
            step = report.step,
            artifact = report.artifact,
            address = %report.address,
            tx_hash = report.tx_hash,
            timestamp = %report.timestamp.to_rfc3339(),
            "Contract deployed"
        );
    }

    fn wiring_started(&self, label: &str, target: Address, args: &[String]) {
        tracing::info!(call = label, target = %target, ?args, "Wiring contract...");
    }

    fn wiring_reused(&self, label: &str) {
        tracing::info!(call = label, "Wiring already applied, skipping");
    }

    fn wiring_executed(&self, label: &str, tx_hash: &str) {
        tracing::info!(call = label, tx_hash, "Wiring applied");
    }

    fn run_finished(&self, outcome: &DeploymentOutcome) {
        tracing::info!(
            network = %outcome.network,
            deployed = outcome.count(StepStatus::is_deployed),
            reused = outcome.count(StepStatus::is_reused),
            skipped = outcome.count(StepStatus::is_skipped),
            wired = outcome.wiring.len(),
            "✓ Deployment complete!"
        );
    }
}

/// Summary of a run, one row per step then one per wiring action.
pub fn outcome_table(outcome: &DeploymentOutcome) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Step", "Status", "Address", "Transaction"]);

    for step in &outcome.steps {
        let (status, tx_hash) = match &step.status {
            StepStatus::Deployed { tx_hash } => ("deployed", tx_hash.as_str()),
            StepStatus::Reused => ("reused", "-"),
            StepStatus::Skipped => ("skipped", "-"),
        };
        let address = step
            .address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![step.name.clone(), status.to_string(), address, tx_hash.to_string()]);
    }

    for action in &outcome.wiring {
        let (status, tx_hash) = match &action.status {
            WiringStatus::Executed { tx_hash } => ("wired", tx_hash.as_str()),
            WiringStatus::Reused => ("already wired", "-"),
        };
        table.add_row(vec![
            action.label.clone(),
            status.to_string(),
            action.target.to_string(),
            tx_hash.to_string(),
        ]);
    }

    table
}

/// Contents of a deployment record.
pub fn record_table(record: &DeploymentRecord) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Step", "Address", "Transaction", "Block", "Deployed at"]);

    for (name, step) in &record.steps {
        table.add_row(vec![
            name.clone(),
            step.address.to_string(),
            step.tx_hash.clone().unwrap_or_else(|| "-".to_string()),
            block(step.block_number),
            step.deployed_at.to_rfc3339(),
        ]);
    }

    for (key, wiring) in &record.wiring {
        table.add_row(vec![
            key.clone(),
            "-".to_string(),
            wiring.tx_hash.clone(),
            block(wiring.block_number),
            wiring.executed_at.to_rfc3339(),
        ]);
    }

    table
}

fn block(number: Option<u64>) -> String {
    number.map_or_else(|| "-".to_string(), |n| n.to_string())
}
