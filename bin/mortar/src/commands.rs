use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use mortar_deploy::{
    ChainClient, DeploymentPlan, DeploymentRecord, Orchestrator, RecordLock, RpcClient,
    outcome_table, record_table,
};

use crate::{cli::OutputFormat, config::Settings};

/// Deploy the plan to the selected network.
pub async fn deploy(settings: &Settings, redeploy: bool, dry_run: bool) -> Result<()> {
    let network = settings.network()?;
    let plan = DeploymentPlan::load_from_file(&settings.plan)?;
    let network_config = plan.network(network)?.clone();
    let plan = plan.for_network(Some(network))?;

    let client = RpcClient::connect(&network_config)
        .await
        .with_context(|| format!("Failed to connect to network '{}'", network))?;

    if dry_run {
        let mut orchestrator = Orchestrator::new(plan, network, client);
        if let Some(record) = existing_record(settings, network)? {
            orchestrator = orchestrator.record(record);
        }
        orchestrator.preflight().await?;

        tracing::info!(network, "✓ Dry run passed, no transaction sent");
        println!("{}", plan_table(orchestrator.plan()));
        return Ok(());
    }

    let _lock = RecordLock::acquire(&settings.outdata, network)?;
    let record = DeploymentRecord::load_or_new(&settings.outdata, network, client.chain_id())?;

    let outcome = Orchestrator::new(plan, network, client)
        .record(record)
        .redeploy(redeploy)
        .run()
        .await?;

    println!("{}", outcome_table(&outcome));
    Ok(())
}

/// Validate the plan and print the steps in execution order.
pub fn check(settings: &Settings) -> Result<()> {
    let plan = DeploymentPlan::load_from_file(&settings.plan)?;
    let plan = plan.for_network(settings.network.as_deref())?;

    tracing::info!(
        steps = plan.steps.len(),
        enabled = plan.enabled_steps().count(),
        wiring = plan.wiring.len(),
        "✓ Plan is valid"
    );
    println!("{}", plan_table(&plan));
    Ok(())
}

/// Print the deployment record of the selected network.
pub fn status(settings: &Settings, format: OutputFormat) -> Result<()> {
    let network = settings.network()?;
    let record = existing_record(settings, network)?.with_context(|| {
        format!(
            "Nothing has been deployed to '{}' yet (no record under {})",
            network,
            settings.outdata.display()
        )
    })?;

    match format {
        OutputFormat::Table => println!("{}", record_table(&record)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialize record")?
        ),
    }
    Ok(())
}

fn existing_record(settings: &Settings, network: &str) -> Result<Option<DeploymentRecord>> {
    let path = DeploymentRecord::path_for(&settings.outdata, network);
    if !path.exists() {
        return Ok(None);
    }
    DeploymentRecord::load_from_file(&path).map(Some)
}

/// One row per step then one per wiring action, in execution order.
fn plan_table(plan: &DeploymentPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["#", "Step", "Artifact", "Enabled", "Arguments"]);

    for (index, step) in plan.steps.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            step.name.clone(),
            step.artifact_name().to_string(),
            if step.enabled { "yes" } else { "no" }.to_string(),
            join_args(step.args.iter()),
        ]);
    }

    for (index, action) in plan.wiring.iter().enumerate() {
        table.add_row(vec![
            (plan.steps.len() + index + 1).to_string(),
            action.label(),
            "-".to_string(),
            "yes".to_string(),
            join_args(action.args.iter()),
        ]);
    }

    table
}

fn join_args<T: ToString>(args: impl Iterator<Item = T>) -> String {
    args.map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}
