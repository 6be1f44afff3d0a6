//! Sequential execution of a deployment plan.

use std::collections::BTreeSet;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;

use crate::{
    ArtifactStore, ChainClient, DeployError, DeployedRegistry, DeploymentPlan, DeploymentRecord,
    DeploymentReporter, StepFingerprint, StepRecord, StepReport, TracingReporter,
    WiringFingerprint, WiringRecord,
};

/// What happened to a step during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// A contract-creation transaction was mined.
    Deployed { tx_hash: String },
    /// The recorded deployment matched the plan and was kept.
    Reused,
    /// The step is disabled.
    Skipped,
}

impl StepStatus {
    pub fn is_deployed(&self) -> bool {
        matches!(self, StepStatus::Deployed { .. })
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, StepStatus::Reused)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    /// Address of the step, if one is known. A skipped step may still carry the
    /// address recorded by an earlier run.
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringStatus {
    Executed { tx_hash: String },
    Reused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringOutcome {
    pub label: String,
    pub target: Address,
    pub status: WiringStatus,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub network: String,
    pub registry: DeployedRegistry,
    pub steps: Vec<StepOutcome>,
    pub wiring: Vec<WiringOutcome>,
}

impl DeploymentOutcome {
    pub fn address(&self, step: &str) -> Option<Address> {
        self.registry.get(step)
    }

    pub fn count(&self, predicate: impl Fn(&StepStatus) -> bool) -> usize {
        self.steps.iter().filter(|s| predicate(&s.status)).count()
    }
}

/// Executes a [`DeploymentPlan`] against one network.
///
/// Steps run strictly in plan order and each transaction is awaited until mined
/// before the next one is sent. Wiring actions run after every step, in
/// declaration order. The first failure aborts the run; whatever was mined
/// before it stays in the deployment record.
///
/// # Example
///
/// ```no_run
/// use mortar_deploy::{DeploymentPlan, DeploymentRecord, Orchestrator, RpcClient, ChainClient};
///
/// # async fn example() -> anyhow::Result<()> {
/// let plan = DeploymentPlan::load_from_file("Mortar.toml".as_ref())?;
/// let network = plan.network("development")?.clone();
/// let plan = plan.for_network(Some("development"))?;
///
/// let client = RpcClient::connect(&network).await?;
/// let record = DeploymentRecord::load_or_new("deployments".as_ref(), "development", client.chain_id())?;
///
/// let outcome = Orchestrator::new(plan, "development", client)
///     .record(record)
///     .run()
///     .await?;
/// println!("ESDToken deployed at {:?}", outcome.address("ESDToken"));
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator<C> {
    plan: DeploymentPlan,
    network: String,
    client: C,
    artifacts: ArtifactStore,
    reporter: Box<dyn DeploymentReporter>,
    record: Option<DeploymentRecord>,
    redeploy: bool,
    deployer: Option<Address>,
}

impl<C: ChainClient> Orchestrator<C> {
    /// Create an orchestrator reading artifacts from the plan's artifacts directory.
    pub fn new(plan: DeploymentPlan, network: impl Into<String>, client: C) -> Self {
        let artifacts = ArtifactStore::from_dir(plan.artifacts.clone());
        Self {
            plan,
            network: network.into(),
            client,
            artifacts,
            reporter: Box::new(TracingReporter),
            record: None,
            redeploy: false,
            deployer: None,
        }
    }

    /// Use `artifacts` instead of the plan's artifacts directory.
    pub fn artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn reporter(mut self, reporter: impl DeploymentReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Persist progress to `record` and reuse the deployments it already holds.
    pub fn record(mut self, record: DeploymentRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Ignore the record and deploy every enabled step again.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    /// Address substituted for `deployer` arguments. Defaults to the client's sender.
    pub fn deployer(mut self, deployer: Address) -> Self {
        self.deployer = Some(deployer);
        self
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    /// Registry holding the recorded addresses of disabled steps.
    ///
    /// A disabled step keeps whatever a previous run deployed, as long as the
    /// contract still exists on chain; otherwise it has no address at all.
    async fn seed_registry(&self) -> Result<DeployedRegistry> {
        let mut registry = DeployedRegistry::new();

        let Some(record) = &self.record else {
            return Ok(registry);
        };

        for step in self.plan.steps.iter().filter(|s| !s.enabled) {
            let Some(entry) = record.step(&step.name) else {
                continue;
            };
            if is_live(&self.client, &step.name, entry.address).await? {
                registry.insert(step.name.clone(), entry.address)?;
            }
        }

        Ok(registry)
    }

    /// Check the whole run can resolve before any transaction is sent.
    ///
    /// Every dependency of an enabled step must be an earlier enabled step or a
    /// disabled one whose recorded contract still has code on chain, every wiring reference must be available once all
    /// steps ran, and every artifact must exist with a matching constructor or
    /// method. Returns the seeded registry.
    pub async fn preflight(&mut self) -> Result<DeployedRegistry> {
        self.plan.validate()?;

        if let Some(record) = &self.record {
            let actual = self.client.chain_id();
            if record.chain_id != actual {
                return Err(DeployError::ChainIdMismatch {
                    expected: record.chain_id,
                    actual,
                }
                .into());
            }
        }

        let registry = self.seed_registry().await?;
        let mut available: BTreeSet<String> =
            registry.iter().map(|(name, _)| name.to_string()).collect();

        for step in self.plan.enabled_steps() {
            if let Some(missing) = step.dependencies().find(|d| !available.contains(*d)) {
                return Err(DeployError::MissingAddress {
                    dependency: missing.to_string(),
                    required_by: step.name.clone(),
                }
                .into());
            }

            let artifact = self.artifacts.get(step.artifact_name())?;
            let expected = artifact.constructor_arity();
            if expected != step.args.len() {
                return Err(DeployError::ArityMismatch {
                    artifact: artifact.name.clone(),
                    expected,
                    actual: step.args.len(),
                }
                .into());
            }

            available.insert(step.name.clone());
        }

        for action in &self.plan.wiring {
            if let Some(missing) = action.dependencies().find(|d| !available.contains(*d)) {
                return Err(DeployError::MissingAddress {
                    dependency: missing.to_string(),
                    required_by: action.label(),
                }
                .into());
            }

            let target = self
                .plan
                .find_step(&action.target)
                .context(format!("Wiring target '{}' is not a step", action.target))?;
            let artifact = self.artifacts.get(target.artifact_name())?;
            if !artifact.has_method(&action.method, action.args.len()) {
                return Err(DeployError::UnknownMethod {
                    artifact: artifact.name.clone(),
                    method: action.method.clone(),
                    arity: action.args.len(),
                }
                .into());
            }
        }

        tracing::debug!(
            network = %self.network,
            enabled = self.plan.enabled_steps().count(),
            wiring = self.plan.wiring.len(),
            "Preflight passed"
        );

        Ok(registry)
    }

    /// Run the plan: preflight, then every step, then every wiring action.
    pub async fn run(mut self) -> Result<DeploymentOutcome> {
        let chain_id = self.client.chain_id();
        let sender = self.client.sender();
        let deployer = self.deployer.unwrap_or(sender);

        self.reporter.run_started(&self.network, chain_id, sender);
        let mut registry = self.preflight().await?;

        let Self {
            plan,
            network,
            client,
            mut artifacts,
            reporter,
            mut record,
            redeploy,
            deployer: _,
        } = self;

        let mut steps = Vec::with_capacity(plan.steps.len());
        let mut deployed = BTreeSet::new();

        for step in &plan.steps {
            if !step.enabled {
                reporter.step_skipped(&step.name);
                steps.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::Skipped,
                    address: registry.get(&step.name),
                });
                continue;
            }

            let args = step.resolve_args(&registry, deployer)?;
            let artifact_name = step.artifact_name();
            let init_code = artifacts
                .get(artifact_name)?
                .encode_deployment(&args)
                .context(format!("Failed to encode deployment of '{}'", step.name))?;
            let fingerprint =
                StepFingerprint::new(chain_id, artifact_name, &init_code).compute_hash()?;

            let recorded = record
                .as_ref()
                .and_then(|r| r.step(&step.name))
                .filter(|r| !redeploy && r.fingerprint == fingerprint)
                .map(|r| r.address);
            let reusable = match recorded {
                Some(address) => is_live(&client, &step.name, address).await?.then_some(address),
                None => None,
            };

            if let Some(address) = reusable {
                registry.insert(step.name.clone(), address)?;
                reporter.step_reused(&step.name, address);
                steps.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::Reused,
                    address: Some(address),
                });
                continue;
            }

            reporter.step_started(&step.name, artifact_name, &args);

            let deployment = client
                .deploy(&step.name, init_code)
                .await
                .with_context(|| format!("Failed to deploy step '{}'", step.name))?;
            let timestamp = Utc::now();

            if let Some(record) = record.as_mut() {
                record.record_step(
                    step.name.clone(),
                    StepRecord {
                        address: deployment.address,
                        tx_hash: Some(deployment.tx_hash.clone()),
                        fingerprint,
                        block_number: deployment.block_number,
                        deployed_at: timestamp,
                    },
                );
                record.save().with_context(|| {
                    format!(
                        "'{}' was deployed at {} but the deployment record could not be saved",
                        step.name, deployment.address
                    )
                })?;
            }

            registry
                .insert(step.name.clone(), deployment.address)
                .with_context(|| {
                    format!(
                        "'{}' was deployed at {} (tx {}) but its address could not be registered",
                        step.name, deployment.address, deployment.tx_hash
                    )
                })?;
            deployed.insert(step.name.clone());

            reporter.step_deployed(&StepReport {
                step: &step.name,
                artifact: artifact_name,
                address: deployment.address,
                tx_hash: &deployment.tx_hash,
                timestamp,
            });

            steps.push(StepOutcome {
                name: step.name.clone(),
                status: StepStatus::Deployed {
                    tx_hash: deployment.tx_hash,
                },
                address: Some(deployment.address),
            });
        }

        let mut wiring = Vec::with_capacity(plan.wiring.len());

        for (index, action) in plan.wiring.iter().enumerate() {
            let label = action.label();
            let target = registry.require(&action.target, &label)?;
            let args = action.resolve_args(&registry, deployer)?;

            let target_step = plan
                .find_step(&action.target)
                .context(format!("Wiring target '{}' is not a step", action.target))?;
            let calldata = artifacts
                .get(target_step.artifact_name())?
                .encode_call(&action.method, &args)?;

            let key = action.key(index);
            let fingerprint = WiringFingerprint::new(chain_id, target, &calldata).compute_hash()?;

            // A freshly deployed contract starts from empty storage.
            let applied = !redeploy
                && !action.dependencies().any(|d| deployed.contains(d))
                && record
                    .as_ref()
                    .and_then(|r| r.wiring(&key))
                    .is_some_and(|r| r.fingerprint == fingerprint);

            if applied {
                reporter.wiring_reused(&label);
                wiring.push(WiringOutcome {
                    label,
                    target,
                    status: WiringStatus::Reused,
                });
                continue;
            }

            reporter.wiring_started(&label, target, &args);

            let receipt = client
                .call(&label, target, calldata)
                .await
                .with_context(|| format!("Failed to execute wiring '{}'", label))?;

            if let Some(record) = record.as_mut() {
                record.record_wiring(
                    key,
                    WiringRecord {
                        tx_hash: receipt.tx_hash.clone(),
                        fingerprint,
                        block_number: receipt.block_number,
                        executed_at: Utc::now(),
                    },
                );
                record.save().with_context(|| {
                    format!(
                        "'{}' was executed but the deployment record could not be saved",
                        label
                    )
                })?;
            }

            reporter.wiring_executed(&label, &receipt.tx_hash);

            wiring.push(WiringOutcome {
                label,
                target,
                status: WiringStatus::Executed {
                    tx_hash: receipt.tx_hash,
                },
            });
        }

        let outcome = DeploymentOutcome {
            network,
            registry,
            steps,
            wiring,
        };
        reporter.run_finished(&outcome);

        Ok(outcome)
    }
}

/// Whether a contract exists at `address`.
async fn is_live<C: ChainClient>(client: &C, step: &str, address: Address) -> Result<bool> {
    let code = client.code_at(address).await?;
    if code.is_empty() {
        tracing::warn!(
            step,
            address = %address,
            "Recorded contract has no code on chain, ignoring the record entry"
        );
    }
    Ok(!code.is_empty())
}
