//! Declarative deployment plans.
//!
//! A plan lists the contracts to deploy in order, the constructor arguments of each
//! one, and the wiring calls to run once every contract is on-chain. Plans are
//! usually loaded from a `Mortar.toml` file and narrowed to one network with
//! [`DeploymentPlan::for_network`].

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, DeployedRegistry};

/// The default name for the plan file.
pub const PLAN_FILENAME: &str = "Mortar.toml";

/// The default directory holding compiled contract artifacts.
pub const DEFAULT_ARTIFACTS_DIR: &str = "build/contracts";

/// The default time to wait for a transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// A single constructor or wiring argument.
///
/// In TOML: `{ address = "ESDToken" }`, `{ literal = "1000" }` or `"deployer"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    /// The address produced by another step.
    Address(String),
    /// A literal value, coerced to the ABI parameter type at encoding time.
    Literal(String),
    /// The account sending the transactions.
    Deployer,
}

impl Arg {
    pub fn address(step: impl Into<String>) -> Self {
        Self::Address(step.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// The step this argument depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Arg::Address(step) => Some(step),
            Arg::Literal(_) | Arg::Deployer => None,
        }
    }

    /// Resolve the argument to its textual ABI form.
    pub fn resolve(
        &self,
        registry: &DeployedRegistry,
        deployer: Address,
        required_by: &str,
    ) -> Result<String, DeployError> {
        match self {
            Arg::Address(step) => Ok(format_address(registry.require(step, required_by)?)),
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Deployer => Ok(format_address(deployer)),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Address(step) => write!(f, "{step}.address"),
            Arg::Literal(value) => write!(f, "{value:?}"),
            Arg::Deployer => write!(f, "deployer"),
        }
    }
}

fn format_address(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn default_enabled() -> bool {
    true
}

/// A single contract-creation unit within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    /// Unique step name, also the registry key.
    pub name: String,
    /// Whether the step runs. Overridden by deploy switches.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Artifact to deploy. Defaults to the step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Constructor arguments, in order.
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl DeploymentStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            artifact: None,
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Arg::reference)
    }

    /// Resolve the constructor arguments against the addresses recorded so far.
    pub fn resolve_args(
        &self,
        registry: &DeployedRegistry,
        deployer: Address,
    ) -> Result<Vec<String>, DeployError> {
        self.args
            .iter()
            .map(|arg| arg.resolve(registry, deployer, &self.name))
            .collect()
    }
}

/// A post-deployment call pushing addresses into an already deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringAction {
    /// Step whose contract receives the call.
    pub target: String,
    /// Method name, e.g. `setContext`.
    pub method: String,
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl WiringAction {
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Human readable label, `Target.method`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.target, self.method)
    }

    /// Key identifying the action in the deployment record.
    pub fn key(&self, index: usize) -> String {
        format!("{index}:{}", self.label())
    }

    /// The target plus every step referenced by an argument.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.target.as_str()).chain(self.args.iter().filter_map(Arg::reference))
    }

    pub fn resolve_args(
        &self,
        registry: &DeployedRegistry,
        deployer: Address,
    ) -> Result<Vec<String>, DeployError> {
        let label = self.label();
        self.args
            .iter()
            .map(|arg| arg.resolve(registry, deployer, &label))
            .collect()
    }
}

/// Connection settings and overrides for one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: Url,
    /// Expected chain id. Checked against the node when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Unlocked account sending the transactions. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Maximum time to wait for each transaction to be mined.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Per-network enable switches, taking precedence over the plan's.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deploy_switch: BTreeMap<String, bool>,
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

impl NetworkConfig {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            chain_id: None,
            from: None,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            deploy_switch: BTreeMap::new(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACTS_DIR)
}

/// An ordered, validated deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Directory holding the compiled contract artifacts.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts: PathBuf,
    /// Plan-wide enable switches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deploy_switch: BTreeMap<String, bool>,
    /// Deployment steps, in execution order.
    #[serde(default)]
    pub steps: Vec<DeploymentStep>,
    /// Wiring actions, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wiring: Vec<WiringAction>,
    /// Target networks by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for DeploymentPlan {
    fn default() -> Self {
        Self {
            artifacts: default_artifacts_dir(),
            deploy_switch: BTreeMap::new(),
            steps: Vec::new(),
            wiring: Vec::new(),
            networks: BTreeMap::new(),
        }
    }
}

impl DeploymentPlan {
    pub fn new(artifacts: impl Into<PathBuf>) -> Self {
        Self {
            artifacts: artifacts.into(),
            ..Default::default()
        }
    }

    pub fn step(mut self, step: DeploymentStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn wire(mut self, action: WiringAction) -> Self {
        self.wiring.push(action);
        self
    }

    pub fn switch(mut self, step: impl Into<String>, enabled: bool) -> Self {
        self.deploy_switch.insert(step.into(), enabled);
        self
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, DeployError> {
        self.networks
            .get(name)
            .ok_or_else(|| DeployError::UnknownNetwork(name.to_string()))
    }

    pub fn find_step(&self, name: &str) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Parse a plan from TOML and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content).context("Failed to parse plan file as TOML")?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan from a TOML file, or from the `Mortar.toml` inside a directory.
    ///
    /// A relative artifacts directory is resolved against the plan file's directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let plan_path = Self::resolve_path(path)?;

        let content = std::fs::read_to_string(&plan_path)
            .context(format!("Failed to read plan from {}", plan_path.display()))?;
        let plan: Self = toml::from_str(&content).context("Failed to parse plan file as TOML")?;
        let plan = plan.finalize(&plan_path)?;

        tracing::info!(
            path = %plan_path.display(),
            steps = plan.steps.len(),
            wiring = plan.wiring.len(),
            "Deployment plan loaded"
        );
        Ok(plan)
    }

    /// Locate the plan file for `path`, which may be the file itself or its directory.
    pub fn resolve_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            anyhow::bail!("Plan file or directory not found: {}", path.display());
        }

        Ok(if path.is_dir() {
            path.join(PLAN_FILENAME)
        } else {
            path.to_path_buf()
        })
    }

    /// Rebase the artifacts directory on the plan file location and validate.
    pub fn finalize(mut self, plan_path: &Path) -> Result<Self> {
        if self.artifacts.is_relative() {
            if let Some(base) = plan_path.parent() {
                self.artifacts = base.join(&self.artifacts);
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Save the plan to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize plan to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write plan to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Deployment plan saved");
        Ok(())
    }

    /// Check the plan for configuration errors.
    ///
    /// Rejects empty or duplicate step names, references to unknown steps,
    /// references to the step itself or to later steps, and switches naming
    /// unknown steps. Because every reference must point backwards, a valid plan
    /// cannot contain a dependency cycle.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut positions = BTreeMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(DeployError::EmptyStepName(index));
            }
            if positions.insert(step.name.as_str(), index).is_some() {
                return Err(DeployError::DuplicateStep(step.name.clone()));
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            for reference in step.dependencies() {
                match positions.get(reference) {
                    None => {
                        return Err(DeployError::UnknownReference {
                            required_by: step.name.clone(),
                            reference: reference.to_string(),
                        });
                    }
                    Some(&position) if position >= index => {
                        return Err(DeployError::ForwardReference {
                            step: step.name.clone(),
                            reference: reference.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        for action in &self.wiring {
            if let Some(reference) = action
                .dependencies()
                .find(|r| !positions.contains_key(r))
            {
                return Err(DeployError::UnknownReference {
                    required_by: action.label(),
                    reference: reference.to_string(),
                });
            }
        }

        let switches = self
            .deploy_switch
            .keys()
            .chain(self.networks.values().flat_map(|n| n.deploy_switch.keys()));
        for key in switches {
            if !positions.contains_key(key.as_str()) {
                return Err(DeployError::UnknownSwitch(key.clone()));
            }
        }

        Ok(())
    }

    /// Apply the plan-wide switches, then those of `network`, to the steps.
    ///
    /// With `None`, only the plan-wide switches apply.
    pub fn for_network(&self, network: Option<&str>) -> Result<Self, DeployError> {
        let mut plan = self.clone();

        let network_switches = match network {
            Some(name) => Some(&self.network(name)?.deploy_switch),
            None => None,
        };

        for step in &mut plan.steps {
            if let Some(&enabled) = self.deploy_switch.get(&step.name) {
                step.enabled = enabled;
            }
            if let Some(&enabled) = network_switches.and_then(|s| s.get(&step.name)) {
                step.enabled = enabled;
            }
        }

        Ok(plan)
    }

    pub fn enabled_steps(&self) -> impl Iterator<Item = &DeploymentStep> {
        self.steps.iter().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const ESD_PLAN: &str = r#"
artifacts = "build/contracts"

[deploy_switch]
Multicall = false

[[steps]]
name = "ESDToken"

[[steps]]
name = "ESDUser"
args = [{ address = "ESDToken" }]

[[steps]]
name = "Multicall"

[[steps]]
name = "Council"
artifact = "ESDCouncil"
args = [{ address = "ESDUser" }, "deployer", { literal = "3" }]

[[wiring]]
target = "ESDUser"
method = "setCouncil"
args = [{ address = "Council" }]

[networks.development]
rpc_url = "http://127.0.0.1:8545"
chain_id = 1337

[networks.development.deploy_switch]
Multicall = true
Council = false
"#;

    #[test]
    fn test_parse_plan() {
        let plan = DeploymentPlan::from_toml_str(ESD_PLAN).unwrap();

        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps[1].args, vec![Arg::address("ESDToken")]);
        assert_eq!(
            plan.steps[3].args,
            vec![Arg::address("ESDUser"), Arg::Deployer, Arg::literal("3")]
        );
        assert_eq!(plan.steps[3].artifact_name(), "ESDCouncil");
        assert_eq!(plan.steps[0].artifact_name(), "ESDToken");
        assert_eq!(plan.wiring[0].label(), "ESDUser.setCouncil");

        let network = plan.network("development").unwrap();
        assert_eq!(network.chain_id, Some(1337));
        assert_eq!(
            network.confirmation_timeout_secs,
            DEFAULT_CONFIRMATION_TIMEOUT_SECS
        );
    }

    #[test]
    fn test_switch_precedence() {
        let plan = DeploymentPlan::from_toml_str(ESD_PLAN).unwrap();

        let global = plan.for_network(None).unwrap();
        assert!(!global.find_step("Multicall").unwrap().enabled);
        assert!(global.find_step("Council").unwrap().enabled);

        let dev = plan.for_network(Some("development")).unwrap();
        assert!(dev.find_step("Multicall").unwrap().enabled);
        assert!(!dev.find_step("Council").unwrap().enabled);
        assert!(dev.find_step("ESDToken").unwrap().enabled);
    }

    #[test]
    fn test_unknown_network() {
        let plan = DeploymentPlan::from_toml_str(ESD_PLAN).unwrap();
        assert_eq!(
            plan.for_network(Some("mainnet")).unwrap_err(),
            DeployError::UnknownNetwork("mainnet".to_string())
        );
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDToken"))
            .step(DeploymentStep::new("ESDToken"));

        assert_eq!(
            plan.validate().unwrap_err(),
            DeployError::DuplicateStep("ESDToken".to_string())
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let plan = DeploymentPlan::default().step(DeploymentStep::new("  "));
        assert_eq!(plan.validate().unwrap_err(), DeployError::EmptyStepName(0));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDUser").with_arg(Arg::address("ESDToken")))
            .step(DeploymentStep::new("ESDToken"));

        assert_eq!(
            plan.validate().unwrap_err(),
            DeployError::ForwardReference {
                step: "ESDUser".to_string(),
                reference: "ESDToken".to_string(),
            }
        );
    }

    #[test]
    fn test_self_reference_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDToken").with_arg(Arg::address("ESDToken")));

        assert!(matches!(
            plan.validate().unwrap_err(),
            DeployError::ForwardReference { .. }
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("A").with_arg(Arg::address("B")))
            .step(DeploymentStep::new("B").with_arg(Arg::address("A")));

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDUser").with_arg(Arg::address("ESDTokn")));

        assert_eq!(
            plan.validate().unwrap_err(),
            DeployError::UnknownReference {
                required_by: "ESDUser".to_string(),
                reference: "ESDTokn".to_string(),
            }
        );
    }

    #[test]
    fn test_wiring_may_reference_any_step() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDUser"))
            .step(DeploymentStep::new("ESDContext").with_arg(Arg::address("ESDUser")))
            .wire(WiringAction::new("ESDUser", "setContext").with_arg(Arg::address("ESDContext")));

        assert!(plan.validate().is_ok());

        let broken = plan.wire(WiringAction::new("ESDInfo", "setContext"));
        assert!(matches!(
            broken.validate().unwrap_err(),
            DeployError::UnknownReference { ref reference, .. } if reference == "ESDInfo"
        ));
    }

    #[test]
    fn test_unknown_switch_rejected() {
        let plan = DeploymentPlan::default()
            .step(DeploymentStep::new("ESDToken"))
            .switch("SignReward", false);

        assert_eq!(
            plan.validate().unwrap_err(),
            DeployError::UnknownSwitch("SignReward".to_string())
        );
    }

    #[test]
    fn test_resolve_args() {
        let mut registry = DeployedRegistry::new();
        let token = Address::with_last_byte(0xaa);
        registry.insert("ESDToken", token).unwrap();

        let deployer = Address::with_last_byte(0x01);
        let step = DeploymentStep::new("ESDUser")
            .with_arg(Arg::address("ESDToken"))
            .with_arg(Arg::Deployer)
            .with_arg(Arg::literal("42"));

        let args = step.resolve_args(&registry, deployer).unwrap();
        assert_eq!(
            args,
            vec![
                "0x00000000000000000000000000000000000000aa".to_string(),
                "0x0000000000000000000000000000000000000001".to_string(),
                "42".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_args_missing_dependency() {
        let step = DeploymentStep::new("ESDUser").with_arg(Arg::address("ESDToken"));
        let err = step
            .resolve_args(&DeployedRegistry::new(), Address::with_last_byte(1))
            .unwrap_err();

        assert!(matches!(err, DeployError::MissingAddress { ref dependency, .. } if dependency == "ESDToken"));
    }

    #[test]
    fn test_load_from_directory_rebases_artifacts() {
        let temp_dir = TempDir::new("mortar-test").expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join(PLAN_FILENAME), ESD_PLAN).unwrap();

        let plan = DeploymentPlan::load_from_file(temp_dir.path()).unwrap();
        assert_eq!(plan.artifacts, temp_dir.path().join("build/contracts"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("mortar-test").expect("Failed to create temp dir");
        let result = DeploymentPlan::load_from_file(&temp_dir.path().join("missing.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_plan_is_rejected() {
        let temp_dir = TempDir::new("mortar-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("plan.toml");
        std::fs::write(
            &path,
            "[[steps]]\nname = \"A\"\n\n[[steps]]\nname = \"A\"\n",
        )
        .unwrap();

        let err = DeploymentPlan::load_from_file(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DeployError>(),
            Some(&DeployError::DuplicateStep("A".to_string()))
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("mortar-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("plan.toml");

        let plan = DeploymentPlan::new("/abs/artifacts")
            .step(DeploymentStep::new("ESDToken"))
            .step(
                DeploymentStep::new("ESDUser")
                    .with_arg(Arg::address("ESDToken"))
                    .with_arg(Arg::Deployer),
            )
            .wire(WiringAction::new("ESDToken", "setUser").with_arg(Arg::address("ESDUser")));

        plan.save_to_file(&path).unwrap();
        let loaded = DeploymentPlan::load_from_file(&path).unwrap();
        assert_eq!(plan, loaded);
    }

    #[test]
    fn test_esd_demo_plan_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/esd");
        let plan = DeploymentPlan::load_from_file(&dir).unwrap();

        let labels: Vec<_> = plan.wiring.iter().map(WiringAction::label).collect();
        assert_eq!(labels, vec!["ESDUser.setContext", "ESDInfo.setContext"]);

        let testnet = plan.for_network(Some("testnet")).unwrap();
        let enabled: Vec<_> = testnet.enabled_steps().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["ESDUser", "ESDInfo", "SignReward", "ESDContext"]);
    }
}
