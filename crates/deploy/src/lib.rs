//! mortar-deploy - Declarative, idempotent smart-contract deployments.
//!
//! A [`DeploymentPlan`] lists the contracts to deploy, the constructor arguments
//! of each one and the wiring calls that connect them. The [`Orchestrator`]
//! executes it step by step against a [`ChainClient`], resolving the addresses
//! produced by earlier steps and recording every mined transaction in a
//! per-network [`DeploymentRecord`] so that re-running a plan only sends what
//! changed.

mod error;
pub use error::DeployError;

mod registry;
pub use registry::DeployedRegistry;

mod plan;
pub use plan::{
    Arg, DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DeploymentPlan,
    DeploymentStep, NetworkConfig, PLAN_FILENAME, WiringAction,
};

mod artifact;
pub use artifact::{ArtifactStore, ContractArtifact};

mod record;
pub use record::{
    DeploymentRecord, LOCK_FILENAME, RECORD_FILENAME, RecordLock, StepFingerprint, StepRecord,
    WiringFingerprint, WiringRecord,
};

mod client;
pub use client::{CallReceipt, ChainClient, Deployment};

pub mod rpc;
pub use rpc::RpcClient;

mod reporter;
pub use reporter::{
    DeploymentReporter, StepReport, TracingReporter, outcome_table, record_table,
};

mod orchestrator;
pub use orchestrator::{
    DeploymentOutcome, Orchestrator, StepOutcome, StepStatus, WiringOutcome, WiringStatus,
};
