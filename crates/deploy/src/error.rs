//! Typed errors raised while validating and executing a deployment plan.
//!
//! Transport, I/O and parsing failures travel as [`anyhow::Error`] with context;
//! the variants below are the conditions callers are expected to match on.

use alloy_core::primitives::Address;
use thiserror::Error;

/// Errors detected by the plan validator, the registry and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// Two steps share the same name.
    #[error("duplicate step name '{0}' in deployment plan")]
    DuplicateStep(String),

    /// A step was declared without a name.
    #[error("deployment step #{0} has an empty name")]
    EmptyStepName(usize),

    /// An argument references a step that is not part of the plan.
    #[error("'{required_by}' references unknown step '{reference}'")]
    UnknownReference {
        required_by: String,
        reference: String,
    },

    /// An argument references the step itself or a step declared after it.
    #[error("step '{step}' references '{reference}', which is not deployed before it")]
    ForwardReference { step: String, reference: String },

    /// A deploy switch names a step that is not part of the plan.
    #[error("deploy switch names unknown step '{0}'")]
    UnknownSwitch(String),

    /// The requested network has no section in the plan.
    #[error("network '{0}' is not defined in the deployment plan")]
    UnknownNetwork(String),

    /// A resolver asked for an address that no step has produced (yet).
    #[error("address not yet available for '{dependency}' (required by '{required_by}')")]
    MissingAddress {
        dependency: String,
        required_by: String,
    },

    /// A registry entry was assigned twice.
    #[error("address for step '{0}' is already recorded")]
    AddressAlreadyRecorded(String),

    /// Two steps produced the same address.
    #[error("address {address} is already recorded for step '{existing}'")]
    DuplicateAddress { address: Address, existing: String },

    /// The client reported the zero address for a deployment.
    #[error("step '{0}' resolved to the zero address")]
    ZeroAddress(String),

    /// The constructor arity does not match the declared arguments.
    #[error("constructor of '{artifact}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        artifact: String,
        expected: usize,
        actual: usize,
    },

    /// No overload of the wiring method accepts the declared arguments.
    #[error("'{artifact}' has no method '{method}' taking {arity} argument(s)")]
    UnknownMethod {
        artifact: String,
        method: String,
        arity: usize,
    },

    /// The node is connected to a different chain than the plan expects.
    #[error("chain id mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    /// A transaction was mined but reverted.
    #[error("transaction {tx_hash} for '{label}' reverted")]
    Reverted { label: String, tx_hash: String },
}
