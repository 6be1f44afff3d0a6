//! The blockchain collaborator the orchestrator drives.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Result;

/// A mined contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// A mined state-mutating transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Sends contract-creation and state-mutating transactions to a chain.
///
/// Both methods resolve only once the transaction is mined, and fail if it
/// reverted. Signing, gas estimation and transient retries are the
/// implementation's business.
pub trait ChainClient: Send + Sync {
    /// Chain id of the connected network.
    fn chain_id(&self) -> u64;

    /// Account the transactions are sent from.
    fn sender(&self) -> Address;

    /// Deploy `init_code` (creation bytecode plus encoded constructor arguments).
    fn deploy(
        &self,
        label: &str,
        init_code: Bytes,
    ) -> impl Future<Output = Result<Deployment>> + Send;

    /// Runtime bytecode at `address`; empty when no contract lives there.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// Send `calldata` to the contract at `to`.
    fn call(
        &self,
        label: &str,
        to: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<CallReceipt>> + Send;
}
