//! [`ChainClient`] over Ethereum JSON-RPC.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node signs them with
//! one of its unlocked accounts and estimates gas itself. Receipts are polled
//! until the transaction is mined.

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    CallReceipt, ChainClient, DeployError, Deployment, NetworkConfig,
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between receipt polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of retries when the node cannot be reached.
const MAX_CONNECT_RETRIES: usize = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Requests that never reached the node are retried with exponential backoff.
/// Timeouts are not retried: the node may already have accepted a transaction.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });

    let response = (|| async { client.post(url).json(&body).send().await })
        .retry(ExponentialBuilder::default().with_max_times(MAX_CONNECT_RETRIES))
        .when(|e: &reqwest::Error| e.is_connect())
        .notify(|e: &reqwest::Error, delay: Duration| {
            tracing::warn!(error = %e, method, ?delay, "RPC endpoint unreachable, retrying...");
        })
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error from {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value.
///
/// # Arguments
/// * `name` - What is being waited for (for error messages)
/// * `timeout` - Maximum time to wait
/// * `interval` - Delay between attempts
/// * `check_fn` - Returns `Ok(Some(_))` when done, `Ok(None)` to keep waiting
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::trace!(error = %e, target = %name, "Poll failed, retrying...");
            }
        }

        if start.elapsed() > timeout {
            anyhow::bail!("Timeout waiting for {}", name);
        }

        tokio::time::sleep(interval).await;
    }
}

/// Parse a hex quantity such as `0x539`.
pub fn parse_quantity(value: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity '{}'", value))
}

/// The fields of a transaction receipt the orchestrator cares about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: String,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

impl Receipt {
    fn succeeded(&self) -> bool {
        // Pre-Byzantium receipts carry no status.
        self.status.as_deref().is_none_or(|s| s != "0x0")
    }

    fn block_number(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|n| parse_quantity(n).ok())
    }
}

/// JSON-RPC implementation of [`ChainClient`].
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    from: Address,
    chain_id: u64,
    confirmation_timeout: Duration,
}

impl RpcClient {
    /// Connect to the network described by `config`.
    ///
    /// Reads the chain id (checking it against `config.chain_id` when set) and
    /// picks the node's first account when no sender is configured.
    pub async fn connect(config: &NetworkConfig) -> Result<Self, anyhow::Error> {
        let http = create_client()?;
        let url = config.rpc_url.clone();

        let chain_id: String = json_rpc_call(&http, url.as_str(), "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach node at {}", url))?;
        let chain_id = parse_quantity(&chain_id)?;

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                return Err(DeployError::ChainIdMismatch {
                    expected,
                    actual: chain_id,
                }
                .into());
            }
        }

        let from = match config.from {
            Some(from) => from,
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&http, url.as_str(), "eth_accounts", vec![]).await?;
                accounts.first().copied().context(
                    "Node exposes no unlocked accounts; set `from` in the network configuration",
                )?
            }
        };

        tracing::info!(rpc_url = %url, chain_id, from = %from, "Connected to node");

        Ok(Self {
            http,
            url,
            from,
            chain_id,
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
        })
    }

    async fn send_transaction(
        &self,
        label: &str,
        to: Option<Address>,
        data: Bytes,
    ) -> Result<Receipt, anyhow::Error> {
        let mut tx = serde_json::json!({
            "from": self.from,
            "data": data,
        });
        if let Some(to) = to {
            tx["to"] = serde_json::json!(to);
        }

        let tx_hash: String =
            json_rpc_call(&self.http, self.url.as_str(), "eth_sendTransaction", vec![tx])
                .await
                .with_context(|| format!("Failed to send transaction for '{}'", label))?;

        tracing::debug!(label, tx_hash = %tx_hash, "Transaction sent, waiting for receipt...");

        let receipt = self.wait_for_receipt(label, &tx_hash).await?;
        if !receipt.succeeded() {
            return Err(DeployError::Reverted {
                label: label.to_string(),
                tx_hash: receipt.transaction_hash,
            }
            .into());
        }

        Ok(receipt)
    }

    async fn wait_for_receipt(&self, label: &str, tx_hash: &str) -> Result<Receipt, anyhow::Error> {
        let what = format!("receipt of {} ({})", tx_hash, label);

        poll_until(&what, self.confirmation_timeout, POLL_INTERVAL, || async {
            json_rpc_call::<Option<Receipt>>(
                &self.http,
                self.url.as_str(),
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await
        })
        .await
    }
}

impl ChainClient for RpcClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.from
    }

    async fn deploy(&self, label: &str, init_code: Bytes) -> anyhow::Result<Deployment> {
        let receipt = self.send_transaction(label, None, init_code).await?;
        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of {} for '{}' has no contract address",
                receipt.transaction_hash, label
            )
        })?;

        Ok(Deployment {
            address,
            block_number: receipt.block_number(),
            tx_hash: receipt.transaction_hash,
        })
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        json_rpc_call(
            &self.http,
            self.url.as_str(),
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
        .with_context(|| format!("Failed to read code at {}", address))
    }

    async fn call(&self, label: &str, to: Address, calldata: Bytes) -> anyhow::Result<CallReceipt> {
        let receipt = self.send_transaction(label, Some(to), calldata).await?;

        Ok(CallReceipt {
            block_number: receipt.block_number(),
            tx_hash: receipt.transaction_hash,
        })
    }
}
