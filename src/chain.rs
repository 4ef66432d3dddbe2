//! Destination Chain Client
//!
//! Seam to the Manifest chain. The [`ChainClient`] trait is the only thing
//! the migration orchestrator knows about; the production implementation
//! shells out to the chain's CLI binary for signing and broadcasting (the
//! keyring never enters this process) and polls the node's RPC endpoint
//! over HTTP until the transaction is included in a block.
//!
//! Whether a re-broadcast after a crash can double-spend depends on this
//! client's contract, not the orchestrator: the work-item UUID rides along
//! as the tx memo so implementations can deduplicate on it.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use ethereum_types::U256;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::ChainConfig;

/// Outcome of a confirmed transfer on the destination chain.
#[derive(Debug, Clone)]
pub struct TxResult {
    /// Destination transaction hash.
    pub tx_hash: String,
    /// Time of the block that included the transaction, millisecond
    /// precision.
    pub block_time: DateTime<Utc>,
}

/// Destination-chain transfer operations.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Transfers `amount` of `denom` from the configured bank account to
    /// `to`, tagging the transaction with `memo`, and waits for inclusion.
    async fn transfer(&self, to: &str, amount: U256, denom: &str, memo: &str)
        -> Result<TxResult>;
}

/// `tx bank send --output json` response.
#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    code: u32,
    txhash: String,
    #[serde(default)]
    raw_log: String,
}

/// Production client: signs and broadcasts through the chain CLI binary,
/// confirms through the node's RPC endpoint.
pub struct ManifestCliClient {
    config: ChainConfig,
    rpc: reqwest::Client,
}

impl ManifestCliClient {
    pub fn new(config: ChainConfig) -> Result<Self> {
        let rpc = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to create RPC client")?;
        Ok(Self { config, rpc })
    }

    fn rpc_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.node_address.trim_end_matches('/'),
            path
        )
    }

    /// Polls the node until the transaction is included in a block.
    /// Returns the inclusion height. Bounded by `wait_tx_timeout_secs`.
    async fn wait_for_tx(&self, hash: &str) -> Result<i64> {
        hex::decode(hash).with_context(|| format!("transaction hash {hash:?} is not hex"))?;

        let url = self.rpc_url(&format!("tx?hash=0x{hash}"));
        let deadline = Instant::now() + Duration::from_secs(self.config.wait_tx_timeout_secs);

        loop {
            if Instant::now() >= deadline {
                bail!(
                    "timed out after {}s waiting for transaction {} to be included",
                    self.config.wait_tx_timeout_secs,
                    hash
                );
            }

            match self.rpc.get(&url).send().await {
                Ok(response) => {
                    let body: serde_json::Value = response
                        .json()
                        .await
                        .context("failed to parse tx query response")?;

                    if let Some(result) = body.get("result") {
                        let code = result["tx_result"]["code"].as_u64().unwrap_or(0);
                        if code != 0 {
                            bail!(
                                "transaction {} failed on chain: {}",
                                hash,
                                result["tx_result"]["log"].as_str().unwrap_or("unknown")
                            );
                        }
                        let height = result["height"]
                            .as_str()
                            .and_then(|h| h.parse::<i64>().ok())
                            .context("tx query response has no height")?;
                        return Ok(height);
                    }
                    // No result yet: the node answers with an error object
                    // until the tx lands in a block.
                    tracing::debug!(hash, "transaction not yet included");
                }
                Err(err) => {
                    tracing::warn!(hash, error = %err, "tx query failed, retrying");
                }
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Fetches the header time of the block at `height`.
    async fn block_time(&self, height: i64) -> Result<DateTime<Utc>> {
        let url = self.rpc_url(&format!("block?height={height}"));
        let body: serde_json::Value = self
            .rpc
            .get(&url)
            .send()
            .await
            .context("failed to query block")?
            .json()
            .await
            .context("failed to parse block response")?;

        let time = body["result"]["block"]["header"]["time"]
            .as_str()
            .context("block response has no header time")?;
        let time = DateTime::parse_from_rfc3339(time)
            .context("failed to parse block header time")?
            .with_timezone(&Utc);

        // Millisecond precision survives JSON round trips on every side of
        // the work-item API; nanoseconds do not.
        Ok(time.trunc_subsecs(3))
    }
}

#[async_trait]
impl ChainClient for ManifestCliClient {
    async fn transfer(
        &self,
        to: &str,
        amount: U256,
        denom: &str,
        memo: &str,
    ) -> Result<TxResult> {
        if !to.starts_with(&self.config.address_prefix) {
            bail!(
                "destination address {} does not carry the {:?} prefix",
                to,
                self.config.address_prefix
            );
        }

        let amount_arg = format!("{amount}{denom}");
        let gas_prices = format!("{}{}", self.config.gas_price, self.config.gas_denom);

        let mut command = Command::new(&self.config.binary);
        command.args([
            "tx",
            "bank",
            "send",
            &self.config.bank_address,
            to,
            &amount_arg,
            "--chain-id",
            &self.config.chain_id,
            "--node",
            &self.config.node_address,
            "--keyring-backend",
            &self.config.keyring_backend,
            "--home",
            &self.config.chain_home,
            "--note",
            memo,
            "--gas",
            "auto",
            "--gas-adjustment",
            &self.config.gas_adjustment.to_string(),
            "--gas-prices",
            &gas_prices,
            "--output",
            "json",
            "--yes",
        ]);
        if let Some(fee_granter) = &self.config.fee_granter {
            command.args(["--fee-granter", fee_granter]);
        }

        tracing::info!(to, amount = %amount, denom, memo, "broadcasting bank send");

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.config.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            bail!(
                "{} tx bank send failed:\nstderr: {}\nstdout: {}",
                self.config.binary,
                stderr,
                stdout
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let broadcast: BroadcastResponse = serde_json::from_str(stdout.trim())
            .with_context(|| format!("failed to parse broadcast response: {}", stdout.trim()))?;

        if broadcast.code != 0 {
            bail!("transaction broadcast failed: {}", broadcast.raw_log);
        }

        tracing::info!(tx_hash = %broadcast.txhash, "transaction broadcasted");

        let height = self.wait_for_tx(&broadcast.txhash).await?;
        let block_time = self.block_time(height).await?;

        tracing::info!(tx_hash = %broadcast.txhash, height, "transaction included in block");

        Ok(TxResult {
            tx_hash: broadcast.txhash,
            block_time,
        })
    }
}
