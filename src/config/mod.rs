//! Configuration Management Module
//!
//! Every component receives its configuration as an explicit value through
//! its constructor; there is no package-level mutable state. The remote API
//! and credential settings come from CLI flags, the migration settings
//! (destination chain parameters and the token map) from a TOML file:
//!
//! ```toml
//! verify-whitelist = true
//!
//! [chain]
//! chain-id = "manifest-1"
//! address-prefix = "manifest"
//! node-address = "http://localhost:26657"
//! keyring-backend = "test"
//! chain-home = "/home/worker/.manifest"
//! bank-address = "bank"
//! binary = "manifestd"
//! gas-price = 0.011
//! gas-adjustment = 1.3
//! gas-denom = "umfx"
//! wait-tx-timeout-secs = 120
//!
//! [token-map.MFX]
//! denom = "umfx"
//! precision = 6
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::tokens::TokenMap;

/// Connection settings for the remote work-item API.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Root URL of the API server.
    pub url: String,
    /// Source-network partition identifier scoping the API paths.
    pub neighborhood: u64,
}

impl RemoteConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("url is required");
        }
        Url::parse(&self.url).with_context(|| format!("could not parse URL {:?}", self.url))?;
        Ok(())
    }

    /// The parsed root URL. Call [`validate`](Self::validate) first.
    pub fn parsed_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.url).with_context(|| format!("could not parse URL {:?}", self.url))
    }
}

/// Credentials for the remote work-item API.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.username.is_empty() {
            anyhow::bail!("username is required");
        }
        if self.password.is_empty() {
            anyhow::bail!("password is required");
        }
        Ok(())
    }
}

/// Destination chain parameters for the CLI chain client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// Destination chain ID.
    pub chain_id: String,
    /// Bech32 address prefix of the destination chain.
    pub address_prefix: String,
    /// RPC address of the destination node.
    pub node_address: String,
    /// Keyring backend used by the chain binary.
    pub keyring_backend: String,
    /// Root directory of the destination chain configuration.
    pub chain_home: String,
    /// Name of the bank account key that funds migrations.
    pub bank_address: String,
    /// Name of the destination chain binary.
    pub binary: String,
    /// Minimum gas price for transactions.
    pub gas_price: f64,
    /// Gas adjustment factor for transactions.
    pub gas_adjustment: f64,
    /// Gas denomination for transactions.
    pub gas_denom: String,
    /// Optional fee granter address.
    #[serde(default)]
    pub fee_granter: Option<String>,
    /// Seconds to wait for the transfer to be included in a block.
    #[serde(default = "default_wait_tx_timeout")]
    pub wait_tx_timeout_secs: u64,
}

fn default_wait_tx_timeout() -> u64 {
    120
}

impl ChainConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain_id.is_empty() {
            anyhow::bail!("chain ID is required");
        }
        if self.address_prefix.is_empty() {
            anyhow::bail!("address prefix is required");
        }
        if self.node_address.is_empty() {
            anyhow::bail!("node address is required");
        }
        if self.keyring_backend.is_empty() {
            anyhow::bail!("keyring backend is required");
        }
        if self.chain_home.is_empty() {
            anyhow::bail!("chain home is required");
        }
        if self.bank_address.is_empty() {
            anyhow::bail!("bank address is required");
        }
        if self.binary.is_empty() {
            anyhow::bail!("binary is required");
        }
        if self.gas_price < 0.0 {
            anyhow::bail!("gas price must be >= 0");
        }
        if self.gas_adjustment < 0.0 {
            anyhow::bail!("gas adjustment must be >= 0");
        }
        if self.gas_denom.is_empty() {
            anyhow::bail!("gas denom is required");
        }
        if self.wait_tx_timeout_secs == 0 {
            anyhow::bail!("wait for tx timeout > 0 is required");
        }
        Ok(())
    }
}

/// Migration settings loaded from the TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationConfig {
    /// Whether the source address must be on the migrations whitelist.
    #[serde(default = "default_verify_whitelist")]
    pub verify_whitelist: bool,
    /// Destination chain parameters.
    pub chain: ChainConfig,
    /// Map of source token symbol to destination token info.
    pub token_map: TokenMap,
}

fn default_verify_whitelist() -> bool {
    true
}

impl MigrationConfig {
    /// Loads and validates the migration configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "configuration file {:?} not found or not readable",
                path.display()
            )
        })?;
        let config: MigrationConfig =
            toml::from_str(&content).context("failed to parse migration configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.chain.validate()?;
        if self.token_map.is_empty() {
            anyhow::bail!("token map must contain at least one entry");
        }
        for (symbol, token) in &self.token_map {
            if token.denom.is_empty() {
                anyhow::bail!("token map entry {symbol:?} has an empty denom");
            }
            if token.precision < 1 {
                anyhow::bail!("token map entry {symbol:?} has an invalid precision");
            }
        }
        Ok(())
    }
}
