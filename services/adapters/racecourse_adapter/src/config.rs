//! Configuration management for the racecourse adapter
//!
//! Supports both TOML-based configuration and environment variable overrides,
//! the latter matching what the deployment injects (`SIGNER_URL`,
//! `CONTRACT_ADDRESS`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{self, env_vars};

/// Complete racecourse adapter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RacecourseConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,

    /// Basic auth user for the endpoint
    pub rpc_user: Option<String>,

    /// Basic auth password for the endpoint
    pub rpc_password: Option<String>,

    /// Existing contract to attach to; a new one is deployed when absent
    pub contract_address: Option<String>,

    /// Contract ABI (JSON)
    pub abi_path: PathBuf,

    /// Contract bytecode (hex text)
    pub bin_path: PathBuf,

    /// Gas limit for deployment and transactions
    pub gas_limit: u64,

    /// Gas price in wei
    pub gas_price: u64,

    /// Deadline for deployment/attachment in milliseconds
    pub sync_timeout_ms: u64,

    /// Send a no-op transaction after deployment so the node mines a block
    pub force_mining: bool,

    /// Delay before the forced-mining transaction in milliseconds
    pub force_mining_delay_ms: u64,

    /// Event filter polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for RacecourseConfig {
    fn default() -> Self {
        Self {
            rpc_url: constants::DEFAULT_RPC_URL.to_string(),
            rpc_user: None,
            rpc_password: None,
            contract_address: None,
            abi_path: PathBuf::from(constants::DEFAULT_ABI_PATH),
            bin_path: PathBuf::from(constants::DEFAULT_BIN_PATH),
            gas_limit: constants::DEFAULT_GAS_LIMIT,
            gas_price: constants::DEFAULT_GAS_PRICE,
            sync_timeout_ms: constants::DEFAULT_SYNC_TIMEOUT_MS,
            force_mining: true,
            force_mining_delay_ms: constants::DEFAULT_FORCE_MINING_DELAY_MS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl RacecourseConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub async fn from_file(file_path: &Path) -> Result<Self> {
        if file_path.exists() {
            let content = tokio::fs::read_to_string(file_path)
                .await
                .with_context(|| format!("Failed to read config file: {:?}", file_path))?;

            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {:?}", file_path))
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }

    /// Load configuration from file, then apply environment variable overrides
    pub async fn from_file_with_env_overrides(file_path: &Path) -> Result<Self> {
        let mut config = Self::from_file(file_path).await?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(url) = env::var(env_vars::RPC_URL) {
            self.rpc_url = url;
        }

        if let Ok(user) = env::var(env_vars::RPC_USER) {
            self.rpc_user = Some(user);
        }

        if let Ok(password) = env::var(env_vars::RPC_PASSWORD) {
            self.rpc_password = Some(password);
        }

        // An empty value means "deploy a new contract"
        if let Ok(address) = env::var(env_vars::CONTRACT_ADDRESS) {
            self.contract_address = if address.trim().is_empty() {
                None
            } else {
                Some(address)
            };
        }

        if let Ok(path) = env::var(env_vars::ABI_PATH) {
            self.abi_path = PathBuf::from(path);
        }

        if let Ok(path) = env::var(env_vars::BIN_PATH) {
            self.bin_path = PathBuf::from(path);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(anyhow::anyhow!("RPC URL cannot be empty"));
        }

        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(anyhow::anyhow!("RPC URL must start with http:// or https://"));
        }

        if let Some(address) = &self.contract_address {
            if !is_contract_address(address) {
                return Err(anyhow::anyhow!(
                    "Contract address must be a 42-character 0x-prefixed hex string: {}",
                    address
                ));
            }
        }

        if self.gas_limit == 0 {
            return Err(anyhow::anyhow!("Gas limit must be greater than 0"));
        }

        if self.sync_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Sync timeout must be greater than 0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Poll interval must be greater than 0"));
        }

        Ok(())
    }

    /// Get synchronization timeout
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Get forced-mining delay
    pub fn force_mining_delay(&self) -> Duration {
        Duration::from_millis(self.force_mining_delay_ms)
    }

    /// Get event polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `^0x[a-fA-F0-9]{40}$`
pub(crate) fn is_contract_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}
