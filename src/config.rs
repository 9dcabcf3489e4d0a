//! Configuration module for the bond auction client
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and builds the injected settlement target and
//! timeouts used by the submission controller.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::abi::CallSignature;
use crate::controller::ControllerConfig;
use crate::encoder::MAX_DECIMALS;
use crate::settlement::SettlementTarget;
use crate::tracker::TrackerConfig;
use crate::wallet::WalletAddress;

const ENV_PREFIX: &str = "CIPHER_BOND_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settlement contract and RPC endpoint
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Submission and confirmation bounds
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Bond listing source
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Auction contract receiving the bids
    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// Solidity signature of the bid call
    #[serde(default = "default_call_signature")]
    pub call_signature: String,

    /// Fixed-point precision of the encoded amount
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_acceptance_timeout")]
    pub acceptance_timeout_secs: u64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Blocks required, counting the inclusion block
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Account used as the sender of bid transactions
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// TOML file with `[[bonds]]` tables, built-in listing when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

// Default value functions
fn default_rpc_url() -> String { "http://127.0.0.1:8545".to_string() }
fn default_contract_address() -> String { "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6".to_string() }
fn default_call_signature() -> String { "placeEncryptedBid(uint256,uint256)".to_string() }
fn default_decimals() -> u32 { 18 }
fn default_request_timeout() -> u64 { 30 }
fn default_acceptance_timeout() -> u64 { 120 }
fn default_confirmation_timeout() -> u64 { 600 }
fn default_poll_interval() -> u64 { 2_000 }
fn default_required_confirmations() -> u64 { 1 }
fn default_true() -> bool { true }

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract_address(),
            call_signature: default_call_signature(),
            decimals: default_decimals(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            acceptance_timeout_secs: default_acceptance_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
            required_confirmations: default_required_confirmations(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            enable_metrics: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    ///
    /// `.env` is read first; `CIPHER_BOND_*` variables win over the file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num<T: std::str::FromStr>(key: &str, value: String) -> anyhow::Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{}{} is not a number: {}", ENV_PREFIX, key, value))
        }

        if let Some(v) = var("RPC_URL") {
            self.settlement.rpc_url = v;
        }
        if let Some(v) = var("CONTRACT_ADDRESS") {
            self.settlement.contract_address = v;
        }
        if let Some(v) = var("CALL_SIGNATURE") {
            self.settlement.call_signature = v;
        }
        if let Some(v) = var("DECIMALS") {
            self.settlement.decimals = num("DECIMALS", v)?;
        }
        if let Some(v) = var("ACCEPTANCE_TIMEOUT_SECS") {
            self.submission.acceptance_timeout_secs = num("ACCEPTANCE_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = var("CONFIRMATION_TIMEOUT_SECS") {
            self.submission.confirmation_timeout_secs = num("CONFIRMATION_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = var("WALLET_ADDRESS") {
            self.wallet.address = Some(v);
        }
        if let Some(v) = var("CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.settlement.rpc_url.trim().is_empty() {
            bail!("settlement.rpc_url must not be empty");
        }
        if self.settlement.decimals > MAX_DECIMALS {
            bail!(
                "settlement.decimals must be at most {}, got {}",
                MAX_DECIMALS,
                self.settlement.decimals
            );
        }
        if self.submission.acceptance_timeout_secs == 0
            || self.submission.confirmation_timeout_secs == 0
        {
            bail!("submission timeouts must be greater than zero");
        }
        if self.submission.poll_interval_ms == 0 {
            bail!("submission.poll_interval_ms must be greater than zero");
        }
        if self.submission.required_confirmations == 0 {
            bail!("submission.required_confirmations must be at least 1");
        }

        let target = self.settlement_target()?;
        if target.call.arity() != 2 {
            bail!(
                "settlement.call_signature must take (bondId, encodedAmount), got {}",
                target.call.canonical()
            );
        }
        // Encoded amounts are u128, a narrower parameter cannot carry them
        if target.call.param_bits(1).is_some_and(|bits| bits < 128) {
            bail!(
                "settlement.call_signature amount parameter must be at least uint128, got {}",
                target.call.canonical()
            );
        }
        if let Some(address) = &self.wallet.address {
            WalletAddress::parse(address).context("Invalid wallet.address")?;
        }
        Ok(())
    }

    /// Contract, call and precision for the settlement client
    pub fn settlement_target(&self) -> anyhow::Result<SettlementTarget> {
        let contract = WalletAddress::parse(&self.settlement.contract_address)
            .context("Invalid settlement.contract_address")?;
        let call = CallSignature::parse(&self.settlement.call_signature)
            .context("Invalid settlement.call_signature")?;
        Ok(SettlementTarget {
            contract,
            call,
            decimals: self.settlement.decimals,
        })
    }

    pub fn wallet_address(&self) -> anyhow::Result<Option<WalletAddress>> {
        self.wallet
            .address
            .as_deref()
            .map(WalletAddress::parse)
            .transpose()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement.request_timeout_secs)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(self.submission.poll_interval_ms),
            confirmation_timeout: Duration::from_secs(self.submission.confirmation_timeout_secs),
            required_confirmations: self.submission.required_confirmations,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            acceptance_timeout: Duration::from_secs(self.submission.acceptance_timeout_secs),
            tracker: self.tracker_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        let controller = config.controller_config();
        assert_eq!(controller.acceptance_timeout, Duration::from_secs(120));
        assert_eq!(controller.tracker.confirmation_timeout, Duration::from_secs(600));
        assert_eq!(controller.tracker.poll_interval, Duration::from_secs(2));
        assert_eq!(controller.tracker.required_confirmations, 1);

        let target = config.settlement_target().unwrap();
        assert_eq!(target.call.canonical(), "placeEncryptedBid(uint256,uint256)");
        assert_eq!(target.decimals, 18);
        assert_eq!(
            target.contract.as_str(),
            "0x742d35cc6634c0532925a3b8d4c9db96c4b4d8b6"
        );
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[settlement]
rpc_url = "https://rpc.example.org"
decimals = 6

[submission]
required_confirmations = 3

[wallet]
address = "0x00000000000000000000000000000000000000aa"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.settlement.rpc_url, "https://rpc.example.org");
        assert_eq!(config.settlement.decimals, 6);
        assert_eq!(config.submission.required_confirmations, 3);
        assert_eq!(config.submission.acceptance_timeout_secs, 120);
        assert!(config.wallet_address().unwrap().is_some());
        assert!(config.monitoring.enable_metrics);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.settlement.decimals = 40;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.settlement.call_signature = "placeEncryptedBid(uint256)".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.settlement.call_signature = "placeEncryptedBid(uint256,uint32)".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least uint128"));

        let mut config = Config::default();
        config.settlement.call_signature = "placeEncryptedBid(uint64,uint128)".into();
        config.validate().unwrap();

        let mut config = Config::default();
        config.submission.required_confirmations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wallet.address = Some("not-an-address".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RPC_URL", "http://node:8545"),
            ("DECIMALS", "8"),
            ("CONFIRMATION_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.settlement.rpc_url, "http://node:8545");
        assert_eq!(config.settlement.decimals, 8);
        assert_eq!(config.submission.confirmation_timeout_secs, 30);

        let bad: HashMap<&str, &str> = [("DECIMALS", "eighteen")].into_iter().collect();
        assert!(config
            .apply_env(|key| bad.get(key).map(|v| v.to_string()))
            .is_err());
    }
}
