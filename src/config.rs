//! Configuration management for the submitter
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::BlockId;
use crate::tx::{parse_address, parse_chain_id, parse_felt};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use starknet_types_core::felt::Felt;
use std::env;
use std::path::Path;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    pub call: Option<CallConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Chain id as a short string (`SN_SEPOLIA`) or hex
    pub chain_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub address: String,
    /// Cairo version of the account contract
    pub cairo_version: u8,
    pub public_key: String,
    /// Environment variable holding the private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Fee cap in wei; an integer, or a decimal or `0x` hex string above i64
    #[serde(deserialize_with = "deserialize_fee")]
    pub default_max_fee: u128,
    pub settle_delay_ms: u64,
    pub status_timeout_ms: u64,
    pub status_poll_attempts: u32,
    pub status_poll_interval_ms: u64,
    pub block: BlockId,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            default_max_fee: 100_000_000_000_000,
            settle_delay_ms: 3_000,
            status_timeout_ms: 10_000,
            status_poll_attempts: 1,
            status_poll_interval_ms: 2_000,
            block: BlockId::Latest,
        }
    }
}

/// Call submitted when none is given on the command line
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    pub contract_address: String,
    pub entry_point: String,
    #[serde(default)]
    pub calldata: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// TOML integers stop at i64, so larger fee caps are written as strings
fn deserialize_fee<'de, D>(deserializer: D) -> std::result::Result<u128, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FeeValue {
        Int(u64),
        Text(String),
    }

    match FeeValue::deserialize(deserializer)? {
        FeeValue::Int(value) => Ok(u128::from(value)),
        FeeValue::Text(text) => {
            let text = text.trim();
            let parsed = match text.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16),
                None => text.parse::<u128>(),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("invalid fee '{}': {}", text, e)))
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.chain.rpc_url)
            .with_context(|| format!("Invalid RPC URL '{}'", self.chain.rpc_url))?;

        if parse_chain_id(&self.chain.chain_id).is_none() {
            anyhow::bail!("Invalid chain id '{}'", self.chain.chain_id);
        }

        parse_address(&self.account.address)?;

        if !matches!(self.account.cairo_version, 0 | 1) {
            tracing::warn!(
                "Account Cairo version {} is not supported - submissions will fail",
                self.account.cairo_version
            );
        }

        if self.submission.status_poll_attempts == 0 {
            anyhow::bail!("submission.status_poll_attempts must be at least 1");
        }

        if let Some(call) = &self.call {
            parse_address(&call.contract_address)?;
            for value in &call.calldata {
                parse_felt(value)?;
            }
        }

        Ok(())
    }

    pub fn chain_id(&self) -> Result<Felt> {
        parse_chain_id(&self.chain.chain_id)
            .with_context(|| format!("Invalid chain id '{}'", self.chain.chain_id))
    }

    pub fn account_address(&self) -> Result<Felt> {
        Ok(parse_address(&self.account.address)?)
    }

    pub fn public_key(&self) -> Result<Felt> {
        Felt::from_hex(&self.account.public_key)
            .map_err(|e| anyhow::anyhow!("Invalid public key: {}", e))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
