//! DDI wallet configuration types and utilities.
use ddi_core::did::DidMethod;
use ddi_core::{DDI_CONFIG, DDI_DATA, DEFAULT_DATA_DIR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WALLET_ID: &str = "ddi-workshop-wallet";
pub const DEFAULT_LABEL: &str = "DDI Workshop Agent";
const DEFAULT_RESOLVER_ENDPOINT: &str = "https://dev.uniresolver.io/1.0/identifiers/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// An error loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Error parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConfig {
    /// Wallet identifier, used as the wallet file name.
    pub wallet_id: String,
    /// Agent label shown on the web page and in the CLI welcome line.
    pub label: String,
    /// Universal resolver endpoint for DID methods not resolved locally (`None` disables it).
    pub resolver_endpoint: Option<String>,
    /// Upper bound for each agent call, in seconds.
    pub request_timeout_secs: u64,
    /// DID method used by the interactive `createDid <alias>` command.
    pub alias_method: DidMethod,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            wallet_id: DEFAULT_WALLET_ID.to_string(),
            label: DEFAULT_LABEL.to_string(),
            resolver_endpoint: Some(DEFAULT_RESOLVER_ENDPOINT.to_string()),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            alias_method: DidMethod::Dht,
        }
    }
}

impl std::fmt::Display for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:?}", self)
    }
}

impl WalletConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Reads the config file named by `DDI_CONFIG`, or `None` when the variable is unset.
pub fn read_config_file() -> Result<Option<String>, ConfigError> {
    match std::env::var(DDI_CONFIG) {
        Ok(path) => fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ConfigError::Read(path, e)),
        Err(_) => Ok(None),
    }
}

/// Data directory from `DDI_DATA`, defaulting to `./.ddi`.
pub fn data_dir() -> PathBuf {
    std::env::var(DDI_DATA)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parses the `[wallet]` table; an absent table gives the defaults.
pub fn parse_toml(toml_str: &str) -> Result<WalletConfig, ConfigError> {
    Ok(toml::from_str::<Config>(toml_str)?.wallet)
}

/// Gets the wallet configuration from the `DDI_CONFIG` file, or the defaults.
pub fn wallet_config() -> Result<WalletConfig, ConfigError> {
    match read_config_file()? {
        Some(toml_str) => parse_toml(&toml_str),
        None => Ok(WalletConfig::default()),
    }
}

/// Wrapper struct for parsing the `wallet` config table.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct Config {
    /// Wallet configuration data.
    #[serde(default)]
    wallet: WalletConfig,
}
