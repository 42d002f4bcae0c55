//! CLI configuration types and utilities.
use ddi_wallet::config::{read_config_file, ConfigError};
use serde::{Deserialize, Serialize};

const DEFAULT_PROMPT: &str = "> ";

/// Configuration variables for `ddi-cli` crate.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct CLIConfig {
    /// Prompt printed by the interactive shell.
    pub prompt: String,
}

impl Default for CLIConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Parses the `[cli]` table; an absent table gives the defaults.
pub fn parse_toml(toml_str: &str) -> Result<CLIConfig, ConfigError> {
    Ok(toml::from_str::<Config>(toml_str)?.cli)
}

/// Gets `ddi-cli` configuration from the `DDI_CONFIG` file, or the defaults.
pub fn cli_config() -> Result<CLIConfig, ConfigError> {
    match read_config_file()? {
        Some(toml_str) => parse_toml(&toml_str),
        None => Ok(CLIConfig::default()),
    }
}

/// Wrapper struct for parsing the `cli` table.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Config {
    /// CLI configuration data.
    #[serde(default)]
    cli: CLIConfig,
}
