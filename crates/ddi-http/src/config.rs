//! DDI HTTP configuration types and utilities.
use crate::DEFAULT_PORT;
use ddi_wallet::config::{read_config_file, ConfigError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HTTPConfig {
    /// Host address for server.
    pub host: IpAddr,
    /// Port for server.
    pub port: u16,
}

impl std::fmt::Display for HTTPConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:?}", self)
    }
}

impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl HTTPConfig {
    /// Provides formatted string of server config address.
    pub fn to_address(&self) -> String {
        self.to_socket_address().to_string()
    }

    /// Provides `SocketAddr` of server config address.
    pub fn to_socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parses the `[http]` table; an absent table gives the defaults.
pub fn parse_toml(toml_str: &str) -> Result<HTTPConfig, ConfigError> {
    Ok(toml::from_str::<Config>(toml_str)?.http)
}

/// Gets `ddi-http` configuration from the `DDI_CONFIG` file, or the defaults.
pub fn http_config() -> Result<HTTPConfig, ConfigError> {
    match read_config_file()? {
        Some(toml_str) => parse_toml(&toml_str),
        None => Ok(HTTPConfig::default()),
    }
}

/// Wrapper struct for parsing the `http` config table.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct Config {
    /// HTTP configuration data.
    #[serde(default)]
    http: HTTPConfig,
}
