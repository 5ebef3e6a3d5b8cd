use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable holding the path of the JSON settings file
pub const CONFIG_PATH_ENV: &str = "NETWORK_PROXY_CONFIG";

/// Protocols a proxy server applies to when `forProtocols` is not set
pub const DEFAULT_PROTOCOLS: [&str; 3] = ["http", "https", "ftp"];

/// Network proxy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkProxySettings {
    /// Whether proxy configuration is enabled at all
    pub enabled: bool,
    /// Report every route resolution, not only the first one per destination
    #[serde(alias = "always-print")]
    pub always_print: bool,
    /// Hosts never reported when `always_print` is set
    #[serde(alias = "print-exclusions")]
    pub print_exclusions: Vec<String>,
    /// Explicit proxy servers, in priority order
    pub servers: Vec<ProxyServerConfig>,
}

impl Default for NetworkProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            always_print: false,
            print_exclusions: Vec::new(),
            servers: Vec::new(),
        }
    }
}

/// Proxy server type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProxyType {
    #[default]
    Http,
    Socks,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Socks => "socks",
        }
    }
}

impl FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "socks" => Ok(ProxyType::Socks),
            other => Err(format!("unknown proxy type '{}' (expected http or socks)", other)),
        }
    }
}

impl TryFrom<String> for ProxyType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProxyType> for String {
    fn from(value: ProxyType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured proxy server, as read from settings
///
/// `host` and `port` are optional here so that a missing value is reported by
/// the rule compiler with the index of the offending server.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServerConfig {
    #[serde(rename = "type", default)]
    pub proxy_type: ProxyType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, alias = "for-hosts")]
    pub for_hosts: Vec<String>,
    #[serde(default, alias = "not-for-hosts")]
    pub not_for_hosts: Vec<String>,
    #[serde(default = "default_protocols", alias = "for-protocols")]
    pub for_protocols: Vec<String>,
}

impl ProxyServerConfig {
    /// An HTTP proxy server for the default protocols, with no matchers yet
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            proxy_type: ProxyType::Http,
            host: Some(host.into()),
            port: Some(port),
            username: None,
            password: None,
            for_hosts: Vec::new(),
            not_for_hosts: Vec::new(),
            for_protocols: default_protocols(),
        }
    }

    /// `host:port` key used for credential lookup
    pub fn host_port(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
            _ => None,
        }
    }
}

impl fmt::Debug for ProxyServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyServerConfig")
            .field("type", &self.proxy_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("for_hosts", &self.for_hosts)
            .field("not_for_hosts", &self.not_for_hosts)
            .field("for_protocols", &self.for_protocols)
            .finish()
    }
}

fn default_protocols() -> Vec<String> {
    DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect()
}

impl NetworkProxySettings {
    /// Load settings from the environment
    ///
    /// Servers come from the JSON file named by `NETWORK_PROXY_CONFIG`, if
    /// any; `NETWORK_PROXY_ENABLED`, `NETWORK_PROXY_ALWAYS_PRINT` and
    /// `NETWORK_PROXY_PRINT_EXCLUSIONS` override the file.
    pub fn from_env() -> Result<Self> {
        let mut settings = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };

        if let Ok(enabled) = env::var("NETWORK_PROXY_ENABLED") {
            settings.enabled = enabled.trim().parse().unwrap_or(settings.enabled);
        }
        if let Ok(always_print) = env::var("NETWORK_PROXY_ALWAYS_PRINT") {
            settings.always_print = always_print.trim().parse().unwrap_or(settings.always_print);
        }
        if let Ok(exclusions) = env::var("NETWORK_PROXY_PRINT_EXCLUSIONS") {
            settings.print_exclusions = split_list(&exclusions);
        }

        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse settings from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
