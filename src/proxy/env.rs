//! Proxy settings from the environment
//!
//! Reads the conventional `<protocol>_proxy` and `no_proxy` variables. Bad
//! values never fail startup: they are logged and ignored.

use std::env;
use std::fmt;

use tracing::error;
use url::Url;

use crate::config::{split_list, ProxyType};

/// Proxy settings parsed from `<protocol>_proxy` / `no_proxy`
#[derive(Clone, PartialEq, Eq)]
pub struct EnvProxySettings {
    /// Scheme of the requests this proxy serves (`http`, `https`, `ftp`)
    pub for_protocol: String,
    /// Proxy protocol (`http`, `socks`, `socks5`, ...)
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Host matchers exempted from proxying
    pub no_proxy_hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EnvProxySettings {
    /// Read settings for a protocol from the process environment
    pub fn read(protocol: &str) -> Option<Self> {
        let proxy_url = get_env_ignore_case(&format!("{}_proxy", protocol));
        let no_proxy = get_env_ignore_case("no_proxy");
        Self::parse(protocol, proxy_url.as_deref(), no_proxy.as_deref())
    }

    /// Parse a proxy URL and an optional comma-separated no-proxy list
    ///
    /// Returns `None` when no URL is given, or when it is malformed or lacks a
    /// host or an explicit non-zero port.
    pub fn parse(for_protocol: &str, proxy_url: Option<&str>, no_proxy: Option<&str>) -> Option<Self> {
        let raw = proxy_url?.trim();
        if raw.is_empty() {
            return None;
        }

        // scheme is optional and defaults to http
        let normalized = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw.trim_start_matches("//"))
        };

        let url = match Url::parse(&normalized) {
            Ok(url) => url,
            Err(e) => {
                error!(
                    "Could not decode proxy configuration for {}: {} - {}",
                    for_protocol,
                    redact(raw),
                    e
                );
                return None;
            }
        };

        let authority = raw_authority(&normalized);
        let (userinfo, host_port) = match authority.rfind('@') {
            Some(i) => (Some(&authority[..i]), &authority[i + 1..]),
            None => (None, authority),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(host),
            _ => {
                error!(
                    "Invalid proxy configuration URL for {}: {} - host not specified",
                    for_protocol,
                    redact(raw)
                );
                return None;
            }
        };

        // the url crate hides a port equal to the scheme default
        let port = match url.port() {
            Some(port) => Some(port),
            None if has_explicit_port(host_port) => url.port_or_known_default(),
            None => None,
        };
        let Some(port) = port.filter(|&p| p != 0) else {
            error!(
                "Invalid proxy configuration URL for {}: {} - port not specified",
                for_protocol,
                redact(raw)
            );
            return None;
        };

        let (username, password) = match userinfo {
            Some(info) => {
                let (user, pass) = info.split_once(':').unwrap_or((info, ""));
                (Some(decode(user)), Some(decode(pass)))
            }
            None => (None, None),
        };

        Some(Self {
            for_protocol: for_protocol.to_string(),
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
            no_proxy_hosts: no_proxy.map(split_list).unwrap_or_default(),
            username,
            password,
        })
    }

    /// Proxy server type implied by the proxy scheme
    pub fn proxy_type(&self) -> ProxyType {
        if self.scheme.starts_with("socks") {
            ProxyType::Socks
        } else {
            ProxyType::Http
        }
    }

    /// Name of the environment variable these settings come from
    pub fn env_name(&self) -> String {
        format!("{}_proxy", self.for_protocol)
    }

    /// Environment value with the password hidden
    pub fn env_value(&self) -> String {
        let userinfo = match &self.username {
            Some(user) => format!("{}:***@", user),
            None => String::new(),
        };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}{}:{}", self.scheme, userinfo, host, self.port)
    }
}

impl fmt::Debug for EnvProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProxySettings")
            .field("for_protocol", &self.for_protocol)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("no_proxy_hosts", &self.no_proxy_hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Look up a variable by its lower-case name, then its upper-case name
pub fn get_env_ignore_case(name: &str) -> Option<String> {
    env::var(name.to_lowercase())
        .or_else(|_| env::var(name.to_uppercase()))
        .ok()
}

/// Offset of the authority in `scheme://authority`, `//authority` or a bare
/// `authority`
fn authority_start(url: &str) -> usize {
    match url.find("://") {
        Some(i) => i + 3,
        None if url.starts_with("//") => 2,
        None => 0,
    }
}

/// Authority component of `scheme://authority/...`
fn raw_authority(url: &str) -> &str {
    let rest = &url[authority_start(url)..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

fn has_explicit_port(host_port: &str) -> bool {
    let port = if host_port.starts_with('[') {
        host_port
            .find(']')
            .and_then(|i| host_port[i + 1..].strip_prefix(':'))
    } else {
        host_port.rsplit_once(':').map(|(_, port)| port)
    };
    matches!(port, Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Replace the password of a raw proxy URL for logging
fn redact(raw: &str) -> String {
    let start = authority_start(raw);
    let authority = raw_authority(raw);
    let Some(at) = authority.rfind('@') else {
        return raw.to_string();
    };
    let Some(colon) = authority[..at].find(':') else {
        return raw.to_string();
    };
    format!("{}***{}", &raw[..start + colon + 1], &raw[start + at..])
}
