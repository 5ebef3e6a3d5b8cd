//! Proxy rules
//!
//! Raw [`ProxyServerConfig`] records are validated and compiled once, at
//! startup, into an ordered list of [`ProxyRule`]s.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::matcher::HostnameMatcher;
use crate::config::{ProxyServerConfig, ProxyType};
use crate::error::{ConfigErrorKind, NetProxyError, Result};

/// How a connection reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Http,
    Socks,
    Direct,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks => "socks",
            ProxyKind::Direct => "direct",
        }
    }
}

impl From<ProxyType> for ProxyKind {
    fn from(value: ProxyType) -> Self {
        match value {
            ProxyType::Http => ProxyKind::Http,
            ProxyType::Socks => ProxyKind::Socks,
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A routing outcome: a proxy endpoint, or DIRECT
///
/// Host strings are kept as configured; nothing is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyTarget {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
}

impl ProxyTarget {
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: ProxyKind::Http,
            host: host.into(),
            port,
        }
    }

    pub fn socks(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: ProxyKind::Socks,
            host: host.into(),
            port,
        }
    }

    /// Connect without a proxy
    pub fn direct() -> Self {
        Self {
            kind: ProxyKind::Direct,
            host: String::new(),
            port: 0,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ProxyKind::Direct
    }

    /// `host:port` of the proxy, `None` for DIRECT
    pub fn address(&self) -> Option<String> {
        if self.is_direct() {
            return None;
        }
        if self.host.contains(':') && !(self.host.starts_with('[') && self.host.ends_with(']')) {
            Some(format!("[{}]:{}", self.host, self.port))
        } else {
            Some(format!("{}:{}", self.host, self.port))
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(addr) => write!(f, "{}://{}", self.kind, addr),
            None => write!(f, "DIRECT"),
        }
    }
}

/// A compiled proxy rule
///
/// Exactly one of the positive and negative matcher lists is non-empty.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    protocols: HashSet<String>,
    positive: Vec<HostnameMatcher>,
    negative: Vec<HostnameMatcher>,
    target: Arc<ProxyTarget>,
}

impl ProxyRule {
    /// Check whether this rule applies to a request
    pub fn matches(&self, scheme: &str, host: &str) -> bool {
        if !self.protocols.contains(scheme) {
            return false;
        }
        if self.positive.is_empty() {
            !self.negative.iter().any(|m| m.matches(host))
        } else {
            self.positive.iter().any(|m| m.matches(host))
        }
    }

    pub fn target(&self) -> &Arc<ProxyTarget> {
        &self.target
    }

    pub fn protocols(&self) -> &HashSet<String> {
        &self.protocols
    }

    pub fn positive_matchers(&self) -> &[HostnameMatcher] {
        &self.positive
    }

    pub fn negative_matchers(&self) -> &[HostnameMatcher] {
        &self.negative
    }
}

impl fmt::Display for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, matchers) = if self.positive.is_empty() {
            ("not for", &self.negative)
        } else {
            ("for", &self.positive)
        };
        let hosts: Vec<&str> = matchers.iter().map(|m| m.as_str()).collect();
        let mut protocols: Vec<&str> = self.protocols.iter().map(String::as_str).collect();
        protocols.sort_unstable();
        write!(
            f,
            "{} [{}] {} [{}]",
            self.target,
            protocols.join(","),
            label,
            hosts.join(",")
        )
    }
}

/// Validate and compile proxy server records, preserving their order
pub fn compile_rules(servers: &[ProxyServerConfig]) -> Result<Vec<ProxyRule>> {
    servers
        .iter()
        .enumerate()
        .map(|(index, server)| compile_rule(index, server))
        .collect()
}

fn compile_rule(index: usize, server: &ProxyServerConfig) -> Result<ProxyRule> {
    let prefix = format!("servers[{}]", index);

    let host = match server.host.as_deref() {
        Some(host) if !host.is_empty() => host,
        _ => {
            return Err(NetProxyError::config(
                format!("{}.host", prefix),
                ConfigErrorKind::NotEmpty,
                "host can't be null or empty",
            ))
        }
    };

    let port = match server.port {
        Some(port) if port != 0 => port,
        _ => {
            return Err(NetProxyError::config(
                format!("{}.port", prefix),
                ConfigErrorKind::NotNull,
                "port can't be null or zero",
            ))
        }
    };

    match (server.for_hosts.is_empty(), server.not_for_hosts.is_empty()) {
        (true, true) => {
            return Err(NetProxyError::config(
                prefix,
                ConfigErrorKind::NoMatcher,
                "you must specify either 'forHosts' or 'notForHosts' matchers",
            ))
        }
        (false, false) => {
            return Err(NetProxyError::config(
                prefix,
                ConfigErrorKind::TooManyMatchers,
                "you can't specify both 'forHosts' and 'notForHosts' matchers",
            ))
        }
        _ => {}
    }

    let positive = compile_matchers(&prefix, "forHosts", &server.for_hosts)?;
    let negative = compile_matchers(&prefix, "notForHosts", &server.not_for_hosts)?;

    let target = ProxyTarget {
        kind: server.proxy_type.into(),
        host: host.to_string(),
        port,
    };

    debug!(
        index,
        target = %target,
        positive = positive.len(),
        negative = negative.len(),
        "Compiled proxy rule"
    );

    Ok(ProxyRule {
        protocols: server.for_protocols.iter().cloned().collect(),
        positive,
        negative,
        target: Arc::new(target),
    })
}

fn compile_matchers(prefix: &str, field: &str, patterns: &[String]) -> Result<Vec<HostnameMatcher>> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            let field = format!("{}.{}[{}]", prefix, field, i);
            if pattern.is_empty() {
                return Err(NetProxyError::config(
                    field,
                    ConfigErrorKind::NotEmpty,
                    "can't be empty",
                ));
            }
            HostnameMatcher::compile(pattern).map_err(|e| {
                NetProxyError::config(field, ConfigErrorKind::InvalidPattern, e.to_string())
            })
        })
        .collect()
}
