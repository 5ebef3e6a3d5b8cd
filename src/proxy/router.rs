//! Proxy routing
//!
//! [`ProxyRouter`] picks at most one proxy for a (scheme, host) pair: the
//! target of the first rule, in configured order, that applies to it, or
//! DIRECT when none does. Decisions are memoized per (scheme, host) for the
//! lifetime of the router.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::rules::{compile_rules, ProxyRule, ProxyTarget};
use crate::config::ProxyServerConfig;
use crate::error::{NetProxyError, Result};

/// Cache key for route decisions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub scheme: String,
    pub host: String,
}

impl RouteKey {
    pub fn new(scheme: &str, host: &str) -> Result<Self> {
        if scheme.is_empty() || host.is_empty() {
            return Err(NetProxyError::InvalidRequest(format!(
                "scheme = '{}' host = '{}'",
                scheme, host
            )));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
        })
    }

    /// Build a key from a URI
    ///
    /// The host is taken as written in the authority, without `userinfo@`
    /// and `:port`, so internationalized names and letter case reach the
    /// matchers unchanged. The parsed URL host is used only when the raw
    /// authority yields none.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).ok();
        let scheme = match &parsed {
            Some(url) => url.scheme().to_string(),
            None => uri
                .split_once("://")
                .map(|(scheme, _)| scheme.to_string())
                .unwrap_or_default(),
        };
        let host = host_from_authority(uri).or_else(|| {
            parsed
                .as_ref()
                .and_then(Url::host_str)
                .map(strip_brackets)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
        });

        Self::new(&scheme, host.as_deref().unwrap_or_default())
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{protocol='{}', host='{}'}}", self.scheme, self.host)
    }
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn host_from_authority(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let mut auth = &rest[..end];

    if let Some(i) = auth.rfind('@') {
        auth = &auth[i + 1..];
    }
    if !auth.ends_with(']') {
        if let Some(i) = auth.rfind(':') {
            auth = &auth[..i];
        }
    }

    let host = strip_brackets(auth);
    (!host.is_empty()).then(|| host.to_string())
}

/// A route decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: Arc<ProxyTarget>,
    /// Index of the matching rule, `None` for DIRECT
    pub rule: Option<usize>,
}

/// Proxy selection used by the networking layer
pub trait ProxySelector: Send + Sync {
    /// Select the proxy for a request
    fn select(&self, scheme: &str, host: &str) -> Result<Arc<ProxyTarget>>;

    /// Select the proxy for a request URI
    fn select_uri(&self, uri: &str) -> Result<Arc<ProxyTarget>> {
        let key = RouteKey::from_uri(uri)?;
        self.select(&key.scheme, &key.host)
    }

    /// Report that connecting through the selected proxy failed
    fn connect_failed(&self, uri: &str, error: &dyn StdError);
}

/// Rule-based proxy router with a concurrent decision cache
pub struct ProxyRouter {
    rules: Vec<ProxyRule>,
    cache: DashMap<RouteKey, Route>,
    direct: Arc<ProxyTarget>,
    always_print: bool,
    print_exclusions: HashSet<String>,
}

impl ProxyRouter {
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self {
            rules,
            cache: DashMap::new(),
            direct: Arc::new(ProxyTarget::direct()),
            always_print: false,
            print_exclusions: HashSet::new(),
        }
    }

    /// Compile proxy server records and build a router from them
    pub fn from_servers(servers: &[ProxyServerConfig]) -> Result<Self> {
        Ok(Self::new(compile_rules(servers)?))
    }

    /// Report every resolution at info level, except for the excluded hosts
    pub fn with_reporting<I>(mut self, always_print: bool, exclusions: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.always_print = always_print;
        self.print_exclusions = exclusions.into_iter().collect();
        self
    }

    /// Select the proxy target for a request
    pub fn route(&self, scheme: &str, host: &str) -> Result<Arc<ProxyTarget>> {
        Ok(self.resolve(scheme, host)?.target)
    }

    /// Select the proxy target for a request, with the matching rule
    pub fn resolve(&self, scheme: &str, host: &str) -> Result<Route> {
        let key = RouteKey::new(scheme, host)?;

        let cached = self.cache.get(&key).map(|entry| entry.value().clone());
        let route = match cached {
            Some(route) => route,
            None => {
                let computed = self.evaluate(&key);
                debug!(
                    rule = ?computed.rule,
                    "Proxies for [{}] : {}",
                    key,
                    computed.target
                );
                // a racing caller may have stored the same decision first
                self.cache
                    .entry(key.clone())
                    .or_insert(computed)
                    .value()
                    .clone()
            }
        };

        if self.always_print && !self.print_exclusions.contains(&key.host) {
            info!(rule = ?route.rule, "Proxies for [{}] : {}", key, route.target);
        }

        Ok(route)
    }

    fn evaluate(&self, key: &RouteKey) -> Route {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(&key.scheme, &key.host))
            .map(|(index, rule)| Route {
                target: Arc::clone(rule.target()),
                rule: Some(index),
            })
            .unwrap_or_else(|| Route {
                target: Arc::clone(&self.direct),
                rule: None,
            })
    }

    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }

    /// Number of memoized decisions
    pub fn cached_routes(&self) -> usize {
        self.cache.len()
    }
}

impl ProxySelector for ProxyRouter {
    fn select(&self, scheme: &str, host: &str) -> Result<Arc<ProxyTarget>> {
        self.route(scheme, host)
    }

    fn connect_failed(&self, uri: &str, error: &dyn StdError) {
        warn!("Connect failed: {}: {}", uri, error);
    }
}

impl fmt::Debug for ProxyRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<String> = self.rules.iter().map(|r| r.to_string()).collect();
        f.debug_struct("ProxyRouter")
            .field("rules", &rules)
            .field("cached_routes", &self.cache.len())
            .field("always_print", &self.always_print)
            .finish()
    }
}
