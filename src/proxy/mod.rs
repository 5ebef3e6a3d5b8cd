//! Proxy selection
//!
//! This module provides the proxy decision layer:
//! - Hostname matchers compiled from configuration strings
//! - Ordered proxy rules with first-match-wins routing
//! - Per-endpoint proxy credentials
//! - Proxy settings from `<protocol>_proxy` / `no_proxy` variables

pub mod credentials;
pub mod env;
pub mod matcher;
pub mod router;
pub mod rules;
pub mod setup;

pub use credentials::{Credential, CredentialStore};
pub use env::EnvProxySettings;
pub use matcher::HostnameMatcher;
pub use router::{ProxyRouter, ProxySelector, Route, RouteKey};
pub use rules::{compile_rules, ProxyKind, ProxyRule, ProxyTarget};
pub use setup::NetworkProxy;
