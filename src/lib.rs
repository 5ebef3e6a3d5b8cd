//! netproxy - Multi-proxy routing
//!
//! Decides which upstream proxy, if any, an outgoing connection must use and
//! which credentials to present to it.
//!
//! ## Features
//!
//! - Ordered proxy rules per protocol, with host allow-lists or deny-lists
//! - Host matchers: host/domain suffixes, `*` wildcards, `/regex/`
//! - Route decisions cached per (scheme, host), safe under concurrent lookups
//! - Proxy credentials keyed by proxy `host:port`
//! - Fallback to `HTTP_PROXY` / `HTTPS_PROXY` / `FTP_PROXY` / `NO_PROXY`

pub mod config;
pub mod error;
pub mod proxy;

pub use config::{NetworkProxySettings, ProxyServerConfig, ProxyType};
pub use error::{ConfigErrorKind, NetProxyError, Result};
pub use proxy::{
    CredentialStore, EnvProxySettings, HostnameMatcher, NetworkProxy, ProxyRouter, ProxySelector,
    ProxyTarget,
};
