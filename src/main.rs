//! netproxy - Entry Point
//!
//! Loads proxy settings and prints the route chosen for each URL given on
//! the command line.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netproxy::proxy::RouteKey;
use netproxy::{NetworkProxy, NetworkProxySettings};

/// Show which proxy each URL is routed through
#[derive(Debug, Parser)]
#[command(name = "netproxy", version)]
struct Cli {
    /// JSON settings file (defaults to $NETWORK_PROXY_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URLs to route
    #[arg(required = true)]
    urls: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = match &cli.config {
        Some(path) => NetworkProxySettings::from_json_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => NetworkProxySettings::from_env().context("failed to load settings")?,
    };

    let Some(proxy) = NetworkProxy::from_settings(&settings)? else {
        info!("Proxy configuration disabled, every connection is DIRECT");
        for url in &cli.urls {
            println!("{} -> DIRECT", url);
        }
        return Ok(());
    };

    for url in &cli.urls {
        let key = match RouteKey::from_uri(url) {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                continue;
            }
        };

        let route = proxy.router().resolve(&key.scheme, &key.host)?;
        let rule = route
            .rule
            .map(|i| format!("rule #{}", i))
            .unwrap_or_else(|| "no rule".to_string());
        let auth = match (route.target.is_direct(), proxy.credentials()) {
            (false, Some(store)) => store
                .lookup(&route.target.host, route.target.port)
                .map(|c| format!(" (auth: {})", c))
                .unwrap_or_default(),
            _ => String::new(),
        };

        println!("{} -> {} [{}]{}", url, route.target, rule, auth);
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "netproxy=warn".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
