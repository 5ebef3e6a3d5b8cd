//! Proxy wiring
//!
//! Builds the router and credential store from settings. Nothing is
//! installed globally: the caller hands the resulting [`NetworkProxy`] to
//! whatever opens connections.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use super::credentials::CredentialStore;
use super::env::EnvProxySettings;
use super::router::{ProxyRouter, ProxySelector};
use super::rules::compile_rules;
use crate::config::{NetworkProxySettings, ProxyServerConfig, DEFAULT_PROTOCOLS};
use crate::error::Result;

/// Router and credentials for the networking layer
#[derive(Clone)]
pub struct NetworkProxy {
    router: Arc<ProxyRouter>,
    credentials: Option<Arc<CredentialStore>>,
}

impl NetworkProxy {
    /// Build proxy configuration from settings
    ///
    /// Returns `None` when proxy configuration is disabled. Explicit servers
    /// take precedence; without them, `<protocol>_proxy` environment variables
    /// are used for each of `http`, `https` and `ftp`.
    pub fn from_settings(settings: &NetworkProxySettings) -> Result<Option<Self>> {
        Self::build(settings, EnvProxySettings::read)
    }

    fn build<F>(settings: &NetworkProxySettings, read_env: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<EnvProxySettings>,
    {
        if !settings.enabled {
            info!("Network proxy configuration is disabled");
            return Ok(None);
        }

        let mut credentials = CredentialStore::new();
        let rules = if !settings.servers.is_empty() {
            info!("Configuring proxies from settings");
            for server in &settings.servers {
                if let (Some(key), Some(user), Some(pass)) =
                    (server.host_port(), &server.username, &server.password)
                {
                    credentials.add(key, user.as_str(), pass.as_str());
                }
            }
            compile_rules(&settings.servers)?
        } else {
            let mut rules = Vec::new();
            for protocol in DEFAULT_PROTOCOLS {
                let Some(env) = read_env(protocol) else {
                    info!("No proxy configuration found for {}", protocol);
                    continue;
                };
                info!(
                    "Configuring proxy for {} from env '{}': {:?}",
                    protocol,
                    env.env_name(),
                    env
                );

                // environment values are best-effort: a bad one is skipped
                let mut compiled = match compile_rules(&[server_from_env(&env)]) {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        error!(
                            "Ignoring proxy configuration for {} from env '{}': {}",
                            protocol,
                            env.env_name(),
                            e
                        );
                        continue;
                    }
                };

                if let (Some(user), Some(pass)) = (&env.username, &env.password) {
                    credentials.add(
                        format!("{}:{}", env.host, env.port),
                        user.as_str(),
                        pass.as_str(),
                    );
                }
                rules.append(&mut compiled);
            }
            rules
        };

        let router = ProxyRouter::new(rules).with_reporting(
            settings.always_print,
            settings.print_exclusions.iter().cloned(),
        );

        info!(
            rules = router.rules().len(),
            credentials = credentials.len(),
            "Network proxy configured"
        );

        Ok(Some(Self {
            router: Arc::new(router),
            credentials: (!credentials.is_empty()).then(|| Arc::new(credentials)),
        }))
    }

    pub fn router(&self) -> &Arc<ProxyRouter> {
        &self.router
    }

    /// Router as a trait object for the networking layer
    pub fn selector(&self) -> Arc<dyn ProxySelector> {
        self.router.clone()
    }

    /// Credentials, only when at least one proxy needs authentication
    pub fn credentials(&self) -> Option<&Arc<CredentialStore>> {
        self.credentials.as_ref()
    }
}

impl fmt::Debug for NetworkProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkProxy")
            .field("router", &self.router)
            .field("credentials", &self.credentials.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// Rule serving a single protocol, bypassed for the no-proxy hosts
fn server_from_env(env: &EnvProxySettings) -> ProxyServerConfig {
    let mut server = ProxyServerConfig::new(env.host.clone(), env.port);
    server.proxy_type = env.proxy_type();
    server.for_protocols = vec![env.for_protocol.clone()];
    if env.no_proxy_hosts.is_empty() {
        server.for_hosts = vec!["*".to_string()];
    } else {
        server.not_for_hosts = env.no_proxy_hosts.clone();
    }
    server
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{EnvGuard, ENV_LOCK};
    use crate::error::{ConfigErrorKind, NetProxyError};
    use crate::proxy::rules::{ProxyKind, ProxyTarget};
    use secrecy::ExposeSecret;

    fn no_env(_: &str) -> Option<EnvProxySettings> {
        None
    }

    fn settings(servers: Vec<ProxyServerConfig>) -> NetworkProxySettings {
        NetworkProxySettings {
            servers,
            ..NetworkProxySettings::default()
        }
    }

    #[test]
    fn test_disabled() {
        let settings = NetworkProxySettings {
            enabled: false,
            ..NetworkProxySettings::default()
        };
        assert!(NetworkProxy::build(&settings, no_env).unwrap().is_none());
    }

    #[test]
    fn test_explicit_servers_with_credentials() {
        let mut authenticated = ProxyServerConfig::new("proxyhost", 3128);
        authenticated.username = Some("login".to_string());
        authenticated.password = Some("password".to_string());
        authenticated.not_for_hosts = vec!["intranet.fr".to_string()];

        let mut user_only = ProxyServerConfig::new("other", 8080);
        user_only.username = Some("login".to_string());
        user_only.for_hosts = vec!["*".to_string()];

        let proxy = NetworkProxy::build(&settings(vec![authenticated, user_only]), no_env)
            .unwrap()
            .unwrap();

        assert_eq!(proxy.router().rules().len(), 2);
        assert_eq!(
            *proxy.selector().select("http", "www.example.com").unwrap(),
            ProxyTarget::http("proxyhost", 3128)
        );
        assert_eq!(proxy.selector().select("http", "www.intranet.fr").unwrap().host, "other");

        let credentials = proxy.credentials().unwrap();
        assert_eq!(credentials.len(), 1);
        let credential = credentials.lookup("proxyhost", 3128).unwrap();
        assert_eq!(credential.username(), "login");
        assert_eq!(credential.password().expose_secret(), "password");
        assert!(credentials.lookup("other", 8080).is_none());
    }

    #[test]
    fn test_explicit_servers_ignore_env() {
        let mut server = ProxyServerConfig::new("proxyhost", 3128);
        server.for_hosts = vec!["*".to_string()];

        let proxy = NetworkProxy::build(&settings(vec![server]), |_| {
            panic!("environment must not be read when servers are configured")
        })
        .unwrap()
        .unwrap();

        assert!(proxy.credentials().is_none());
    }

    #[test]
    fn test_invalid_server_fails() {
        let server = ProxyServerConfig::new("proxyhost", 3128);
        let err = NetworkProxy::build(&settings(vec![server]), no_env).unwrap_err();
        assert!(matches!(
            err,
            NetProxyError::InvalidConfig {
                kind: ConfigErrorKind::NoMatcher,
                ..
            }
        ));
    }

    #[test]
    fn test_from_env_settings() {
        let read_env = |protocol: &str| match protocol {
            "http" => EnvProxySettings::parse(
                "http",
                Some("http://user:pw@proxy:8080"),
                Some("localhost, *.intranet.fr"),
            ),
            "https" => EnvProxySettings::parse("https", Some("socks5://socks:1080"), None),
            _ => None,
        };

        let proxy = NetworkProxy::build(&NetworkProxySettings::default(), read_env)
            .unwrap()
            .unwrap();
        let router = proxy.router();

        assert_eq!(*router.route("http", "example.com").unwrap(), ProxyTarget::http("proxy", 8080));
        assert!(router.route("http", "localhost").unwrap().is_direct());
        assert!(router.route("http", "app.intranet.fr").unwrap().is_direct());

        let https = router.route("https", "localhost").unwrap();
        assert_eq!(https.kind, ProxyKind::Socks);
        assert_eq!(https.host, "socks");

        assert!(router.route("ftp", "example.com").unwrap().is_direct());

        let credentials = proxy.credentials().unwrap();
        assert_eq!(credentials.lookup("proxy", 8080).unwrap().username(), "user");
        assert!(credentials.lookup("socks", 1080).is_none());
    }

    #[test]
    fn test_bad_env_values_are_skipped() {
        let read_env = |protocol: &str| match protocol {
            "http" => {
                EnvProxySettings::parse("http", Some("http://proxy:8080"), Some("localhost,/(/"))
            }
            "https" => Some(EnvProxySettings {
                for_protocol: "https".to_string(),
                scheme: "http".to_string(),
                host: "zero".to_string(),
                port: 0,
                no_proxy_hosts: Vec::new(),
                username: Some("user".to_string()),
                password: Some("pw".to_string()),
            }),
            "ftp" => EnvProxySettings::parse("ftp", Some("http://ftp-proxy:2121"), None),
            _ => None,
        };

        let proxy = NetworkProxy::build(&NetworkProxySettings::default(), read_env)
            .unwrap()
            .unwrap();
        let router = proxy.router();

        assert_eq!(router.rules().len(), 1);
        assert!(router.route("http", "example.com").unwrap().is_direct());
        assert!(router.route("https", "example.com").unwrap().is_direct());
        assert_eq!(router.route("ftp", "example.com").unwrap().host, "ftp-proxy");
        assert!(proxy.credentials().is_none());
    }

    #[test]
    fn test_zero_port_from_process_env_is_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(&[
            "http_proxy",
            "HTTP_PROXY",
            "https_proxy",
            "HTTPS_PROXY",
            "ftp_proxy",
            "FTP_PROXY",
            "no_proxy",
            "NO_PROXY",
        ]);

        std::env::set_var("http_proxy", "http://proxy:0");

        let proxy = NetworkProxy::from_settings(&NetworkProxySettings::default())
            .unwrap()
            .unwrap();
        assert!(proxy.router().rules().is_empty());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut server = ProxyServerConfig::new("proxyhost", 3128);
        server.username = Some("login".to_string());
        server.password = Some("hunter2".to_string());
        server.for_hosts = vec!["*".to_string()];

        let proxy = NetworkProxy::build(&settings(vec![server]), no_env)
            .unwrap()
            .unwrap();
        let debug = format!("{:?}", proxy);
        assert!(debug.contains("NetworkProxy"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_nothing_configured() {
        let proxy = NetworkProxy::build(&NetworkProxySettings::default(), no_env)
            .unwrap()
            .unwrap();

        assert!(proxy.router().rules().is_empty());
        assert!(proxy.credentials().is_none());
        assert!(proxy.router().route("https", "example.com").unwrap().is_direct());
    }

    #[test]
    fn test_from_settings_reads_process_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(&[
            "http_proxy",
            "HTTP_PROXY",
            "https_proxy",
            "HTTPS_PROXY",
            "ftp_proxy",
            "FTP_PROXY",
            "no_proxy",
            "NO_PROXY",
        ]);

        std::env::set_var("HTTPS_PROXY", "http://secure:3128");
        std::env::set_var("no_proxy", "localhost");

        let proxy = NetworkProxy::from_settings(&NetworkProxySettings::default())
            .unwrap()
            .unwrap();

        assert_eq!(proxy.router().rules().len(), 1);
        assert_eq!(proxy.router().route("https", "example.com").unwrap().host, "secure");
        assert!(proxy.router().route("https", "localhost").unwrap().is_direct());
        assert!(proxy.router().route("http", "example.com").unwrap().is_direct());
    }
}
