//! Proxy credentials
//!
//! Credentials are registered per proxy endpoint (`host:port`) at startup and
//! looked up when a proxy asks for authentication.

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use tracing::trace;

/// Username and password for one proxy endpoint
pub struct Credential {
    username: String,
    password: SecretString,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// `Proxy-Authorization` header value for Basic authentication
    pub fn basic_auth(&self) -> SecretString {
        let credentials = format!("{}:{}", self.username, self.password.expose_secret());
        SecretString::from(format!("Basic {}", BASE64.encode(credentials.as_bytes())))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/***", self.username)
    }
}

/// Credentials keyed by proxy `host:port`
///
/// Filled once during startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials for a `host:port` key, replacing any previous entry
    pub fn add(
        &mut self,
        host_port: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.entries
            .insert(host_port.into(), Credential::new(username, password));
    }

    /// Find the credentials registered for a proxy endpoint
    pub fn lookup(&self, host: &str, port: u16) -> Option<&Credential> {
        let key = format!("{}:{}", host, port);
        let credential = self.entries.get(&key);
        match credential {
            Some(c) => trace!("Using proxy authentication for <{}>: {}", key, c),
            None => trace!("No proxy authentication for <{}>", key),
        }
        credential
    }

    /// Number of registered endpoints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_host_and_port() {
        let mut store = CredentialStore::new();
        store.add("proxy:3128", "u", "p");

        let credential = store.lookup("proxy", 3128).unwrap();
        assert_eq!(credential.username(), "u");
        assert_eq!(credential.password().expose_secret(), "p");

        assert!(store.lookup("proxy", 3129).is_none());
        assert!(store.lookup("other", 3128).is_none());
    }

    #[test]
    fn test_add_overwrites() {
        let mut store = CredentialStore::new();
        store.add("proxy:3128", "old", "old-secret");
        store.add("proxy:3128", "new", "new-secret");

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("proxy", 3128).unwrap().username(), "new");
    }

    #[test]
    fn test_empty_store() {
        let store = CredentialStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_empty_username_and_password_are_kept() {
        let mut store = CredentialStore::new();
        store.add("proxy:8080", "", "");

        let credential = store.lookup("proxy", 8080).unwrap();
        assert_eq!(credential.username(), "");
        assert_eq!(credential.password().expose_secret(), "");
    }

    #[test]
    fn test_secret_never_formatted() {
        let mut store = CredentialStore::new();
        store.add("proxy:3128", "login", "hunter2");

        let credential = store.lookup("proxy", 3128).unwrap();
        assert_eq!(credential.to_string(), "login/***");
        assert!(!format!("{:?}", credential).contains("hunter2"));
        assert!(!format!("{:?}", store).contains("hunter2"));
    }

    #[test]
    fn test_basic_auth_header() {
        let credential = Credential::new("user", "pass");
        let expected = format!("Basic {}", BASE64.encode(b"user:pass"));
        assert_eq!(credential.basic_auth().expose_secret(), expected);
    }
}
