//! Hostname matchers
//!
//! A matcher is compiled from one configuration string:
//!
//! - `/regex/` is a regular expression that must match the whole hostname
//! - a string containing `*` is a wildcard pattern (`*` matches anything)
//! - anything else is a host or domain name, matched by suffix on a `.` boundary

use std::fmt;

use regex::Regex;

use crate::error::{NetProxyError, Result};

const REGEX_DELIMITER: char = '/';
const WILDCARD: char = '*';

/// A compiled hostname predicate
#[derive(Debug, Clone)]
pub enum HostnameMatcher {
    /// Exact host, or domain suffix on a label boundary
    Suffix(String),
    /// Full-match regular expression, with the pattern it was built from
    Pattern { source: String, regex: Regex },
}

impl HostnameMatcher {
    /// Compile a matcher from its configuration string
    pub fn compile(pattern: &str) -> Result<Self> {
        if let Some(inner) = strip_regex_delimiters(pattern) {
            // the body must parse on its own, or a stray `)` escapes the anchors
            let regex = Regex::new(inner)
                .and_then(|_| anchored(inner))
                .map_err(|source| NetProxyError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            return Ok(HostnameMatcher::Pattern {
                source: pattern.to_string(),
                regex,
            });
        }

        if !pattern.contains(WILDCARD) {
            return Ok(HostnameMatcher::Suffix(pattern.to_string()));
        }

        let expr = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = anchored(&expr).map_err(|source| NetProxyError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(HostnameMatcher::Pattern {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether the hostname is matched
    pub fn matches(&self, hostname: &str) -> bool {
        match self {
            HostnameMatcher::Suffix(suffix) => suffix_matches(suffix, hostname),
            HostnameMatcher::Pattern { regex, .. } => regex.is_match(hostname),
        }
    }

    /// The configuration string this matcher was compiled from
    pub fn as_str(&self) -> &str {
        match self {
            HostnameMatcher::Suffix(suffix) => suffix,
            HostnameMatcher::Pattern { source, .. } => source,
        }
    }

    #[cfg(test)]
    fn is_suffix(&self) -> bool {
        matches!(self, HostnameMatcher::Suffix(_))
    }
}

impl fmt::Display for HostnameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn strip_regex_delimiters(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix(REGEX_DELIMITER)
        .and_then(|rest| rest.strip_suffix(REGEX_DELIMITER))
        .filter(|inner| !inner.is_empty())
}

fn anchored(expr: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", expr))
}

fn suffix_matches(suffix: &str, hostname: &str) -> bool {
    if !hostname.ends_with(suffix) {
        return false;
    }
    if suffix.starts_with('.') || hostname.len() == suffix.len() {
        return true;
    }
    // "example.com" also covers "www.example.com", not "myexample.com"
    hostname.as_bytes()[hostname.len() - suffix.len() - 1] == b'.'
}
