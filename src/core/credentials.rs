//! Connection identity resolution
//!
//! The project URL and access key are looked up, in order, from:
//! 1. explicit arguments given when the connection is created
//! 2. the secret store (a dotenv-format file, never loaded into the process environment)
//! 3. the process environment
//!
//! A value missing from all three sources is a fatal configuration error.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;

use reqwest::Url;
use tracing::debug;

use crate::core::error::{ConnectorError, Result};
use crate::shared::constants::{SUPABASE_KEY_VAR, SUPABASE_URL_VAR};

/// Key/value secrets read from a dotenv-format file
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    entries: HashMap<String, String>,
}

impl SecretStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read a secret store from `path`. A missing file yields an empty store.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                debug!("No secret store at {}", path.display());
                return Ok(Self::empty());
            }
            Err(e) => {
                return Err(ConnectorError::Configuration(format!(
                    "Failed to read secret store '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut entries = HashMap::new();
        for item in iter {
            let (name, value) = item.map_err(|e| {
                ConnectorError::Configuration(format!(
                    "Malformed secret store '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            entries.insert(name, value);
        }

        debug!(
            "Loaded {} secret(s) from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for SecretStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Reads a variable from the real process environment
pub fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Validated project URL and access key
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    url: String,
    key: String,
}

impl Credentials {
    /// Resolve credentials from the three sources, explicit first
    pub fn resolve<F>(
        url: Option<&str>,
        key: Option<&str>,
        secrets: &SecretStore,
        env_lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = pick(url, secrets, &env_lookup, SUPABASE_URL_VAR)
            .ok_or_else(|| ConnectorError::missing_credential("URL", "url", SUPABASE_URL_VAR))?;
        let key = pick(key, secrets, &env_lookup, SUPABASE_KEY_VAR)
            .ok_or_else(|| ConnectorError::missing_credential("Key", "key", SUPABASE_KEY_VAR))?;

        Self::new(url, key)
    }

    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed = Url::parse(url.trim()).map_err(|e| {
            ConnectorError::Configuration(format!("Invalid Supabase URL '{}': {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConnectorError::Configuration(format!(
                "Invalid Supabase URL '{}': expected an http(s) URL with a host",
                url
            )));
        }

        Ok(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            key: key.into(),
        })
    }

    /// Project URL without a trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Host part of the project URL, used to scope cache keys per project
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn pick<F>(explicit: Option<&str>, secrets: &SecretStore, env_lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit.filter(|v| !v.trim().is_empty()) {
        debug!("{} taken from explicit argument", name);
        return Some(value.to_string());
    }
    if let Some(value) = secrets.get(name).filter(|v| !v.trim().is_empty()) {
        debug!("{} taken from secret store", name);
        return Some(value.to_string());
    }
    let value = env_lookup(name).filter(|v| !v.trim().is_empty());
    if value.is_some() {
        debug!("{} taken from environment", name);
    }
    value
}
