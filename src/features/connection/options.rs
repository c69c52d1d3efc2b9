use std::sync::Arc;

use tracing::info;

use crate::core::config::ConnectorConfig;
use crate::core::credentials::{process_env, Credentials, SecretStore};
use crate::core::error::{ConnectorError, Result};
use crate::features::connection::supabase_connection::SupabaseConnection;
use crate::modules::client::SupabaseClient;
use crate::modules::transport::Transport;
use crate::shared::cache::CallCache;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Everything needed to open a [`SupabaseConnection`].
///
/// Unset values fall back to the secret store, then the environment.
pub struct ConnectOptions {
    url: Option<String>,
    key: Option<String>,
    secrets: Option<SecretStore>,
    config: Option<ConnectorConfig>,
    cache: Option<Arc<CallCache>>,
    transport: Option<Arc<dyn Transport>>,
    env_lookup: EnvLookup,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            secrets: None,
            config: None,
            cache: None,
            transport: None,
            env_lookup: Box::new(process_env),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Use this secret store instead of reading `config.secrets_path`
    pub fn secrets(mut self, secrets: SecretStore) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a cache between connections; entries are scoped by project host
    pub fn cache(mut self, cache: Arc<CallCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the process environment as the last credential source
    pub fn env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Box::new(lookup);
        self
    }

    pub fn connect(self) -> Result<SupabaseConnection> {
        let env_lookup = self.env_lookup;

        let config = match self.config {
            Some(config) => config,
            None => ConnectorConfig::from_lookup(|name| env_lookup(name))
                .map_err(ConnectorError::Configuration)?,
        };

        let secrets = match self.secrets {
            Some(secrets) => secrets,
            None => SecretStore::from_path(&config.secrets_path)?,
        };

        let credentials = Credentials::resolve(
            self.url.as_deref(),
            self.key.as_deref(),
            &secrets,
            |name| env_lookup(name),
        )?;

        let client = match self.transport {
            Some(transport) => SupabaseClient::with_transport(transport, &config),
            None => SupabaseClient::new(&credentials, &config)?,
        };

        info!(
            "Connected to Supabase project {} (schema: {})",
            credentials.host(),
            config.schema
        );

        Ok(SupabaseConnection::new(
            client,
            credentials,
            self.cache.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_explicit_arguments_win() {
        let connection = ConnectOptions::new()
            .url("https://explicit.supabase.co")
            .key("explicit-key")
            .config(ConnectorConfig::default())
            .secrets(SecretStore::from_iter([
                ("SUPABASE_URL", "https://secret.supabase.co"),
                ("SUPABASE_KEY", "secret-key"),
            ]))
            .env_lookup(|_| Some("https://env.supabase.co".to_string()))
            .connect()
            .unwrap();
        assert_eq!(connection.credentials().url(), "https://explicit.supabase.co");
        assert_eq!(connection.credentials().key(), "explicit-key");
    }

    #[test]
    fn test_secret_store_file_is_read_from_config_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SUPABASE_URL=https://from-file.supabase.co").unwrap();
        writeln!(file, "SUPABASE_KEY=file-key").unwrap();

        let config = ConnectorConfig {
            secrets_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let connection = ConnectOptions::new()
            .config(config)
            .env_lookup(|_| None)
            .connect()
            .unwrap();
        assert_eq!(connection.credentials().host(), "from-file.supabase.co");
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = ConnectOptions::new()
            .url("https://abc.supabase.co")
            .secrets(SecretStore::empty())
            .env_lookup(|_| None)
            .connect()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("SUPABASE_KEY"));
    }

    #[test]
    fn test_invalid_config_from_environment() {
        let err = ConnectOptions::new()
            .url("https://abc.supabase.co")
            .key("k")
            .env_lookup(|name| (name == "SUPABASE_DEFAULT_TTL").then(|| "soon".to_string()))
            .connect()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
