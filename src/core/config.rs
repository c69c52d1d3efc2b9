use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::shared::cache::Ttl;

/// Tuning knobs for a connection. Credentials are resolved separately, see
/// [`crate::core::credentials`].
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// dotenv-format secret store consulted between explicit arguments and
    /// the process environment
    pub secrets_path: PathBuf,
    /// Postgres schema sent as `Accept-Profile` / `Content-Profile`
    pub schema: String,
    /// Request timeout applied by the HTTP client
    pub http_timeout: Duration,
    /// TTL used by the demo CLI when `--ttl` is omitted
    pub default_ttl: Ttl,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            secrets_path: PathBuf::from(Self::DEFAULT_SECRETS_PATH),
            schema: Self::DEFAULT_SCHEMA.to_string(),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
            default_ttl: Ttl::Forever,
        }
    }
}

impl ConnectorConfig {
    const DEFAULT_SECRETS_PATH: &'static str = ".secrets.env";
    const DEFAULT_SCHEMA: &'static str = "public";
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ConnectorConfig::from_env`] but reads variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets_path = lookup("SUPABASE_SECRETS_PATH")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_SECRETS_PATH.to_string());

        let schema = lookup("SUPABASE_SCHEMA")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_SCHEMA.to_string());

        let http_timeout_secs = lookup("SUPABASE_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| Self::DEFAULT_HTTP_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "SUPABASE_HTTP_TIMEOUT_SECS must be a valid number".to_string())?;

        let default_ttl = lookup("SUPABASE_DEFAULT_TTL")
            .unwrap_or_default()
            .parse::<Ttl>()
            .map_err(|e| format!("Invalid SUPABASE_DEFAULT_TTL: {}", e))?;

        Ok(Self {
            secrets_path: PathBuf::from(secrets_path),
            schema,
            http_timeout: Duration::from_secs(http_timeout_secs),
            default_ttl,
        })
    }
}
