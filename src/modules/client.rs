use std::sync::Arc;

use crate::core::config::ConnectorConfig;
use crate::core::credentials::Credentials;
use crate::core::error::Result;
use crate::modules::auth::AuthClient;
use crate::modules::postgrest::{PostgrestClient, QueryBuilder};
use crate::modules::storage::StorageClient;
use crate::modules::transport::{HttpTransport, Requester, Transport};

/// Handle to one Supabase project: database, storage and auth sub-clients
/// sharing a transport and the signed-in session
#[derive(Clone)]
pub struct SupabaseClient {
    postgrest: PostgrestClient,
    storage: StorageClient,
    auth: AuthClient,
}

impl SupabaseClient {
    /// Client talking HTTP to the project named by `credentials`
    pub fn new(credentials: &Credentials, config: &ConnectorConfig) -> Result<Self> {
        let transport = HttpTransport::new(credentials, config.http_timeout)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: &ConnectorConfig) -> Self {
        let requester = Requester::new(transport);
        Self {
            postgrest: PostgrestClient::new(requester.clone(), config.schema.as_str()),
            storage: StorageClient::new(requester.clone()),
            auth: AuthClient::new(requester),
        }
    }

    /// Start a query against `table`
    pub fn table(&self, table: &str) -> QueryBuilder {
        self.postgrest.from(table)
    }

    pub fn postgrest(&self) -> &PostgrestClient {
        &self.postgrest
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::transport::HttpResponse;
    use crate::shared::test_helpers::ScriptedTransport;
    use reqwest::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_table_uses_configured_schema() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK).with_json(&json!([{"id": 1}])))
        });
        let config = ConnectorConfig {
            schema: "reporting".to_string(),
            ..Default::default()
        };
        let client = SupabaseClient::with_transport(transport.clone(), &config);

        let builder = client.table("daily").select("*");
        client.postgrest().execute(&builder).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header_value("accept-profile"), Some("reporting"));
    }

    #[test]
    fn test_new_builds_http_client() {
        let credentials = Credentials::new("https://abc.supabase.co", "anon").unwrap();
        let client = SupabaseClient::new(&credentials, &ConnectorConfig::default()).unwrap();
        assert_eq!(
            client.storage().get_public_url("b", "x.txt"),
            "https://abc.supabase.co/storage/v1/object/public/b/x.txt"
        );
    }
}
