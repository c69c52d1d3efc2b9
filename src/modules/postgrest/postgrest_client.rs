use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::error::{ConnectorError, Result};
use crate::modules::postgrest::query_builder::QueryBuilder;
use crate::modules::transport::{HttpResponse, Requester};

/// Rows returned by PostgREST plus the total requested through `count`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Value,
    pub count: Option<u64>,
}

/// Client for the project's `/rest/v1` endpoint
#[derive(Clone)]
pub struct PostgrestClient {
    requester: Requester,
    schema: String,
}

impl PostgrestClient {
    pub fn new(requester: Requester, schema: impl Into<String>) -> Self {
        Self {
            requester,
            schema: schema.into(),
        }
    }

    /// Start a request against `table`
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(table, self.schema.as_str())
    }

    pub async fn execute(&self, builder: &QueryBuilder) -> Result<QueryResponse> {
        let request = builder.to_request()?;
        debug!(
            "Executing {:?} on table '{}'",
            builder.operation(),
            builder.table()
        );

        let response = self.requester.send(request).await?;

        let count = match builder.count_method() {
            Some(method) => Some(parse_count(&response).ok_or_else(|| {
                ConnectorError::CountUnavailable {
                    method: method.to_string(),
                }
            })?),
            None => None,
        };

        let data = match response.json_value()? {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };

        if !builder.is_read() {
            info!(
                "{:?} on '{}' affected {} row(s)",
                builder.operation(),
                builder.table(),
                data.as_array().map(Vec::len).unwrap_or(1)
            );
        }

        Ok(QueryResponse { data, count })
    }
}

/// Total from a `Content-Range: 0-24/3573` header; `None` when the total is `*`
fn parse_count(response: &HttpResponse) -> Option<u64> {
    response
        .header("content-range")?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}
