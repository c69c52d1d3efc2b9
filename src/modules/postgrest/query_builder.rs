use std::fmt;
use std::str::FromStr;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{ConnectorError, Result};
use crate::modules::transport::{HttpRequest, Service};
use crate::shared::validation::require_non_empty;

/// Row counting algorithm requested through the `Prefer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMethod {
    /// `COUNT(*)`; exact but slow
    Exact,
    /// Postgres planner statistics; fast but approximate
    Planned,
    /// Exact for small results, planned for large ones
    Estimated,
}

impl CountMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountMethod::Exact => "exact",
            CountMethod::Planned => "planned",
            CountMethod::Estimated => "estimated",
        }
    }
}

impl fmt::Display for CountMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountMethod {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(CountMethod::Exact),
            "planned" => Ok(CountMethod::Planned),
            "estimated" => Ok(CountMethod::Estimated),
            other => Err(ConnectorError::Validation(format!(
                "Unknown count method '{}'; expected exact, planned or estimated",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Upsert,
    Update,
    Delete,
}

impl Operation {
    fn method(&self) -> Method {
        match self {
            Operation::Select => Method::GET,
            Operation::Insert | Operation::Upsert => Method::POST,
            Operation::Update => Method::PATCH,
            Operation::Delete => Method::DELETE,
        }
    }
}

/// Chainable PostgREST request description.
///
/// Building never talks to the server; hand the finished builder to
/// [`crate::modules::postgrest::PostgrestClient::execute`] or to the
/// connection's `execute_query`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table: String,
    schema: String,
    operation: Operation,
    columns: Option<String>,
    body: Option<Value>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    count: Option<CountMethod>,
    on_conflict: Option<String>,
    ignore_duplicates: bool,
    /// `(from, to)` of a `range` call with `to < from`, rejected when rendered
    invalid_range: Option<(u64, u64)>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: schema.into(),
            operation: Operation::Select,
            columns: None,
            body: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            count: None,
            on_conflict: None,
            ignore_duplicates: false,
            invalid_range: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn count_method(&self) -> Option<CountMethod> {
        self.count
    }

    /// Whether the request only reads rows and may be served from a cache
    pub fn is_read(&self) -> bool {
        self.operation == Operation::Select
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Select `columns` (comma separated, PostgREST syntax including embeds)
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        let columns = columns.into();
        self.operation = Operation::Select;
        self.columns = Some(if columns.trim().is_empty() {
            "*".to_string()
        } else {
            columns
        });
        self
    }

    /// Insert one row (object) or many (array)
    pub fn insert(mut self, rows: Value) -> Self {
        self.operation = Operation::Insert;
        self.body = Some(rows);
        self
    }

    pub fn upsert(mut self, rows: Value) -> Self {
        self.operation = Operation::Upsert;
        self.body = Some(rows);
        self
    }

    /// Columns forming the unique constraint an upsert resolves on
    pub fn on_conflict(mut self, columns: impl Into<String>) -> Self {
        self.on_conflict = Some(columns.into());
        self
    }

    /// Skip conflicting rows instead of merging them
    pub fn ignore_duplicates(mut self, ignore: bool) -> Self {
        self.ignore_duplicates = ignore;
        self
    }

    pub fn update(mut self, values: Value) -> Self {
        self.operation = Operation::Update;
        self.body = Some(values);
        self
    }

    pub fn delete(mut self) -> Self {
        self.operation = Operation::Delete;
        self.body = None;
        self
    }

    pub fn count(mut self, method: CountMethod) -> Self {
        self.count = Some(method);
        self
    }

    // -------------------------------------------------------------------------
    // Filters and modifiers
    // -------------------------------------------------------------------------

    fn filter(mut self, column: &str, operator: &str, value: impl fmt::Display) -> Self {
        self.filters
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, "lte", value)
    }

    /// SQL `LIKE`; `*` may be used in place of `%`
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "like", pattern)
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    /// `IS` comparison against `null`, `true` or `false`
    pub fn is(self, column: &str, value: &str) -> Self {
        self.filter(column, "is", value)
    }

    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        let list = values
            .into_iter()
            .map(|v| quote_list_item(&v.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({})", list))
    }

    /// Array / range / JSON containment (`@>`)
    pub fn contains(self, column: &str, value: &Value) -> Self {
        let rendered = match value {
            Value::Array(items) => format!(
                "{{{}}}",
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.filter(column, "cs", rendered)
    }

    pub fn order(mut self, column: &str, descending: bool) -> Self {
        let direction = if descending { "desc" } else { "asc" };
        self.order.push(format!("{}.{}", column, direction));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Rows `from..=to`, zero based. `to < from` fails when the request is built.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        match to.checked_sub(from) {
            Some(span) => {
                self.offset = Some(from);
                self.limit = Some(span.saturating_add(1));
                self.invalid_range = None;
            }
            None => self.invalid_range = Some((from, to)),
        }
        self
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    fn prefer(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.operation != Operation::Select {
            parts.push("return=representation".to_string());
        }
        if self.operation == Operation::Upsert {
            parts.push(if self.ignore_duplicates {
                "resolution=ignore-duplicates".to_string()
            } else {
                "resolution=merge-duplicates".to_string()
            });
        }
        if let Some(count) = self.count {
            parts.push(format!("count={}", count));
        }
        (!parts.is_empty()).then(|| parts.join(","))
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        match self.operation {
            Operation::Select => {
                pairs.push((
                    "select".to_string(),
                    self.columns.clone().unwrap_or_else(|| "*".to_string()),
                ));
            }
            Operation::Upsert => {
                if let Some(columns) = &self.on_conflict {
                    pairs.push(("on_conflict".to_string(), columns.clone()));
                }
            }
            _ => {}
        }
        pairs.extend(self.filters.iter().cloned());
        if !self.order.is_empty() {
            pairs.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }

    /// Stable identity of the request: method, path, query parameters,
    /// preferences and body. Equal keys mean the server would see the same call.
    pub fn cache_key(&self) -> String {
        serde_json::json!([
            self.operation.method().as_str(),
            self.schema,
            self.table,
            self.query_pairs(),
            self.prefer(),
            self.body,
        ])
        .to_string()
    }

    pub fn to_request(&self) -> Result<HttpRequest> {
        require_non_empty(&self.table, "table name")?;
        if let Some((from, to)) = self.invalid_range {
            return Err(ConnectorError::Validation(format!(
                "Invalid range {}..={} on '{}': end is before start",
                from, to, self.table
            )));
        }
        if matches!(
            self.operation,
            Operation::Insert | Operation::Upsert | Operation::Update
        ) && self.body.is_none()
        {
            return Err(ConnectorError::Validation(format!(
                "{:?} on '{}' requires a body",
                self.operation, self.table
            )));
        }

        let profile_header = if self.is_read() {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };

        let mut request = HttpRequest::new(
            self.operation.method(),
            Service::Rest,
            format!("/{}", urlencoding::encode(&self.table)),
        )
        .header(profile_header, self.schema.clone());

        for (name, value) in self.query_pairs() {
            request = request.query(name, value);
        }
        if let Some(prefer) = self.prefer() {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = &self.body {
            request = request.json(body.clone());
        }

        Ok(request)
    }
}

fn quote_list_item(item: &str) -> String {
    if item.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", item.replace('"', "\\\""))
    } else {
        item.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn countries() -> QueryBuilder {
        QueryBuilder::new("countries", "public")
    }

    #[test]
    fn test_select_request_shape() {
        let request = countries()
            .select("id,name")
            .eq("continent", "Asia")
            .order("name", true)
            .limit(5)
            .count(CountMethod::Exact)
            .to_request()
            .unwrap();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/countries");
        assert_eq!(
            request.query,
            vec![
                ("select".to_string(), "id,name".to_string()),
                ("continent".to_string(), "eq.Asia".to_string()),
                ("order".to_string(), "name.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
        assert_eq!(request.header_value("Prefer"), Some("count=exact"));
        assert_eq!(request.header_value("Accept-Profile"), Some("public"));
    }

    #[test]
    fn test_upsert_request_shape() {
        let request = countries()
            .upsert(json!({"id": 1, "name": "Atlantis"}))
            .on_conflict("id")
            .to_request()
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.query,
            vec![("on_conflict".to_string(), "id".to_string())]
        );
        assert_eq!(
            request.header_value("Prefer"),
            Some("return=representation,resolution=merge-duplicates")
        );
        assert_eq!(request.header_value("Content-Profile"), Some("public"));
    }

    #[test]
    fn test_update_and_delete_methods() {
        let update = countries()
            .update(json!({"iso3": "N/A"}))
            .eq("id", 7)
            .to_request()
            .unwrap();
        assert_eq!(update.method, Method::PATCH);
        assert!(!countries().update(json!({})).is_read());

        let delete = countries().delete().eq("id", 7).to_request().unwrap();
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(
            delete.query,
            vec![("id".to_string(), "eq.7".to_string())]
        );
    }

    #[test]
    fn test_insert_without_body_is_rejected() {
        let mut builder = countries().insert(json!({}));
        builder.body = None;
        assert!(builder.to_request().is_err());
        assert!(QueryBuilder::new("", "public").select("*").to_request().is_err());
    }

    #[test]
    fn test_in_and_contains_filters() {
        let request = countries()
            .select("*")
            .in_("iso2", ["IN", "ID", "New Zealand"])
            .contains("tags", &json!(["a", "b"]))
            .to_request()
            .unwrap();
        assert!(request
            .query
            .contains(&("iso2".to_string(), "in.(IN,ID,\"New Zealand\")".to_string())));
        assert!(request
            .query
            .contains(&("tags".to_string(), "cs.{a,b}".to_string())));
    }

    #[test]
    fn test_range_sets_offset_and_limit() {
        let request = countries().select("*").range(10, 19).to_request().unwrap();
        assert!(request.query.contains(&("limit".to_string(), "10".to_string())));
        assert!(request.query.contains(&("offset".to_string(), "10".to_string())));
    }

    #[test]
    fn test_range_bounds() {
        let request = countries().select("*").range(0, u64::MAX).to_request().unwrap();
        assert!(request
            .query
            .contains(&("limit".to_string(), u64::MAX.to_string())));

        let err = countries().select("*").range(20, 10).to_request().unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Validation);
    }

    #[test]
    fn test_cache_key_distinguishes_requests() {
        let a = countries().select("*").eq("continent", "Asia");
        let b = countries().select("*").eq("continent", "Europe");
        let a_again = countries().select("*").eq("continent", "Asia");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), a_again.cache_key());
        assert_ne!(
            a.cache_key(),
            a.clone().count(CountMethod::Planned).cache_key()
        );
    }

    #[test]
    fn test_cache_key_not_fooled_by_separators_in_values() {
        let smuggled = QueryBuilder::new("t", "public").select("*").eq("a", "x&b=eq.y");
        let two_filters = QueryBuilder::new("t", "public")
            .select("*")
            .eq("a", "x")
            .eq("b", "y");
        assert_ne!(
            smuggled.to_request().unwrap().query,
            two_filters.to_request().unwrap().query
        );
        assert_ne!(smuggled.cache_key(), two_filters.cache_key());
    }

    #[test]
    fn test_count_method_parse() {
        assert_eq!("Exact".parse::<CountMethod>().unwrap(), CountMethod::Exact);
        assert_eq!("planned".parse::<CountMethod>().unwrap(), CountMethod::Planned);
        assert!("fuzzy".parse::<CountMethod>().is_err());
    }
}
