//! HTTP transport shared by the REST, Storage and Auth clients
//!
//! Requests are described as plain data ([`HttpRequest`]) and handed to a
//! [`Transport`]. The production transport is [`HttpTransport`] over
//! `reqwest`; tests plug in a scripted transport instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::credentials::Credentials;
use crate::core::error::{ConnectorError, Result};
use crate::shared::constants::{AUTH_PATH, REST_PATH, STORAGE_PATH};

/// Which Supabase service a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Rest,
    Storage,
    Auth,
}

impl Service {
    pub fn prefix(&self) -> &'static str {
        match self {
            Service::Rest => REST_PATH,
            Service::Storage => STORAGE_PATH,
            Service::Auth => AUTH_PATH,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Bytes {
        data: Bytes,
        content_type: String,
    },
    Multipart {
        field: String,
        file_name: String,
        data: Bytes,
        content_type: String,
    },
}

/// Transport-independent description of one HTTP call
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub service: Service,
    /// Path below the service prefix, already percent-encoded
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Token for the `Authorization` header; the access key when `None`
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, service: Service, path: impl Into<String>) -> Self {
        Self {
            method,
            service,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn bytes(mut self, data: Bytes, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Bytes {
            data,
            content_type: content_type.into(),
        };
        self
    }

    pub fn multipart(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        data: Bytes,
        content_type: impl Into<String>,
    ) -> Self {
        self.body = RequestBody::Multipart {
            field: field.into(),
            file_name: file_name.into(),
            data,
            content_type: content_type.into(),
        };
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_json(mut self, value: &Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ConnectorError::Decode(format!("{} (body: {})", e, preview(&self.body)))
        })
    }

    /// Body as JSON, `null` when empty
    pub fn json_value(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        self.json()
    }

    /// Turn a non-2xx response into [`ConnectorError::Api`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }

        let ParsedError {
            code,
            body_status,
            message,
        } = parse_error_body(&self.body);
        let message = message.unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });
        warn!("Supabase returned HTTP {}: {}", self.status, message);

        Err(ConnectorError::Api {
            status: self.status,
            code,
            body_status,
            message,
        })
    }
}

struct ParsedError {
    code: Option<String>,
    body_status: Option<StatusCode>,
    message: Option<String>,
}

/// Extract code, body status and message from the error shapes used by
/// PostgREST, Storage and GoTrue
fn parse_error_body(body: &[u8]) -> ParsedError {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        let text = String::from_utf8_lossy(body).trim().to_string();
        return ParsedError {
            code: None,
            body_status: None,
            message: (!text.is_empty()).then_some(text),
        };
    };

    let text = |key: &str| -> Option<String> {
        match map.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let message = text("message")
        .or_else(|| text("msg"))
        .or_else(|| text("error_description"));
    let code = text("error_code")
        .or_else(|| text("code"))
        .or_else(|| message.as_ref().and_then(|_| text("error")))
        .or_else(|| text("statusCode"));
    let message = message.or_else(|| text("error"));
    let body_status = text("statusCode")
        .and_then(|status| status.parse::<u16>().ok())
        .and_then(|status| StatusCode::from_u16(status).ok());

    ParsedError {
        code,
        body_status,
        message,
    }
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() > 200 {
        let mut end = 200;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.into_owned()
    }
}

/// Percent-encode each segment of an object path, keeping the separators
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Project URL without trailing slash
    fn base_url(&self) -> &str;

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport attaching the project's `apikey`
pub struct HttpTransport {
    http_client: Client,
    base_url: String,
    key: String,
}

impl HttpTransport {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("supabase-connector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConnectorError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: credentials.url().to_string(),
            key: credentials.key().to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = format!("{}{}{}", self.base_url, request.service.prefix(), request.path);
        let bearer = request.bearer.as_deref().unwrap_or(&self.key);

        debug!("{} {}", request.method, url);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header("apikey", &self.key)
            .bearer_auth(bearer);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes { data, content_type } => {
                builder.header(CONTENT_TYPE, content_type).body(data)
            }
            RequestBody::Multipart {
                field,
                file_name,
                data,
                content_type,
            } => {
                let part = Part::bytes(data.to_vec())
                    .file_name(file_name)
                    .mime_str(&content_type)
                    .map_err(|e| {
                        ConnectorError::Validation(format!(
                            "Invalid content type '{}': {}",
                            content_type, e
                        ))
                    })?;
                builder.multipart(Form::new().part(field, part))
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!("{} {} -> {} ({} bytes)", request.method, url, status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sends requests through a [`Transport`], authorizing with the signed-in
/// user's access token when one is held
#[derive(Clone)]
pub struct Requester {
    transport: Arc<dyn Transport>,
    session_token: Arc<RwLock<Option<String>>>,
}

impl Requester {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            session_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Send and fail on non-2xx statuses
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if request.bearer.is_none() {
            request.bearer = self.session_token.read().await.clone();
        }
        self.transport.send(request).await?.error_for_status()
    }

    pub async fn set_session_token(&self, token: Option<String>) {
        *self.session_token.write().await = token;
    }

    pub async fn session_token(&self) -> Option<String> {
        self.session_token.read().await.clone()
    }
}
