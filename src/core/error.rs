use reqwest::StatusCode;
use thiserror::Error;

/// Coarse classification of a [`ConnectorError`].
///
/// Callers branch on this instead of matching error messages, e.g. to tell a
/// project that cannot be reached apart from a request the server rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Connect,
    Timeout,
    Transport,
    NotFound,
    Api,
    CountUnavailable,
    Decode,
    Storage,
    Io,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Could not connect: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        /// `statusCode` reported inside the body; Storage answers 400 for missing objects
        body_status: Option<StatusCode>,
        message: String,
    },

    #[error("Count method '{method}' is not supported for this request; try another count method")]
    CountUnavailable { method: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Configuration(_) => ErrorKind::Configuration,
            ConnectorError::Validation(_) => ErrorKind::Validation,
            ConnectorError::Connect(_) => ErrorKind::Connect,
            ConnectorError::Timeout(_) => ErrorKind::Timeout,
            ConnectorError::Transport(_) => ErrorKind::Transport,
            ConnectorError::Api {
                status,
                code,
                body_status,
                ..
            } => {
                let code_says_missing = code
                    .as_deref()
                    .map(|c| c.eq_ignore_ascii_case("not_found") || c == "404")
                    .unwrap_or(false);
                if *status == StatusCode::NOT_FOUND
                    || *body_status == Some(StatusCode::NOT_FOUND)
                    || code_says_missing
                {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::Api
                }
            }
            ConnectorError::CountUnavailable { .. } => ErrorKind::CountUnavailable,
            ConnectorError::Decode(_) => ErrorKind::Decode,
            ConnectorError::Storage(_) => ErrorKind::Storage,
            ConnectorError::Io(_) => ErrorKind::Io,
        }
    }

    /// Missing credential, naming every place it can be supplied
    pub fn missing_credential(label: &str, argument: &str, variable: &str) -> Self {
        ConnectorError::Configuration(format!(
            "Supabase {} not provided. You can provide the {} by passing it as the '{}' \
             argument while creating the connection, or setting the '{}' secret or \
             environment variable.",
            label, argument, argument, variable
        ))
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ConnectorError::Connect(e.to_string())
        } else if e.is_timeout() {
            ConnectorError::Timeout(e.to_string())
        } else if e.is_decode() {
            ConnectorError::Decode(e.to_string())
        } else {
            ConnectorError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Decode(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ConnectorError {
    fn from(e: validator::ValidationErrors) -> Self {
        ConnectorError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_kind_from_status() {
        let err = ConnectorError::Api {
            status: StatusCode::NOT_FOUND,
            code: None,
            body_status: None,
            message: "Bucket not found".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ConnectorError::Api {
            status: StatusCode::BAD_REQUEST,
            code: Some("not_found".to_string()),
            body_status: None,
            message: "Object not found".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ConnectorError::Api {
            status: StatusCode::CONFLICT,
            code: Some("23505".to_string()),
            body_status: None,
            message: "duplicate key".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Api);

        let err = ConnectorError::Api {
            status: StatusCode::BAD_REQUEST,
            code: Some("Bucket not found".to_string()),
            body_status: Some(StatusCode::NOT_FOUND),
            message: "Bucket not found".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_credential_names_all_sources() {
        let err = ConnectorError::missing_credential("URL", "url", "SUPABASE_URL");
        let msg = err.to_string();
        assert!(msg.contains("'url' argument"));
        assert!(msg.contains("'SUPABASE_URL' secret or environment variable"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
