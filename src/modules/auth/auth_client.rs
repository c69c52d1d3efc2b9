//! Supabase Auth (GoTrue) client
//!
//! Holds at most one session. While it is held, every request sent through
//! the shared [`Requester`] authorizes with the session's access token.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::core::error::{ConnectorError, Result};
use crate::modules::auth::dtos::{AuthResponse, Session, SignInRequest, User};
use crate::modules::transport::{HttpRequest, Requester, Service};

#[derive(Clone)]
pub struct AuthClient {
    requester: Requester,
    session: Arc<RwLock<Option<Session>>>,
}

impl AuthClient {
    pub fn new(requester: Requester) -> Self {
        Self {
            requester,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a new user. The session is only present (and held) when the
    /// project does not require email confirmation.
    pub async fn sign_up(&self, credentials: &SignInRequest) -> Result<AuthResponse> {
        credentials.validate()?;

        let request = HttpRequest::new(Method::POST, Service::Auth, "/signup").json(json!({
            "email": credentials.email,
            "password": credentials.password,
        }));
        let body = self.requester.send(request).await?.json_value()?;

        let response = if body.get("access_token").is_some() {
            let session = self.parse_session(body)?;
            self.store_session(session.clone()).await;
            AuthResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            }
        } else {
            let user: User = serde_json::from_value(body)?;
            AuthResponse {
                user: Some(user),
                session: None,
            }
        };

        info!(
            "Signed up {} (session: {})",
            credentials.email,
            response.session.is_some()
        );
        Ok(response)
    }

    pub async fn sign_in_with_password(&self, credentials: &SignInRequest) -> Result<AuthResponse> {
        credentials.validate()?;

        let request = HttpRequest::new(Method::POST, Service::Auth, "/token")
            .query("grant_type", "password")
            .json(json!({
                "email": credentials.email,
                "password": credentials.password,
            }));
        let body = self.requester.send(request).await?.json_value()?;
        let session = self.parse_session(body)?;
        self.store_session(session.clone()).await;

        info!("Signed in {}", credentials.email);
        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    /// Revoke the held session. The local session is dropped even when the
    /// server call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            debug!("sign_out without a session");
            return Ok(());
        };
        self.requester.set_session_token(None).await;

        let mut request = HttpRequest::new(Method::POST, Service::Auth, "/logout");
        request.bearer = Some(session.access_token);

        match self.requester.send(request).await {
            Ok(_) => {
                info!("Signed out {}", session.user.id);
                Ok(())
            }
            Err(e) => {
                warn!("Sign-out request failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn get_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// User behind the held session, `None` when signed out
    pub async fn get_user(&self) -> Result<Option<User>> {
        let Some(token) = self
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
        else {
            return Ok(None);
        };

        let mut request = HttpRequest::new(Method::GET, Service::Auth, "/user");
        request.bearer = Some(token);
        let user: User = self.requester.send(request).await?.json()?;
        Ok(Some(user))
    }

    fn parse_session(&self, body: Value) -> Result<Session> {
        let session: Session = serde_json::from_value(body).map_err(|e| {
            ConnectorError::Decode(format!("Invalid session in auth response: {}", e))
        })?;
        Ok(session.with_expiry_from(Utc::now()))
    }

    async fn store_session(&self, session: Session) {
        self.requester
            .set_session_token(Some(session.access_token.clone()))
            .await;
        *self.session.write().await = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::modules::transport::HttpResponse;
    use crate::shared::test_helpers::ScriptedTransport;
    use reqwest::StatusCode;

    fn session_body() -> Value {
        json!({
            "access_token": "user-token",
            "refresh_token": "refresh",
            "token_type": "bearer",
            "expires_in": 3600,
            "user": {"id": "u-1", "email": "ana@example.com", "role": "authenticated"}
        })
    }

    fn credentials() -> SignInRequest {
        SignInRequest::new("ana@example.com", "secret-password")
    }

    #[tokio::test]
    async fn test_sign_in_holds_session_for_later_requests() {
        let transport = ScriptedTransport::new(|request| match request.path.as_str() {
            "/token" => Ok(HttpResponse::new(StatusCode::OK).with_json(&session_body())),
            _ => Ok(HttpResponse::new(StatusCode::OK).with_json(&json!([]))),
        });
        let requester = Requester::new(transport.clone());
        let auth = AuthClient::new(requester.clone());

        let response = auth.sign_in_with_password(&credentials()).await.unwrap();
        let session = response.session.unwrap();
        assert!(session.expires_at.is_some());
        assert_eq!(requester.session_token().await.as_deref(), Some("user-token"));

        requester
            .send(HttpRequest::new(Method::GET, Service::Rest, "/todos"))
            .await
            .unwrap();
        let requests = transport.requests();
        assert_eq!(
            requests[0].query,
            vec![("grant_type".to_string(), "password".to_string())]
        );
        assert_eq!(requests[1].bearer.as_deref(), Some("user-token"));
    }

    #[tokio::test]
    async fn test_sign_up_without_confirmation_has_no_session() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK)
                .with_json(&json!({"id": "u-2", "email": "ana@example.com"})))
        });
        let auth = AuthClient::new(Requester::new(transport));

        let response = auth.sign_up(&credentials()).await.unwrap();
        assert_eq!(response.user.unwrap().id, "u-2");
        assert!(response.session.is_none());
        assert!(auth.get_session().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_even_on_failure() {
        let transport = ScriptedTransport::new(|request| match request.path.as_str() {
            "/token" => Ok(HttpResponse::new(StatusCode::OK).with_json(&session_body())),
            _ => Ok(HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)),
        });
        let requester = Requester::new(transport);
        let auth = AuthClient::new(requester.clone());

        auth.sign_in_with_password(&credentials()).await.unwrap();
        let err = auth.sign_out().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(auth.get_session().await.is_none());
        assert!(requester.session_token().await.is_none());
    }

    #[tokio::test]
    async fn test_get_user_when_signed_out() {
        let transport = ScriptedTransport::new(|_| Ok(HttpResponse::new(StatusCode::OK)));
        let auth = AuthClient::new(Requester::new(transport.clone()));

        assert_eq!(auth.get_user().await.unwrap(), None);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_credentials_rejected_locally() {
        let transport = ScriptedTransport::new(|_| Ok(HttpResponse::new(StatusCode::OK)));
        let auth = AuthClient::new(Requester::new(transport.clone()));

        let err = auth
            .sign_in_with_password(&SignInRequest::new("ana", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
    }
}
