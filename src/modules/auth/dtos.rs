use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Email/password credentials for `sign_up` and `sign_in_with_password`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl SignInRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Supabase Auth user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_metadata: Value,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Token type (always "bearer")
    pub token_type: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    /// Unix timestamp at which the access token expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the server left it out
    pub(crate) fn with_expiry_from(mut self, issued_at: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(issued_at.timestamp() + self.expires_in);
        }
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|expires_at| now.timestamp() >= expires_at)
            .unwrap_or(false)
    }
}

/// Outcome of `sign_up`/`sign_in_with_password`. A sign-up that still
/// needs email confirmation carries a user but no session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use serde_json::json;

    #[test]
    fn test_sign_in_request_validation() {
        let email: String = SafeEmail().fake();
        assert!(SignInRequest::new(email.clone(), "hunter2").validate().is_ok());
        assert!(SignInRequest::new(email, "").validate().is_err());
        assert!(SignInRequest::new("not-an-email", "hunter2").validate().is_err());
    }

    #[test]
    fn test_session_expiry_filled_in() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "bearer",
            "expires_in": 3600,
            "user": {"id": "u1", "email": "a@example.com"}
        }))
        .unwrap();
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let session = session.with_expiry_from(issued);

        assert_eq!(session.expires_at, Some(issued.timestamp() + 3600));
        assert!(!session.is_expired(issued));
        assert!(session.is_expired(issued + chrono::Duration::seconds(3600)));
    }
}
