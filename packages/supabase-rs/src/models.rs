use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A session issued by the identity service.
///
/// The token pair is opaque to callers; expiry is enforced upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

/// The identity behind a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Error body returned by the identity service.
///
/// GoTrue is not consistent about the field name across endpoints, so all the
/// shapes seen in the wild are accepted.
#[derive(Debug, Deserialize)]
pub struct AuthErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthErrorBody {
    pub fn into_message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Error body returned by the row API.
#[derive(Debug, Deserialize)]
pub struct RestErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl RestErrorBody {
    pub fn into_message(self) -> String {
        self.message
            .or(self.details)
            .unwrap_or_else(|| "unknown error".to_string())
    }
}
