use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error kinds surfaced to the UI layer.
///
/// Backend failures pass through unmodified; the only processing here is
/// classification, so callers can tell an auth problem from a missing row.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Backend(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Network(_) | ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<supabase::SupabaseError> for ApiError {
    fn from(err: supabase::SupabaseError) -> Self {
        use supabase::SupabaseError;
        match err {
            SupabaseError::Network(e) => ApiError::Network(e.to_string()),
            SupabaseError::Api {
                status, message, ..
            } => match status {
                401 | 403 => ApiError::Auth(message),
                404 | 406 => ApiError::NotFound(message),
                400 | 422 => ApiError::Validation(message),
                _ => ApiError::Backend(message),
            },
            other => {
                // Unexpected shapes are logged, never swallowed.
                tracing::error!(error = %other, "unexpected backend failure");
                ApiError::Backend(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "message": self.to_string(),
            "status_code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_statuses_classify_into_kinds() {
        let unauthorized = ApiError::from(supabase::SupabaseError::Api {
            service: "gotrue",
            status: 401,
            message: "bad token".into(),
        });
        assert!(matches!(unauthorized, ApiError::Auth(_)));
        assert_eq!(unauthorized.status_code(), StatusCode::UNAUTHORIZED);

        let missing = ApiError::from(supabase::SupabaseError::Api {
            service: "postgrest",
            status: 406,
            message: "no rows".into(),
        });
        assert!(matches!(missing, ApiError::NotFound(_)));

        let malformed = ApiError::from(supabase::SupabaseError::Api {
            service: "postgrest",
            status: 400,
            message: "invalid input syntax".into(),
        });
        assert!(matches!(malformed, ApiError::Validation(_)));

        let upstream = ApiError::from(supabase::SupabaseError::Api {
            service: "postgrest",
            status: 500,
            message: "boom".into(),
        });
        assert!(matches!(upstream, ApiError::Backend(_)));
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
    }
}
