use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    backend: BackendHealth,
}

#[derive(Serialize)]
pub struct BackendHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Checks the hosted backend's identity service for reachability.
/// Returns 200 OK if it answers, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let backend = match state.supabase.auth() {
        Ok(auth) => match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            auth.health(),
        )
        .await
        {
            Ok(Ok(())) => BackendHealth {
                status: "ok".to_string(),
                error: None,
            },
            Ok(Err(e)) => BackendHealth {
                status: "error".to_string(),
                error: Some(format!("Probe failed: {}", e)),
            },
            Err(_) => BackendHealth {
                status: "error".to_string(),
                error: Some("Probe timeout (>5s)".to_string()),
            },
        },
        Err(e) => BackendHealth {
            status: "error".to_string(),
            error: Some(format!("Client misconfigured: {}", e)),
        },
    };

    let is_healthy = backend.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            backend,
        }),
    )
}
