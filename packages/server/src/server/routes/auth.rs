//! Auth routes: login (password, federated, phone OTP), OTP verification,
//! logout, password recovery and the federated callback.

use axum::extract::{Extension, Query};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::common::ApiError;
use crate::server::app::AppState;
use crate::server::guard::DEFAULT_RESOURCE_PATH;
use crate::session::{LoginOutcome, LoginRequest};

/// JSON description of the login surface; rendering is the UI's job.
pub async fn login_form() -> Json<serde_json::Value> {
    Json(json!({
        "title": "Sign in to your account",
        "providers": ["google"],
        "actions": {
            "login": "POST /login",
            "verify_otp": "POST /verifyotp",
            "forgot_password": "POST /forgot-password",
        },
    }))
}

pub async fn login(
    Extension(state): Extension<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    match state.sessions.login(&session, request).await? {
        LoginOutcome::SignedIn(user) => Ok(Json(json!({
            "authenticated": true,
            "identity": user,
            "redirect_to": DEFAULT_RESOURCE_PATH,
        }))
        .into_response()),
        LoginOutcome::OtpSent { phone } => Ok(Json(json!({
            "otp_sent": true,
            "phone": phone,
            "redirect_to": "/verifyotp",
        }))
        .into_response()),
        LoginOutcome::ExternalRedirect(url) => Ok(Redirect::to(url.as_str()).into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
    /// Falls back to the phone number stashed at login time.
    #[serde(default)]
    pub phone: Option<String>,
}

pub async fn verify_otp(
    Extension(state): Extension<AppState>,
    session: Session,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .sessions
        .verify_otp(&session, &request.otp, request.phone)
        .await?;
    Ok(Json(json!({
        "authenticated": true,
        "identity": user,
        "redirect_to": DEFAULT_RESOURCE_PATH,
    })))
}

/// Exchange the cached refresh token for a fresh session. Not invoked by
/// the guard; stale sessions stay unauthenticated until the caller asks.
pub async fn refresh(
    Extension(state): Extension<AppState>,
    session: Session,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.sessions.refresh(&session).await?;
    Ok(Json(json!({
        "authenticated": true,
        "identity": user,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

pub async fn forgot_password(
    Extension(state): Extension<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.forgot_password(&request.email).await?;
    Ok(Json(json!({ "recovery_sent": true })))
}

pub async fn logout(
    Extension(state): Extension<AppState>,
    session: Session,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.logout(&session).await?;
    Ok(Json(json!({
        "authenticated": false,
        "redirect_to": "/login",
    })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Federated logins land here; the provider hands tokens back through the
/// redirect and the session is only established after the identity service
/// vouches for them.
pub async fn callback(
    Extension(state): Extension<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(description) = query.error_description {
        return Err(ApiError::Auth(description));
    }

    let (Some(access_token), Some(refresh_token)) = (query.access_token, query.refresh_token)
    else {
        return Err(ApiError::Validation(
            "callback is missing the token pair".into(),
        ));
    };

    state
        .sessions
        .complete_external_login(&session, access_token, refresh_token)
        .await?;
    Ok(Redirect::to(DEFAULT_RESOURCE_PATH).into_response())
}
