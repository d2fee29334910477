//! Route guard: two states per subtree, evaluated on every navigation.
//!
//! Unauthenticated requests into the guarded subtree bounce to `/login`;
//! authenticated requests into the auth pages bounce to the default
//! resource. Session validity is the identity service's answer, asked fresh
//! per navigation through the session adapter.

use axum::extract::{Extension, Request};
use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tower_sessions::Session;

use crate::common::ApiError;
use crate::server::app::AppState;

/// Where authenticated users land by default.
pub const DEFAULT_RESOURCE_PATH: &str = "/blog-posts";

/// Identity of the caller, inserted for handlers once the guard passes.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub supabase::User);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    /// No session check at all.
    Public,
    /// Login and friends: only for the unauthenticated.
    AuthPages,
    /// Everything else.
    Guarded,
}

fn classify(path: &str) -> RouteClass {
    match path {
        // Refresh must stay reachable with an expired access token; the
        // handler demands a cached refresh token itself.
        "/health" | "/auth/callback" | "/auth/refresh" => RouteClass::Public,
        "/login" | "/verifyotp" | "/forgot-password" => RouteClass::AuthPages,
        _ => RouteClass::Guarded,
    }
}

/// Browser navigations get redirects; API clients get the error body.
fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

pub async fn route_guard(
    Extension(state): Extension<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let class = classify(request.uri().path());
    if class == RouteClass::Public {
        return next.run(request).await;
    }

    let checked = match state.sessions.check_session(&session).await {
        Ok(checked) => checked,
        Err(err) => return err.into_response(),
    };

    if class == RouteClass::AuthPages {
        if checked.authenticated {
            return Redirect::to(DEFAULT_RESOURCE_PATH).into_response();
        }
        return next.run(request).await;
    }

    match checked.identity {
        Some(identity) => {
            request.extensions_mut().insert(CurrentUser(identity));
            next.run(request).await
        }
        None if wants_html(request.headers()) => Redirect::to("/login").into_response(),
        None => ApiError::Auth("authentication required".into()).into_response(),
    }
}
