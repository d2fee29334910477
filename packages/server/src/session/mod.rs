//! Session/auth adapter over the identity service.
//!
//! The browser session cookie is the only cache: it holds the issued token
//! pair plus the pending phone number between the OTP request and its
//! verification. Token validity is always the identity service's answer;
//! nothing is verified locally.

use serde::{Deserialize, Serialize};
use supabase::{Auth, SupabaseError, User};
use tower_sessions::Session;
use url::Url;

use crate::common::ApiError;

const SESSION_KEY: &str = "backend_session";
const PENDING_PHONE_KEY: &str = "pending_phone";

/// What the browser session caches about an issued backend session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Login request body. Exactly one of the three shapes is expected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// How a login attempt continues.
pub enum LoginOutcome {
    /// Credentials were accepted and a session is established.
    SignedIn(User),
    /// An OTP challenge was issued; the caller goes to the verify form.
    OtpSent { phone: String },
    /// Federated flow: send the browser to the provider. The outcome comes
    /// back through the callback route, not this request.
    ExternalRedirect(Url),
}

/// Result of a session check.
#[derive(Debug, Serialize)]
pub struct SessionState {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<User>,
}

impl SessionState {
    fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            identity: None,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    auth: Auth,
    callback_url: String,
}

impl SessionService {
    pub fn new(auth: Auth, public_url: &str) -> Self {
        Self {
            auth,
            callback_url: format!("{}/auth/callback", public_url.trim_end_matches('/')),
        }
    }

    pub async fn login(
        &self,
        session: &Session,
        request: LoginRequest,
    ) -> Result<LoginOutcome, ApiError> {
        if let Some(provider) = request.provider {
            let url = self.auth.authorize_url(&provider, &self.callback_url)?;
            return Ok(LoginOutcome::ExternalRedirect(url));
        }

        if let (Some(email), Some(password)) = (&request.email, &request.password) {
            let issued = self
                .auth
                .sign_in_with_password(email, password)
                .await
                .map_err(credentials_error)?;
            let user = issued.user.clone();
            self.store(session, issued.access_token, issued.refresh_token, issued.user)
                .await?;
            tracing::info!(user = %user.id, "password login succeeded");
            return Ok(LoginOutcome::SignedIn(user));
        }

        if let Some(phone) = request.phone {
            self.auth.sign_in_with_otp(&phone).await?;
            session
                .insert(PENDING_PHONE_KEY, &phone)
                .await
                .map_err(store_error)?;
            tracing::info!("OTP challenge sent");
            return Ok(LoginOutcome::OtpSent { phone });
        }

        Err(ApiError::Validation(
            "login requires email and password, a provider, or a phone number".into(),
        ))
    }

    /// Submit the OTP challenge response. The phone number defaults to the
    /// one stashed when the challenge was requested.
    pub async fn verify_otp(
        &self,
        session: &Session,
        code: &str,
        phone: Option<String>,
    ) -> Result<User, ApiError> {
        let phone = match phone.filter(|p| !p.is_empty()) {
            Some(phone) => phone,
            None => session
                .get::<String>(PENDING_PHONE_KEY)
                .await
                .map_err(store_error)?
                .ok_or_else(|| {
                    ApiError::Validation("no pending phone number to verify".into())
                })?,
        };

        let issued = self
            .auth
            .verify_otp(&phone, code)
            .await
            .map_err(|err| match err {
                SupabaseError::Api { status, .. } if status < 500 => {
                    ApiError::Auth("Invalid OTP".into())
                }
                other => other.into(),
            })?;

        session
            .remove::<String>(PENDING_PHONE_KEY)
            .await
            .map_err(store_error)?;
        let user = issued.user.clone();
        self.store(session, issued.access_token, issued.refresh_token, issued.user)
            .await?;
        tracing::info!(user = %user.id, "OTP login succeeded");
        Ok(user)
    }

    /// Finish a federated login: the provider redirected back with a token
    /// pair, which is only trusted after the identity service vouches for it.
    pub async fn complete_external_login(
        &self,
        session: &Session,
        access_token: String,
        refresh_token: String,
    ) -> Result<User, ApiError> {
        let user = self
            .auth
            .user(&access_token)
            .await
            .map_err(credentials_error)?;
        self.store(session, access_token, refresh_token, user.clone())
            .await?;
        tracing::info!(user = %user.id, "federated login succeeded");
        Ok(user)
    }

    /// Ask the identity service whether the cached token is still good.
    /// Expired, revoked or absent tokens are simply unauthenticated.
    pub async fn check_session(&self, session: &Session) -> Result<SessionState, ApiError> {
        let Some(stored) = session
            .get::<StoredSession>(SESSION_KEY)
            .await
            .map_err(store_error)?
        else {
            return Ok(SessionState::unauthenticated());
        };

        match self.auth.user(&stored.access_token).await {
            Ok(user) => Ok(SessionState {
                authenticated: true,
                identity: Some(user),
            }),
            Err(SupabaseError::Api { status, message, .. }) if status < 500 => {
                tracing::debug!(status, message, "cached token rejected upstream");
                session
                    .remove::<StoredSession>(SESSION_KEY)
                    .await
                    .map_err(store_error)?;
                Ok(SessionState::unauthenticated())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Exchange the cached refresh token for a fresh session.
    pub async fn refresh(&self, session: &Session) -> Result<User, ApiError> {
        let stored = session
            .get::<StoredSession>(SESSION_KEY)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::Auth("no session to refresh".into()))?;

        let issued = self
            .auth
            .refresh_session(&stored.refresh_token)
            .await
            .map_err(credentials_error)?;
        let user = issued.user.clone();
        self.store(session, issued.access_token, issued.refresh_token, issued.user)
            .await?;
        Ok(user)
    }

    /// Best-effort revoke upstream, then flush the cache regardless.
    pub async fn logout(&self, session: &Session) -> Result<(), ApiError> {
        if let Some(stored) = session
            .get::<StoredSession>(SESSION_KEY)
            .await
            .map_err(store_error)?
        {
            if let Err(err) = self.auth.sign_out(&stored.access_token).await {
                tracing::warn!(error = %err, "upstream sign-out failed");
            }
        }
        session.flush().await.map_err(store_error)
    }

    /// Delegate to the identity service's recovery mail. Always answers
    /// success-shaped so the form cannot be used to probe for accounts.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        if let Err(err) = self.auth.reset_password_for_email(email).await {
            tracing::warn!(error = %err, "password recovery request failed");
        }
        Ok(())
    }

    async fn store(
        &self,
        session: &Session,
        access_token: String,
        refresh_token: String,
        user: User,
    ) -> Result<(), ApiError> {
        session
            .insert(
                SESSION_KEY,
                StoredSession {
                    access_token,
                    refresh_token,
                    user,
                },
            )
            .await
            .map_err(store_error)
    }
}

/// The token endpoints answer 4xx for bad credentials; those are auth
/// failures, not validation failures.
fn credentials_error(err: SupabaseError) -> ApiError {
    match err {
        SupabaseError::Api {
            status, message, ..
        } if status < 500 => ApiError::Auth(message),
        other => other.into(),
    }
}

fn store_error(err: tower_sessions::session::Error) -> ApiError {
    ApiError::Backend(format!("session store: {}", err))
}
