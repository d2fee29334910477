//! Client for the backend's identity service.
//!
//! Sessions, OTP challenges and federated redirects are all owned by the
//! service; this client only shuttles requests and reports outcomes.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use url::Url;

use crate::error::SupabaseError;
use crate::models::{AuthErrorBody, Session, User};

const SERVICE: &str = "gotrue";

#[derive(Clone)]
pub struct Auth {
    base: Url,
    anon_key: String,
    http: reqwest::Client,
}

impl Auth {
    pub(crate) fn new(base: Url, anon_key: String, http: reqwest::Client) -> Self {
        Self {
            base,
            anon_key,
            http,
        }
    }

    fn headers(&self, access_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| SupabaseError::Decode("API key is not a valid header value".into()))?;
        headers.insert("apikey", apikey);
        if let Some(token) = access_token {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                SupabaseError::Decode("access token is not a valid header value".into())
            })?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    /// Password grant. Returns the issued session.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, SupabaseError> {
        let mut url = self.base.join("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        decode_session(response).await
    }

    /// Exchange a refresh token for a fresh session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, SupabaseError> {
        let mut url = self.base.join("token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        decode_session(response).await
    }

    /// Ask the service to send a one-time code to a phone number.
    pub async fn sign_in_with_otp(&self, phone: &str) -> Result<(), SupabaseError> {
        let url = self.base.join("otp")?;
        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "phone": phone, "create_user": true }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status.as_u16(), response).await);
        }
        Ok(())
    }

    /// Submit an OTP challenge response. A session is issued on success.
    pub async fn verify_otp(&self, phone: &str, token: &str) -> Result<Session, SupabaseError> {
        let url = self.base.join("verify")?;
        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "type": "sms", "phone": phone, "token": token }))
            .send()
            .await?;
        decode_session(response).await
    }

    /// URL to send the browser to for a federated-provider login. The
    /// outcome comes back through `redirect_to`, not a return value.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<Url, SupabaseError> {
        let mut url = self.base.join("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    /// Ask the service whether a token is still good, and for whom.
    pub async fn user(&self, access_token: &str) -> Result<User, SupabaseError> {
        let url = self.base.join("user")?;
        let response = self
            .http
            .get(url)
            .headers(self.headers(Some(access_token))?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status.as_u16(), response).await);
        }
        response
            .json()
            .await
            .map_err(|e| SupabaseError::Decode(format!("user payload: {}", e)))
    }

    /// Revoke a session server-side.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), SupabaseError> {
        let url = self.base.join("logout")?;
        let response = self
            .http
            .post(url)
            .headers(self.headers(Some(access_token))?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status.as_u16(), response).await);
        }
        Ok(())
    }

    /// Liveness probe for the identity service.
    pub async fn health(&self) -> Result<(), SupabaseError> {
        let url = self.base.join("health")?;
        let response = self
            .http
            .get(url)
            .headers(self.headers(None)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status.as_u16(), response).await);
        }
        Ok(())
    }

    /// Trigger the service's password-recovery mail.
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), SupabaseError> {
        let url = self.base.join("recover")?;
        let response = self
            .http
            .post(url)
            .headers(self.headers(None)?)
            .json(&json!({ "email": email }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(status.as_u16(), response).await);
        }
        Ok(())
    }
}

async fn decode_session(response: reqwest::Response) -> Result<Session, SupabaseError> {
    let status = response.status();
    if !status.is_success() {
        return Err(auth_error(status.as_u16(), response).await);
    }
    response
        .json()
        .await
        .map_err(|e| SupabaseError::Decode(format!("session payload: {}", e)))
}

async fn auth_error(status: u16, response: reqwest::Response) -> SupabaseError {
    let message = match response.json::<AuthErrorBody>().await {
        Ok(body) => body.into_message(),
        Err(_) => "unreadable error body".to_string(),
    };
    SupabaseError::Api {
        service: SERVICE,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_provider_and_redirect() {
        let auth = Auth::new(
            Url::parse("http://localhost:54321/auth/v1/").unwrap(),
            "anon".into(),
            reqwest::Client::new(),
        );
        let url = auth
            .authorize_url("google", "http://localhost:8080/auth/callback")
            .unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let query = url.query().unwrap();
        assert!(query.contains("provider=google"));
        assert!(query.contains("redirect_to=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fcallback"));
    }
}
