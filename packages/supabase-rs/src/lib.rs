//! Hand-rolled client for a Supabase-style hosted backend.
//!
//! Three sub-services share one base URL and one public API key: the row API
//! (`/rest/v1/`), the identity service (`/auth/v1/`) and the realtime change
//! feed (`/realtime/v1/`). The client holds nothing but connection details;
//! every piece of state lives on the backend.

pub mod auth;
pub mod error;
pub mod models;
pub mod postgrest;
pub mod realtime;

pub use auth::Auth;
pub use error::SupabaseError;
pub use models::{Session, User};
pub use postgrest::{Order, Postgrest, QueryBuilder, RowsResponse};
pub use realtime::{ChangeEvent, ChangeKind, ChannelHandle, Realtime};

use url::Url;

#[derive(Debug, Clone)]
pub struct SupabaseOptions {
    /// Base URL of the hosted backend, e.g. `https://project.supabase.co`.
    pub url: String,
    /// The project's public (anon) API key.
    pub anon_key: String,
}

/// Entry point bundling the three sub-service clients.
#[derive(Clone)]
pub struct SupabaseClient {
    base: Url,
    options: SupabaseOptions,
    http: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(options: SupabaseOptions) -> Result<Self, SupabaseError> {
        // A trailing slash makes the sub-service joins behave.
        let normalized = if options.url.ends_with('/') {
            options.url.clone()
        } else {
            format!("{}/", options.url)
        };
        let base = Url::parse(&normalized)?;
        Ok(Self {
            base,
            options,
            http: reqwest::Client::new(),
        })
    }

    pub fn postgrest(&self) -> Result<Postgrest, SupabaseError> {
        let base = self.base.join("rest/v1/")?;
        Ok(Postgrest::new(
            base,
            self.options.anon_key.clone(),
            self.http.clone(),
        ))
    }

    /// Shorthand for starting a row query.
    pub fn from(&self, table: &str) -> Result<QueryBuilder, SupabaseError> {
        self.postgrest()?.from(table)
    }

    pub fn auth(&self) -> Result<Auth, SupabaseError> {
        let base = self.base.join("auth/v1/")?;
        Ok(Auth::new(
            base,
            self.options.anon_key.clone(),
            self.http.clone(),
        ))
    }

    pub fn realtime(&self) -> Result<Realtime, SupabaseError> {
        Realtime::new(&self.base, &self.options.anon_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = SupabaseClient::new(SupabaseOptions {
            url: "http://localhost:54321".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        assert_eq!(client.base.as_str(), "http://localhost:54321/");

        let client = SupabaseClient::new(SupabaseOptions {
            url: "http://localhost:54321/".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        assert_eq!(client.base.as_str(), "http://localhost:54321/");
    }

    #[test]
    fn rejects_garbage_urls() {
        assert!(SupabaseClient::new(SupabaseOptions {
            url: "not a url".into(),
            anon_key: "anon".into(),
        })
        .is_err());
    }
}
