use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub port: u16,
    /// Externally reachable base URL of this service; federated logins
    /// redirect back to `{public_url}/auth/callback`.
    pub public_url: String,
    pub allowed_origins: Vec<String>,
    pub cookie_secure: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL").context("SUPABASE_URL must be set")?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .context("SUPABASE_ANON_KEY must be set")?,
            port,
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            cookie_secure: env::var("COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}
