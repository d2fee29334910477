//! Test harness: one stub backend plus one admin service per test.
//!
//! The hosted backend is an HTTP service, so tests stub it in-process
//! instead of running containers; every test gets a fresh pair, which keeps
//! table state and session state isolated between tests.

use std::net::SocketAddr;

use admin_core::{server::build_app, Config};

use super::stub::{StubBackend, VALID_EMAIL, VALID_PASSWORD};

pub struct TestHarness {
    /// The stub hosted backend; use it to mint tokens or emit change frames.
    pub stub: StubBackend,
    addr: SocketAddr,
}

impl TestHarness {
    pub async fn new() -> Self {
        // Respect RUST_LOG when debugging tests; ignore double-init.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let stub = StubBackend::spawn().await;

        let config = Config {
            supabase_url: stub.base_url(),
            supabase_anon_key: "test-anon-key".to_string(),
            port: 0,
            public_url: "http://localhost:8080".to_string(),
            allowed_origins: Vec::new(),
            cookie_secure: false,
        };

        let app = build_app(&config).expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("admin service should bind");
        let addr = listener.local_addr().expect("admin service has an address");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("admin service serves");
        });

        Self { stub, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Client that keeps cookies and follows no redirects, so tests can
    /// observe the guard's decisions directly.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("client builds")
    }

    /// Client already signed in with the stub's known credentials.
    pub async fn signed_in_client(&self) -> reqwest::Client {
        let client = self.client();
        let response = client
            .post(self.url("/login"))
            .json(&serde_json::json!({
                "email": VALID_EMAIL,
                "password": VALID_PASSWORD,
            }))
            .send()
            .await
            .expect("login request");
        assert!(
            response.status().is_success(),
            "login failed: {}",
            response.status()
        );
        client
    }
}
