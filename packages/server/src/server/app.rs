//! Application setup and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    response::Redirect,
    routing::{get, post},
    Router,
};
use supabase::{SupabaseClient, SupabaseOptions};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::provider::{DataProvider, LiveProvider};
use crate::server::guard::{route_guard, DEFAULT_RESOURCE_PATH};
use crate::server::routes::{auth, blog_posts, categories, health, stream};
use crate::session::SessionService;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: DataProvider,
    pub live: Arc<LiveProvider>,
    pub sessions: SessionService,
    pub supabase: SupabaseClient,
}

async fn root_redirect() -> Redirect {
    Redirect::to(DEFAULT_RESOURCE_PATH)
}

/// Build the Axum application router
///
/// Also spawns the relay housekeeping task that closes idle upstream
/// change-feed channels.
pub fn build_app(config: &Config) -> anyhow::Result<Router> {
    let client = SupabaseClient::new(SupabaseOptions {
        url: config.supabase_url.clone(),
        anon_key: config.supabase_anon_key.clone(),
    })?;

    let provider = DataProvider::new(client.clone());
    let live = Arc::new(LiveProvider::new(client.realtime()?));
    let sessions = SessionService::new(client.auth()?, &config.public_url);

    let app_state = AppState {
        provider,
        live: live.clone(),
        sessions,
        supabase: client,
    };

    // Relay housekeeping: close upstream channels once their last
    // subscriber is gone.
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tick.tick().await;
            live.housekeeping().await;
        }
    });

    // Browser-session cookie store: the only local cache, gone when the
    // browser session ends.
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.cookie_secure)
        .with_expiry(Expiry::OnSessionEnd);

    // CORS: wide open in development, explicit origins when configured.
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true)
    };

    // Rate limiting on the auth surface to slow down credential guessing.
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(50)
            .use_headers()
            .finish()
            .expect("Rate limiter configuration is valid and should never fail"),
    );
    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config,
    };

    let auth_routes = Router::new()
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/verifyotp", post(auth::verify_otp))
        .route("/auth/refresh", post(auth::refresh))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/logout", post(auth::logout))
        .route_layer(rate_limit_layer);

    let resource_routes = Router::new()
        .route(
            "/blog-posts",
            get(blog_posts::list).post(blog_posts::create),
        )
        .route(
            "/blog-posts/:id",
            get(blog_posts::show)
                .patch(blog_posts::update)
                .delete(blog_posts::destroy),
        )
        .route(
            "/categories",
            get(categories::list).post(categories::create),
        )
        .route(
            "/categories/:id",
            get(categories::show)
                .patch(categories::update)
                .delete(categories::destroy),
        );

    let app = Router::new()
        .route("/", get(root_redirect))
        .route("/auth/callback", get(auth::callback))
        .route("/health", get(health::health_handler))
        .route("/streams/:resource", get(stream::stream_handler))
        .merge(auth_routes)
        .merge(resource_routes)
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(route_guard))
        .layer(session_layer)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
