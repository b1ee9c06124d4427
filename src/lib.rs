//! mei-friend-web - Web front-end for the mei-friend editor
//!
//! Serves the editor shell and signs users in with GitHub so the
//! browser-side git client can commit on their behalf.
//!
//! # Request flow
//!
//! ```text
//! GET /login ──► github.com/login/oauth/authorize
//!                        │
//! GET /authorize ◄───────┘  code + state
//!     ├─ POST access_token (code → token)
//!     ├─ GET  /user        (token → profile)
//!     └─ Set-Cookie: session (signed)  ──► redirect to root
//!
//! GET /        renders logged-in or logged-out shell from the cookie
//! GET /logout  clears the cookie
//! ```
//!
//! # Modules
//!
//! - `api`: page and metrics handlers
//! - `auth`: GitHub OAuth flow, session cookie, extractors
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request; everything inside is
/// immutable after startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// GitHub client; `None` when OAuth credentials are not configured
    pub github: Option<Arc<auth::GitHubClient>>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the
    /// GitHub endpoints are invalid
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // GitHub's REST API rejects requests without a User-Agent.
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("mei-friend-web/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github = auth::GitHubClient::from_config(&config.github, http_client)?;
        match &github {
            Some(client) => tracing::info!(client_id = %client.client_id(), "GitHub OAuth enabled"),
            None => tracing::info!("GitHub OAuth disabled"),
        }

        Ok(Self {
            config: Arc::new(config),
            github: github.map(Arc::new),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower::ServiceBuilder;
    use tower_http::{
        compression::CompressionLayer, services::ServeDir, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::pages_router())
        .merge(auth::auth_router())
        .merge(api::metrics_router(state.clone()))
        .nest_service("/static", static_files)
        .layer(middleware::from_fn(metrics::track_http_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer),
        )
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
