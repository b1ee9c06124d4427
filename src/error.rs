//! Error types for mei-friend-web
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Handlers return this and let axum turn it into a response.
/// Nothing is retried; upstream failures surface as 502.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Session signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identity provider answered with an OAuth error (400)
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// GitHub sign-in is not configured on this server (503)
    #[error("GitHub sign-in is not configured")]
    NotConfigured,

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Unexpected response from GitHub (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Status code and metric label for this error
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::OAuth(_) => (StatusCode::BAD_REQUEST, "oauth"),
            AppError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "http_client"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encryption"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.classify();
        let error_message = match &self {
            AppError::Validation(msg) | AppError::OAuth(msg) | AppError::Upstream(msg) => {
                msg.clone()
            }
            AppError::Internal(_) | AppError::Config(_) | AppError::Encryption(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "Returning error response");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
