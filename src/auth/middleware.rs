//! Authentication middleware
//!
//! Protects routes that require authentication.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::{SESSION_COOKIE, Session, verify_session_token};
use crate::AppState;
use crate::error::AppError;

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}

fn authenticate_token(token: &str, state: &AppState) -> Result<Session, AppError> {
    verify_session_token(token, &state.config.session.secret).inspect_err(|error| {
        tracing::debug!(%error, "Ignoring invalid session cookie");
    })
}

/// Middleware to require authentication
///
/// Extracts and verifies session from cookie.
/// Adds Session to request extensions if valid.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;

    let session = authenticate_token(&token, &state)?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
/// A tampered or expired cookie reads as logged out.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(MaybeUser(Some(session)));
        }

        let app_state = AppState::from_ref(state);
        let session = extract_token_from_headers(&parts.headers)
            .and_then(|token| authenticate_token(&token, &app_state).ok());

        if let Some(session) = &session {
            parts.extensions.insert(session.clone());
        }

        Ok(MaybeUser(session))
    }
}
