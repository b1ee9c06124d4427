//! GitHub OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::RngCore;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::session::{SESSION_COOKIE, Session, create_session_token};
use crate::AppState;
use crate::error::{AppError, Result};
use crate::metrics::{AUTHORIZATIONS_TOTAL, LOGIN_REDIRECTS_TOTAL, LOGOUTS_TOTAL};

/// Cookie holding the CSRF state between /login and /authorize
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Create authentication router
///
/// Routes:
/// - GET /login - Redirect to GitHub
/// - GET /authorize - OAuth callback
/// - GET /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/authorize", get(authorize))
        .route("/logout", get(logout))
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /login
///
/// Redirects user to GitHub authorization page.
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in cookie
/// 3. Redirect to GitHub with client_id, redirect_uri, scope, state
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let github = state.github.as_ref().ok_or(AppError::NotConfigured)?;

    let redirect_uri = state.config.oauth_redirect_uri();
    let csrf_state = generate_csrf_state();
    let location = github.authorize_url(&redirect_uri, &csrf_state);

    let cookie = build_cookie(
        OAUTH_STATE_COOKIE,
        csrf_state,
        state.config.should_use_secure_cookies(),
    );

    LOGIN_REDIRECTS_TOTAL.inc();
    tracing::debug!(%redirect_uri, "Redirecting to GitHub for authorization");

    Ok((jar.add(cookie), Redirect::to(location.as_str())))
}

/// Query parameters from GitHub callback
#[derive(Debug, Deserialize)]
struct AuthorizeQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set by GitHub when the user denies access
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /authorize
///
/// Handles OAuth callback from GitHub.
///
/// # Steps
/// 1. Verify CSRF state
/// 2. Exchange code for access token
/// 3. Fetch user info from GitHub
/// 4. Create session and set cookie
/// 5. Redirect to root
async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let result = complete_authorization(&state, query, &jar).await;
    let status = match &result {
        Ok(_) => "success",
        Err(_) => "failure",
    };
    AUTHORIZATIONS_TOTAL.with_label_values(&[status]).inc();

    let session = result?;
    let token = create_session_token(&session, &state.config.session.secret)?;
    let secure = state.config.should_use_secure_cookies();

    tracing::info!(login = %session.login, "User signed in with GitHub");

    let jar = jar
        .remove(removal_cookie(OAUTH_STATE_COOKIE))
        .add(build_cookie(SESSION_COOKIE, token, secure));

    Ok((
        jar,
        Redirect::to(&state.config.github.post_auth_redirect()),
    ))
}

async fn complete_authorization(
    state: &AppState,
    query: AuthorizeQuery,
    jar: &CookieJar,
) -> Result<Session> {
    let github = state.github.as_ref().ok_or(AppError::NotConfigured)?;

    if let Some(error) = query.error {
        tracing::info!(%error, "GitHub authorization was not granted");
        return Err(AppError::OAuth(match query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        }));
    }

    verify_csrf_state(query.state.as_deref(), jar)?;

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

    let redirect_uri = state.config.oauth_redirect_uri();
    let token = github.exchange_code(&code, &redirect_uri).await?;
    let user = github.fetch_user(&token).await?;

    tracing::debug!(login = %user.login, id = user.id, scope = ?token.scope, "Fetched GitHub profile");

    Ok(Session::new(
        token.access_token,
        user,
        &state.config.github.noreply_domain,
        state.config.session.max_age,
    ))
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Clears session cookies and redirects to root.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    LOGOUTS_TOTAL.inc();
    tracing::info!("User signed out");

    let jar = jar
        .remove(removal_cookie(SESSION_COOKIE))
        .remove(removal_cookie(OAUTH_STATE_COOKIE));

    (jar, Redirect::to(&state.config.github.post_auth_redirect()))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    use base64::Engine as _;

    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(state: Option<&str>, jar: &CookieJar) -> Result<()> {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .ok_or(AppError::Unauthorized)?;

    match state {
        Some(state) if bool::from(state.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        _ => {
            tracing::warn!("OAuth state mismatch");
            Err(AppError::Unauthorized)
        }
    }
}

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}
