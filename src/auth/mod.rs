//! GitHub OAuth authentication
//!
//! Handles:
//! - GitHub OAuth flow
//! - Session management
//! - Authentication middleware

pub mod github;
mod middleware;
mod oauth;
pub mod session;

pub use github::{AccessToken, GitHubClient, GitHubUser};
pub use middleware::{MaybeUser, require_auth};
pub use oauth::{OAUTH_STATE_COOKIE, auth_router};
pub use session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};
