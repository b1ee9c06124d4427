//! HTML pages
//!
//! - GET / - editor shell, with the login state injected for the client
//! - GET /help - static help page

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
};
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::{MaybeUser, Session};

/// Create pages router
pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/help", get(help))
}

/// GET /
async fn index(State(state): State<AppState>, MaybeUser(session): MaybeUser) -> impl IntoResponse {
    Html(render_index(session.as_ref(), state.github.is_some()))
}

/// GET /help
async fn help() -> impl IntoResponse {
    Html(HELP_PAGE)
}

/// Variables read by the editor's JavaScript on startup
fn client_globals(session: Option<&Session>, git_enabled: bool) -> Vec<(&'static str, Value)> {
    match session {
        Some(session) => vec![
            ("isLoggedIn", json!(true)),
            ("githubToken", json!(session.access_token)),
            ("userLogin", json!(session.login)),
            ("userName", json!(session.display_name())),
            ("userEmail", json!(session.email)),
            ("gitEnabled", json!(git_enabled)),
        ],
        None => vec![
            ("isLoggedIn", json!(false)),
            ("gitEnabled", json!(git_enabled)),
        ],
    }
}

/// JSON that is safe inside a `<script>` element
fn script_json(value: &Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

pub(crate) fn render_index(session: Option<&Session>, git_enabled: bool) -> String {
    let globals = client_globals(session, git_enabled)
        .iter()
        .map(|(name, value)| format!("    var {} = {};", name, script_json(value)))
        .collect::<Vec<_>>()
        .join("\n");

    let account = match session {
        Some(session) => format!(
            r#"<span id="loginStatus" data-state="logged-in">Logged in as <strong>{}</strong> ({})</span>
      <a href="/logout">Log out</a>"#,
            html_escape::encode_text(session.display_name()),
            html_escape::encode_text(&session.login),
        ),
        None if git_enabled => r#"<span id="loginStatus" data-state="logged-out">Not logged in</span>
      <a href="/login">Log in with GitHub</a>"#
            .to_string(),
        None => r#"<span id="loginStatus" data-state="logged-out">Not logged in</span>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>mei-friend</title>
  <script>
{}
  </script>
</head>
<body>
  <header>
    <nav>
      <a href="/help">Help</a>
      {}
    </nav>
  </header>
  <main id="editor"></main>
  <script type="module" src="/static/lib/main.js"></script>
</body>
</html>"#,
        globals, account,
    )
}

const HELP_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Help - mei-friend</title>
</head>
<body>
  <h1>mei-friend help</h1>
  <h2>Working with GitHub</h2>
  <p>
    Choose <a href="/login">Log in with GitHub</a> to open, edit and commit MEI files
    stored in your GitHub repositories. mei-friend asks for the <code>repo</code> and
    <code>user</code> scopes so it can read and write repository contents on your behalf.
  </p>
  <p>
    Commits are attributed to your GitHub name and your private
    <code>users.noreply.github.com</code> address.
  </p>
  <h2>Signing out</h2>
  <p>
    <a href="/logout">Log out</a> clears your session on this server. To end your GitHub
    session as well, sign out on github.com.
  </p>
  <p><a href="/">Back to the editor</a></p>
</body>
</html>"#;
