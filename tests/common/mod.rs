//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use mei_friend_web::{AppState, config};
use serde::Deserialize;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const GOOD_CODE: &str = "good-code";
pub const ACCESS_TOKEN: &str = "gho_test_token";
pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Requests seen by the mock token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: Option<String>,
}

/// Stand-in for github.com and api.github.com
pub struct MockGitHub {
    pub addr: String,
    pub token_requests: Arc<Mutex<Vec<TokenRequest>>>,
    revoked: Arc<AtomicBool>,
}

#[derive(Clone)]
struct MockState {
    profile_name: Option<String>,
    token_requests: Arc<Mutex<Vec<TokenRequest>>>,
    revoked: Arc<AtomicBool>,
}

impl MockGitHub {
    /// Start a mock whose `/user` reports `profile_name` as the display name
    pub async fn start(profile_name: Option<&str>) -> Self {
        let token_requests = Arc::new(Mutex::new(Vec::new()));
        let revoked = Arc::new(AtomicBool::new(false));
        let state = MockState {
            profile_name: profile_name.map(ToString::to_string),
            token_requests: token_requests.clone(),
            revoked: revoked.clone(),
        };

        let app = Router::new()
            .route("/login/oauth/access_token", post(mock_access_token))
            .route("/api/user", get(mock_user))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            token_requests,
            revoked,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Make `/user` answer 401 even for the issued token
    pub fn revoke_tokens(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }
}

async fn mock_access_token(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> impl IntoResponse {
    assert_eq!(
        headers.get("accept").and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    state.token_requests.lock().unwrap().push(request.clone());

    if request.client_id != CLIENT_ID || request.client_secret != CLIENT_SECRET {
        return Json(json!({
            "error": "incorrect_client_credentials",
            "error_description": "The client_id and/or client_secret passed are incorrect."
        }));
    }
    if request.code != GOOD_CODE {
        return Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }));
    }

    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "scope": "repo,user"
    }))
}

async fn mock_user(State(state): State<MockState>, headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {ACCESS_TOKEN}").as_str());
    if !authorized || state.revoked.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Bad credentials" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "login": "octocat",
            "id": 583231,
            "name": state.profile_name,
            "email": null
        })),
    )
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: MockGitHub,
    pub static_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Server with GitHub sign-in pointed at a mock
    pub async fn new() -> Self {
        Self::with_config(Some("The Octocat"), |_| {}).await
    }

    /// Server whose config can be adjusted before startup
    pub async fn with_config(
        profile_name: Option<&str>,
        customize: impl FnOnce(&mut config::AppConfig),
    ) -> Self {
        let github = MockGitHub::start(profile_name).await;

        let static_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(static_dir.path().join("lib")).unwrap();
        std::fs::write(
            static_dir.path().join("lib/main.js"),
            "export const version = '0.0.0';\n",
        )
        .unwrap();

        // Bind first so the public domain carries the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
                static_dir: static_dir.path().to_path_buf(),
            },
            github: config::GitHubConfig {
                client_id: Some(CLIENT_ID.to_string()),
                client_secret: Some(CLIENT_SECRET.to_string()),
                redirect_url: None,
                root_url: None,
                scope: "repo user".to_string(),
                authorize_url: github.url("/login/oauth/authorize"),
                token_url: github.url("/login/oauth/access_token"),
                api_base_url: github.url("/api/"),
                noreply_domain: "users.noreply.github.com".to_string(),
            },
            session: config::SessionConfig {
                secret: SESSION_SECRET.to_string(),
                max_age: 604800,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        customize(&mut config);

        let state = AppState::new(config).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = mei_friend_web::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            static_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Run /login then /authorize with the mock's good code
    ///
    /// Returns the `session=...` cookie pair.
    pub async fn sign_in(&self) -> String {
        let login = self.client.get(self.url("/login")).send().await.unwrap();
        assert_eq!(login.status(), StatusCode::SEE_OTHER);

        let state_cookie = cookie_pair(&login, "oauth_state").expect("oauth_state cookie");
        let state = query_param(&location(&login), "state").expect("state parameter");

        let callback = self
            .client
            .get(self.url("/authorize"))
            .query(&[("code", GOOD_CODE), ("state", state.as_str())])
            .header("Cookie", state_cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(callback.status(), StatusCode::SEE_OTHER);

        cookie_pair(&callback, "session").expect("session cookie")
    }

    /// GET `path` with an optional Cookie header and return the body
    pub async fn get_text(&self, path: &str, cookie: Option<&str>) -> (StatusCode, String) {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }
}

/// Location header of a redirect response
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Query parameter of an absolute URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Raw Set-Cookie header for `name`
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(ToString::to_string)
}

/// `name=value` pair from a Set-Cookie header, ready for a Cookie header
pub fn cookie_pair(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookie(response, name).and_then(|raw| raw.split(';').next().map(ToString::to_string))
}
