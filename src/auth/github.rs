//! GitHub OAuth and REST client
//!
//! Only the three calls the sign-in flow needs: building the authorize
//! URL, exchanging a code for a token, and reading the user profile.

use http::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use url::Url;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::metrics::GITHUB_REQUEST_DURATION_SECONDS;

/// Access token returned by the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token endpoint body; GitHub answers 200 with `error` on failure
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub user info
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
}

/// Configured client for one GitHub instance
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client_id: String,
    client_secret: String,
    scope: String,
    authorize_url: Url,
    token_url: Url,
    api_base_url: Url,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Build a client, or `None` when OAuth credentials are missing
    pub fn from_config(
        config: &GitHubConfig,
        http: reqwest::Client,
    ) -> Result<Option<Self>> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret)
        else {
            return Ok(None);
        };

        let parse = |key: &str, value: &str| {
            Url::parse(value)
                .map_err(|e| AppError::Config(format!("github.{key} is not a valid URL: {e}")))
        };

        let mut api_base_url = parse("api_base_url", &config.api_base_url)?;
        // Url::join drops the last segment unless the base ends in '/'.
        if !api_base_url.path().ends_with('/') {
            let path = format!("{}/", api_base_url.path());
            api_base_url.set_path(&path);
        }

        Ok(Some(Self {
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
            scope: config.scope.clone(),
            authorize_url: parse("authorize_url", &config.authorize_url)?,
            token_url: parse("token_url", &config.token_url)?,
            api_base_url,
            http,
        }))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// URL the browser is sent to for consent
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        url
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    /// `OAuth` when GitHub rejects the code, `Upstream`/`HttpClient`
    /// when the endpoint misbehaves
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken> {
        let timer = GITHUB_REQUEST_DURATION_SECONDS
            .with_label_values(&["exchange_code"])
            .start_timer();

        let response = self
            .http
            .post(self.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        timer.observe_duration();

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or_default();
            tracing::warn!(%error, %detail, "GitHub rejected authorization code");
            return Err(AppError::OAuth(if detail.is_empty() {
                error
            } else {
                format!("{error}: {detail}")
            }));
        }

        match body.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(AccessToken {
                access_token,
                scope: body.scope,
            }),
            _ => Err(AppError::Upstream(
                "token endpoint response had no access_token".to_string(),
            )),
        }
    }

    /// Fetch the profile of the token's owner (`GET /user`)
    pub async fn fetch_user(&self, token: &AccessToken) -> Result<GitHubUser> {
        let url = self
            .api_base_url
            .join("user")
            .map_err(|e| AppError::Internal(e.into()))?;

        let timer = GITHUB_REQUEST_DURATION_SECONDS
            .with_label_values(&["fetch_user"])
            .start_timer();

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {}", token.access_token))
            .send()
            .await?;
        timer.observe_duration();

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "user endpoint returned {status}"
            )));
        }

        Ok(response.json().await?)
    }
}
