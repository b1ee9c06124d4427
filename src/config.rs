//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (MEI_FRIEND__*)
//! 4. Flat environment variables used by existing deployments
//!    (CLIENT_ID, SECRET_ID, REDIRECT_URL, ROOT_URL, SECRET_KEY, PORT)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 5001)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "mei-friend.example.org")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Directory served under /static
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://mei-friend.example.org"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// GitHub OAuth configuration
///
/// Client id and secret are optional: without them the editor still
/// works, only the git integration is disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Overrides the callback URL sent to GitHub
    pub redirect_url: Option<String>,
    /// Overrides where the browser lands after login and logout
    pub root_url: Option<String>,
    /// Requested OAuth scopes (space separated)
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    /// REST API base, with trailing slash
    pub api_base_url: String,
    /// Domain of the derived commit email (`login@<domain>`)
    pub noreply_domain: String,
}

impl GitHubConfig {
    /// Whether both OAuth credentials are present
    pub fn is_enabled(&self) -> bool {
        non_empty(&self.client_id).is_some() && non_empty(&self.client_secret).is_some()
    }

    /// Where to send the browser after login or logout
    pub fn post_auth_redirect(&self) -> String {
        non_empty(&self.root_url)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "/".to_string())
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for the session cookie (32+ bytes)
    pub secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub max_age: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Flat variable names and the keys they populate
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("CLIENT_ID", "github.client_id"),
    ("SECRET_ID", "github.client_secret"),
    ("REDIRECT_URL", "github.redirect_url"),
    ("ROOT_URL", "github.root_url"),
    ("SECRET_KEY", "session.secret"),
    ("PORT", "server.port"),
];

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (MEI_FRIEND__*)
    /// 5. Flat environment variables (CLIENT_ID, SECRET_ID, ...)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5001)?
            .set_default("server.domain", "localhost:5001")?
            .set_default("server.protocol", "http")?
            .set_default("server.static_dir", "static")?
            .set_default("github.scope", "repo user")?
            .set_default(
                "github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("github.api_base_url", "https://api.github.com/")?
            .set_default("github.noreply_domain", "users.noreply.github.com")?
            .set_default("session.max_age", 604800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (MEI_FRIEND__*)
            .add_source(
                Environment::with_prefix("MEI_FRIEND")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config = builder
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    /// Callback URL registered with GitHub
    pub fn oauth_redirect_uri(&self) -> String {
        non_empty(&self.github.redirect_url)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("{}/authorize", self.server.base_url()))
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "session.max_age must be greater than 0".to_string(),
            ));
        }

        let has_id = non_empty(&self.github.client_id).is_some();
        let has_secret = non_empty(&self.github.client_secret).is_some();
        if has_id != has_secret {
            return Err(crate::error::AppError::Config(
                "github.client_id and github.client_secret must be set together".to_string(),
            ));
        }

        for (key, value) in [
            ("github.authorize_url", &self.github.authorize_url),
            ("github.token_url", &self.github.token_url),
            ("github.api_base_url", &self.github.api_base_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                crate::error::AppError::Config(format!("{key} is not a valid URL: {e}"))
            })?;
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https")
        {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Log settings that are valid but worth noticing
    ///
    /// Called once the subscriber from `logging` is installed.
    pub fn log_warnings(&self) {
        if !self.github.is_enabled() {
            tracing::warn!("GitHub OAuth credentials not set; git integration disabled");
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        }
    }

    /// Default `EnvFilter` directive built from `logging.level`
    pub fn log_filter(&self) -> String {
        format!("mei_friend_web={},tower_http=info", self.logging.level)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
