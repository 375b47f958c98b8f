//! Configuration management for erp-auth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Upper bound on the cosmetic post-login delay.
const MAX_CALLBACK_DELAY_MS: u64 = 10_000;

/// Main configuration structure for erp-auth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client and session settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// OAuth 2.0 client configuration for the console
///
/// `client_id` and the redirect URI are deliberately optional at load time:
/// their absence only matters once a login is attempted, where it is
/// reported as [`AuthError::Configuration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Browser-navigated authorization endpoint
    #[serde(default = "default_authorize_endpoint")]
    pub authorize_endpoint: String,

    /// Token endpoint for code exchange and refresh
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// Registered OAuth client identifier
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for the token endpoint's Basic authentication.  An
    /// empty secret is sent when unset.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Redirect URIs registered with the authorization server.  The one
    /// matching [`app_origin`](Self::app_origin) is preferred.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Origin the console is served from (the "current origin")
    #[serde(default)]
    pub app_origin: Option<String>,

    /// Space-separated scopes requested at login
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Login entry point inside the console
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Where to land after login when no return location was saved
    #[serde(default = "default_home_path")]
    pub home_path: String,

    /// Cosmetic pause between a successful callback and entering the app
    #[serde(default = "default_callback_delay_ms")]
    pub callback_delay_ms: u64,

    /// Authenticated "who am I" endpoint used by the organization guard
    #[serde(default = "default_whoami_url")]
    pub whoami_url: String,

    /// Keyring service name for the durable refresh token
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_authorize_endpoint() -> String {
    "http://localhost:9000/oauth2/authorize".to_string()
}

fn default_token_endpoint() -> String {
    "http://localhost:9000/oauth2/token".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_home_path() -> String {
    "/".to_string()
}

fn default_callback_delay_ms() -> u64 {
    1500
}

fn default_whoami_url() -> String {
    "http://localhost:8080/api/auth/me".to_string()
}

fn default_keyring_service() -> String {
    "erp-auth".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_endpoint: default_authorize_endpoint(),
            token_endpoint: default_token_endpoint(),
            client_id: None,
            client_secret: None,
            redirect_uris: Vec::new(),
            app_origin: None,
            scope: default_scope(),
            login_path: default_login_path(),
            home_path: default_home_path(),
            callback_delay_ms: default_callback_delay_ms(),
            whoami_url: default_whoami_url(),
            keyring_service: default_keyring_service(),
        }
    }
}

impl AuthConfig {
    /// Returns the post-login delay as a [`Duration`].
    pub fn callback_delay(&self) -> Duration {
        Duration::from_millis(self.callback_delay_ms)
    }

    /// Returns the client id, or a configuration error when it is unset.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when `client_id` is missing or
    /// blank.
    pub fn require_client_id(&self) -> std::result::Result<&str, AuthError> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Configuration("client_id is not configured".to_string()))
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Configuration(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AuthError::Configuration(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        let auth = &mut self.auth;

        if let Ok(endpoint) = std::env::var("ERP_AUTH_AUTHORIZE_ENDPOINT") {
            auth.authorize_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("ERP_AUTH_TOKEN_ENDPOINT") {
            auth.token_endpoint = endpoint;
        }
        if let Ok(client_id) = std::env::var("ERP_AUTH_CLIENT_ID") {
            auth.client_id = Some(client_id);
        }
        if let Ok(secret) = std::env::var("ERP_AUTH_CLIENT_SECRET") {
            auth.client_secret = Some(secret);
        }
        if let Ok(uris) = std::env::var("ERP_AUTH_REDIRECT_URIS") {
            auth.redirect_uris = uris
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(scope) = std::env::var("ERP_AUTH_SCOPE") {
            auth.scope = scope;
        }
        if let Ok(origin) = std::env::var("ERP_AUTH_APP_ORIGIN") {
            auth.app_origin = Some(origin);
        }
        if let Ok(url) = std::env::var("ERP_AUTH_WHOAMI_URL") {
            auth.whoami_url = url;
        }
        if let Ok(delay) = std::env::var("ERP_AUTH_CALLBACK_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => auth.callback_delay_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid ERP_AUTH_CALLBACK_DELAY_MS: {}", delay),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(client_id) = &cli.client_id {
            self.auth.client_id = Some(client_id.clone());
        }
        if let Some(origin) = &cli.origin {
            self.auth.app_origin = Some(origin.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any endpoint is not an absolute URL, the scope is
    /// empty, or the callback delay is out of range
    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;

        for (name, value) in [
            ("authorize_endpoint", &auth.authorize_endpoint),
            ("token_endpoint", &auth.token_endpoint),
            ("whoami_url", &auth.whoami_url),
        ] {
            Url::parse(value).map_err(|e| {
                AuthError::Configuration(format!("{} is not a valid URL ({}): {}", name, value, e))
            })?;
        }

        for uri in &auth.redirect_uris {
            Url::parse(uri).map_err(|e| {
                AuthError::Configuration(format!("Invalid redirect URI {}: {}", uri, e))
            })?;
        }

        if let Some(origin) = &auth.app_origin {
            Url::parse(origin).map_err(|e| {
                AuthError::Configuration(format!("Invalid app_origin {}: {}", origin, e))
            })?;
        }

        if auth.scope.trim().is_empty() {
            return Err(AuthError::Configuration("scope cannot be empty".to_string()).into());
        }

        if !auth.login_path.starts_with('/') || !auth.home_path.starts_with('/') {
            return Err(AuthError::Configuration(
                "login_path and home_path must be absolute paths".to_string(),
            )
            .into());
        }

        if auth.callback_delay_ms > MAX_CALLBACK_DELAY_MS {
            return Err(AuthError::Configuration(format!(
                "callback_delay_ms must be less than or equal to {}",
                MAX_CALLBACK_DELAY_MS
            ))
            .into());
        }

        Ok(())
    }
}
