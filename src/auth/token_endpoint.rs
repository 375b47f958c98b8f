//! Token endpoint client
//!
//! Both grants the console uses go through one endpoint with the same
//! framing: `POST application/x-www-form-urlencoded` with
//! `Authorization: Basic base64(client_id:client_secret)`.
//!
//! - Authorization-code grant: `grant_type=authorization_code`, `code`,
//!   `redirect_uri`, `code_verifier`.
//! - Refresh grant: `grant_type=refresh_token`, `refresh_token`.
//!
//! The response body is `{ "access_token": ..., "refresh_token"?: ... }`;
//! other fields are ignored.  Every failure, including transport errors, is
//! returned as an [`AuthError`] value rather than propagated raw.

use serde::Deserialize;

use crate::auth::token_store::TokenPair;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_pair(self) -> Result<TokenPair, AuthError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::MalformedResponse("response carries no access_token".to_string())
            })?;
        Ok(TokenPair {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

/// Client for the authorization server's token endpoint.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::token_endpoint::TokenEndpoint;
///
/// let endpoint = TokenEndpoint::new(
///     reqwest::Client::new(),
///     "https://auth.example.com/oauth2/token",
///     Some("erp-console".to_string()),
///     None,
/// );
/// assert_eq!(endpoint.url(), "https://auth.example.com/oauth2/token");
/// ```
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: reqwest::Client,
    url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl TokenEndpoint {
    /// Creates a client for `url` authenticating as `client_id`.
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            client_id,
            client_secret,
        }
    }

    /// Creates a client from the `auth` configuration section.
    pub fn from_config(http: reqwest::Client, config: &AuthConfig) -> Self {
        Self::new(
            http,
            config.token_endpoint.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exchanges an authorization code for a token pair.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] when no client id is configured.
    /// - [`AuthError::Exchange`] on a non-2xx response or transport failure.
    /// - [`AuthError::MalformedResponse`] when the body has no access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenPair, AuthError> {
        self.post(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_code`](Self::exchange_code).
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.post(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<TokenPair, AuthError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Configuration("client_id is not configured".to_string()))?;

        let resp = self
            .http
            .post(&self.url)
            .basic_auth(client_id, Some(self.client_secret.as_deref().unwrap_or("")))
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Exchange {
                status: None,
                message: format!("token endpoint unreachable: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request rejected").to_string()
            } else {
                body
            };
            return Err(AuthError::Exchange {
                status: Some(status.as_u16()),
                message,
            });
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(format!("unreadable token response: {e}")))?;

        raw.into_pair()
    }
}
