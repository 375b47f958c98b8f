//! Login initiation
//!
//! Starting a login generates fresh PKCE material, saves the verifier and
//! `state` for the callback, and sends the user to the authorization
//! endpoint with:
//!
//! ```text
//! response_type=code
//! client_id=<configured>
//! redirect_uri=<resolved>
//! scope=<configured>
//! code_challenge=<S256 challenge>
//! code_challenge_method=S256
//! state=<nonce>
//! ```
//!
//! Configuration problems are reported before anything is written or any
//! navigation happens.

use std::sync::Arc;

use url::Url;

use crate::auth::navigation::{Destination, Navigator};
use crate::auth::pkce::PkceMaterial;
use crate::auth::token_store::TokenStore;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Path appended to the app origin when no redirect URI is configured.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Starts the authorization-code flow.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use erp_auth::auth::login::LoginInitiator;
/// use erp_auth::auth::navigation::{Destination, RecordingNavigator};
/// use erp_auth::auth::token_store::TokenStore;
/// use erp_auth::config::AuthConfig;
///
/// let mut config = AuthConfig::default();
/// config.client_id = Some("erp-console".to_string());
/// config.app_origin = Some("http://127.0.0.1:5173".to_string());
///
/// let store = Arc::new(TokenStore::in_memory());
/// let nav = Arc::new(RecordingNavigator::new());
/// let login = LoginInitiator::new(config, store, nav.clone());
///
/// let url = login.start_login().unwrap();
/// assert!(url.contains("code_challenge_method=S256"));
/// assert_eq!(nav.last(), Some(Destination::External(url)));
/// ```
pub struct LoginInitiator {
    config: AuthConfig,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl LoginInitiator {
    /// Creates an initiator for the given client configuration.
    pub fn new(config: AuthConfig, store: Arc<TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            config,
            store,
            navigator,
        }
    }

    /// Starts a login that returns to the home path afterwards.
    ///
    /// Returns the authorization URL the user was sent to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the client id or a redirect
    /// URI cannot be determined, or the authorization endpoint is not a URL.
    pub fn start_login(&self) -> Result<String, AuthError> {
        self.start_login_with_return(None)
    }

    /// Starts a login that resumes at `return_to` once it completes.
    ///
    /// `return_to` is only honored when it is a path inside the console;
    /// anything else falls back to the home path.
    ///
    /// # Errors
    ///
    /// Same as [`start_login`](Self::start_login).
    pub fn start_login_with_return(&self, return_to: Option<&str>) -> Result<String, AuthError> {
        let client_id = self.config.require_client_id()?;
        let redirect_uri = resolve_redirect_uri(&self.config)?;

        let pkce = PkceMaterial::generate();
        let url = build_authorization_url(
            &self.config.authorize_endpoint,
            client_id,
            &redirect_uri,
            &self.config.scope,
            &pkce.challenge,
            &pkce.state,
        )?;

        self.store
            .save_pending_authorization(&pkce.verifier, &pkce.state);
        let resume = sanitize_return_to(return_to, &self.config);
        self.store.set_post_login_path(&resume);

        tracing::info!("Starting login (redirect_uri={}, resume at {})", redirect_uri, resume);
        self.navigator.navigate(Destination::External(url.clone()));
        Ok(url)
    }
}

/// Chooses the redirect URI for the current origin.
///
/// Preference order: a configured URI on the same origin as
/// `app_origin`, then the first configured URI, then
/// `<app_origin>/callback`.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] when nothing is configured and no
/// origin is known.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::login::resolve_redirect_uri;
/// use erp_auth::config::AuthConfig;
///
/// let mut config = AuthConfig::default();
/// config.redirect_uris = vec![
///     "https://erp.example.com/callback".to_string(),
///     "http://127.0.0.1:5173/callback".to_string(),
/// ];
/// config.app_origin = Some("http://127.0.0.1:5173".to_string());
/// assert_eq!(
///     resolve_redirect_uri(&config).unwrap(),
///     "http://127.0.0.1:5173/callback"
/// );
/// ```
pub fn resolve_redirect_uri(config: &AuthConfig) -> Result<String, AuthError> {
    let origin = config
        .app_origin
        .as_deref()
        .and_then(|o| Url::parse(o).ok());

    if let Some(origin) = &origin {
        let wanted = origin.origin();
        let same_origin = config.redirect_uris.iter().find(|uri| {
            Url::parse(uri)
                .map(|u| u.origin() == wanted)
                .unwrap_or(false)
        });
        if let Some(uri) = same_origin {
            return Ok(uri.clone());
        }
    }

    if let Some(first) = config.redirect_uris.first() {
        return Ok(first.clone());
    }

    match origin {
        Some(origin) => Ok(format!(
            "{}{}",
            origin.origin().ascii_serialization(),
            DEFAULT_CALLBACK_PATH
        )),
        None => Err(AuthError::Configuration(
            "no redirect URI is configured and app_origin is unknown".to_string(),
        )),
    }
}

/// Builds the authorization request URL.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] when `endpoint` is not a URL.
pub fn build_authorization_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    code_challenge: &str,
    state: &str,
) -> Result<String, AuthError> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        AuthError::Configuration(format!("invalid authorization endpoint URL: {e}"))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", scope);
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");
        query.append_pair("state", state);
    }

    Ok(url.to_string())
}

/// Keeps `return_to` only when it is a path inside the console other than
/// the login page itself.
fn sanitize_return_to(return_to: Option<&str>, config: &AuthConfig) -> String {
    match return_to.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && path != config.login_path =>
        {
            path.to_string()
        }
        Some(other) => {
            tracing::debug!("Ignoring return location {:?}", other);
            config.home_path.clone()
        }
        None => config.home_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigation::RecordingNavigator;
    use crate::auth::pkce::generate_challenge;
    use std::collections::HashMap;

    fn configured() -> AuthConfig {
        AuthConfig {
            client_id: Some("erp-console".to_string()),
            app_origin: Some("http://127.0.0.1:5173".to_string()),
            authorize_endpoint: "https://auth.example.com/oauth2/authorize".to_string(),
            ..AuthConfig::default()
        }
    }

    fn query_of(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_start_login_saves_material_matching_url() {
        let store = Arc::new(TokenStore::in_memory());
        let nav = Arc::new(RecordingNavigator::new());
        let login = LoginInitiator::new(configured(), store.clone(), nav);

        let url = login.start_login().unwrap();
        let query = query_of(&url);
        let pending = store.take_pending_authorization();

        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "erp-console");
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:5173/callback");
        assert_eq!(query["scope"], "openid profile email");
        assert_eq!(query["state"], pending.state.unwrap());
        assert_eq!(
            query["code_challenge"],
            generate_challenge(&pending.verifier.unwrap())
        );
    }

    #[test]
    fn test_missing_client_id_writes_nothing() {
        let store = Arc::new(TokenStore::in_memory());
        let nav = Arc::new(RecordingNavigator::new());
        let mut config = configured();
        config.client_id = None;
        let login = LoginInitiator::new(config, store.clone(), nav.clone());

        assert!(matches!(
            login.start_login(),
            Err(AuthError::Configuration(_))
        ));
        assert_eq!(store.take_pending_authorization().state, None);
        assert!(nav.history().is_empty());
    }

    #[test]
    fn test_missing_redirect_and_origin_is_configuration_error() {
        let mut config = configured();
        config.app_origin = None;
        assert!(matches!(
            resolve_redirect_uri(&config),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_first_redirect_uri_used_when_none_matches_origin() {
        let mut config = configured();
        config.redirect_uris = vec!["https://erp.example.com/callback".to_string()];
        assert_eq!(
            resolve_redirect_uri(&config).unwrap(),
            "https://erp.example.com/callback"
        );
    }

    #[test]
    fn test_consecutive_logins_use_fresh_material() {
        let store = Arc::new(TokenStore::in_memory());
        let login = LoginInitiator::new(
            configured(),
            store.clone(),
            Arc::new(RecordingNavigator::new()),
        );

        login.start_login().unwrap();
        let first = store.take_pending_authorization();
        login.start_login().unwrap();
        let second = store.take_pending_authorization();

        assert_ne!(first.state, second.state);
        assert_ne!(first.verifier, second.verifier);
    }

    #[test]
    fn test_return_to_is_restricted_to_console_paths() {
        let config = configured();
        assert_eq!(sanitize_return_to(Some("/orders/7"), &config), "/orders/7");
        assert_eq!(sanitize_return_to(Some("//evil.example"), &config), "/");
        assert_eq!(sanitize_return_to(Some("https://evil.example"), &config), "/");
        assert_eq!(sanitize_return_to(Some("/login"), &config), "/");
        assert_eq!(sanitize_return_to(None, &config), "/");
    }

    #[test]
    fn test_return_to_is_remembered() {
        let store = Arc::new(TokenStore::in_memory());
        let login = LoginInitiator::new(
            configured(),
            store.clone(),
            Arc::new(RecordingNavigator::new()),
        );
        login.start_login_with_return(Some("/inventory")).unwrap();
        assert_eq!(store.take_post_login_path().as_deref(), Some("/inventory"));
    }
}
