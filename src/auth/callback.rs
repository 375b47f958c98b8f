//! Completion of the authorization-code flow
//!
//! The authorization server redirects back with `?code=...&state=...`.
//! [`CallbackHandler`] walks that redirect through a fixed sequence of
//! states:
//!
//! ```text
//! Arriving -> ValidatingState -> ExchangingCode -> Success
//!                    |                  |
//!                    +------------------+--------> Failed
//! ```
//!
//! The saved verifier and `state` are consumed on arrival whatever the
//! outcome, so replaying a callback always fails.  A `state` mismatch ends
//! the attempt before the token endpoint is contacted.

use std::sync::Arc;

use url::Url;

use crate::auth::login::resolve_redirect_uri;
use crate::auth::navigation::{Destination, Navigator};
use crate::auth::profile::sync_from_token;
use crate::auth::token_endpoint::TokenEndpoint;
use crate::auth::token_store::TokenStore;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Where a callback is in its lifecycle.
#[derive(Debug)]
pub enum CallbackState {
    /// The redirect has been received but not inspected.
    Arriving,
    /// Comparing the returned `state` with the saved one.
    ValidatingState,
    /// Redeeming the code at the token endpoint.
    ExchangingCode,
    /// Tokens stored; the user is about to enter the application.
    Success,
    /// Terminal failure.  The user must start a new login.
    Failed(AuthError),
}

impl CallbackState {
    /// Short name of the state, for logs and status lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arriving => "arriving",
            Self::ValidatingState => "validating_state",
            Self::ExchangingCode => "exchanging_code",
            Self::Success => "success",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns `true` for [`CallbackState::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the failure, if the callback failed.
    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Parameters read from the redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed `state`.
    pub state: Option<String>,
    /// OAuth `error` code, when the server refused the request.
    pub error: Option<String>,
    /// Human-readable `error_description`.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parses a full redirect URL, a request target (`/callback?...`), or a
    /// bare query string.  Empty values read as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use erp_auth::auth::callback::CallbackParams;
    ///
    /// let p = CallbackParams::parse("/callback?code=abc&state=x%2By");
    /// assert_eq!(p.code.as_deref(), Some("abc"));
    /// assert_eq!(p.state.as_deref(), Some("x+y"));
    ///
    /// let p = CallbackParams::parse("https://erp.example.com/callback?state=s");
    /// assert!(p.code.is_none());
    /// ```
    pub fn parse(input: &str) -> Self {
        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or("").to_string(),
            Err(_) => match input.split_once('?') {
                Some((_, q)) => q.to_string(),
                None => input.trim_start_matches('?').to_string(),
            },
        };
        let query = query.split('#').next().unwrap_or("");

        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

type Observer = Box<dyn Fn(&CallbackState) + Send + Sync>;

/// Drives one redirect from the authorization server to a session.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use erp_auth::auth::callback::CallbackHandler;
/// use erp_auth::auth::navigation::BrowserNavigator;
/// use erp_auth::auth::token_endpoint::TokenEndpoint;
/// use erp_auth::auth::token_store::TokenStore;
/// use erp_auth::config::AuthConfig;
///
/// # async fn example() {
/// let config = AuthConfig::default();
/// let endpoint = TokenEndpoint::from_config(reqwest::Client::new(), &config);
/// let handler = CallbackHandler::new(
///     config,
///     endpoint,
///     Arc::new(TokenStore::in_memory()),
///     Arc::new(BrowserNavigator),
/// );
/// let state = handler.handle("/callback?code=abc&state=xyz").await;
/// println!("callback ended in {}", state.name());
/// # }
/// ```
pub struct CallbackHandler {
    config: AuthConfig,
    endpoint: TokenEndpoint,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    observer: Option<Observer>,
}

impl CallbackHandler {
    /// Creates a handler.
    pub fn new(
        config: AuthConfig,
        endpoint: TokenEndpoint,
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            endpoint,
            store,
            navigator,
            observer: None,
        }
    }

    /// Registers a callback invoked on every state transition.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&CallbackState) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Processes the redirect in `url_or_query` and returns the terminal
    /// state.
    ///
    /// On success the user is sent to the remembered post-login location
    /// (or the home path) after the configured cosmetic delay.  On failure
    /// nothing is navigated; the caller renders the error.
    pub async fn handle(&self, url_or_query: &str) -> CallbackState {
        self.enter(CallbackState::Arriving);
        let params = CallbackParams::parse(url_or_query);
        let pending = self.store.take_pending_authorization();

        self.enter(CallbackState::ValidatingState);
        let returned = params.state.as_deref().unwrap_or("");
        match pending.state.as_deref() {
            Some(saved) if !returned.is_empty() && saved == returned => {}
            Some(_) => {
                return self.fail(AuthError::CsrfValidation(
                    "returned state does not match the login that was started".to_string(),
                ));
            }
            None => {
                return self.fail(AuthError::CsrfValidation(
                    "no login is in progress for this callback".to_string(),
                ));
            }
        }

        if let Some(error) = params.error {
            let detail = params.error_description.unwrap_or_default();
            return self.fail(AuthError::InvalidCallback(if detail.is_empty() {
                format!("authorization server returned {error}")
            } else {
                format!("authorization server returned {error}: {detail}")
            }));
        }

        let Some(code) = params.code else {
            return self.fail(AuthError::InvalidCallback(
                "callback carries no authorization code".to_string(),
            ));
        };
        let Some(verifier) = pending.verifier else {
            return self.fail(AuthError::InvalidCallback(
                "saved PKCE verifier is missing".to_string(),
            ));
        };
        let redirect_uri = match resolve_redirect_uri(&self.config) {
            Ok(uri) => uri,
            Err(e) => return self.fail(e),
        };

        self.enter(CallbackState::ExchangingCode);
        let pair = match self
            .endpoint
            .exchange_code(&code, &redirect_uri, &verifier)
            .await
        {
            Ok(pair) => pair,
            Err(e) => return self.fail(e),
        };

        self.store.store_pair(&pair);
        sync_from_token(&self.store, Some(&pair.access_token), None);
        self.enter(CallbackState::Success);
        tracing::info!("Login completed");

        let destination = self
            .store
            .take_post_login_path()
            .unwrap_or_else(|| self.config.home_path.clone());
        tokio::time::sleep(self.config.callback_delay()).await;
        self.navigator.navigate(Destination::App(destination));

        CallbackState::Success
    }

    fn enter(&self, state: CallbackState) {
        tracing::debug!("Callback state: {}", state.name());
        if let Some(observer) = &self.observer {
            observer(&state);
        }
    }

    fn fail(&self, error: AuthError) -> CallbackState {
        tracing::warn!("Login callback failed: {}", error);
        self.store.take_post_login_path();
        let state = CallbackState::Failed(error);
        if let Some(observer) = &self.observer {
            observer(&state);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigation::RecordingNavigator;
    use std::sync::Mutex;

    fn handler(store: Arc<TokenStore>, nav: Arc<RecordingNavigator>) -> CallbackHandler {
        let config = AuthConfig {
            client_id: Some("erp-console".to_string()),
            app_origin: Some("http://127.0.0.1:5173".to_string()),
            token_endpoint: "http://127.0.0.1:9/token".to_string(),
            callback_delay_ms: 0,
            ..AuthConfig::default()
        };
        let endpoint = TokenEndpoint::from_config(reqwest::Client::new(), &config);
        CallbackHandler::new(config, endpoint, store, nav)
    }

    #[test]
    fn test_parse_ignores_fragment_and_unknown_keys() {
        let p = CallbackParams::parse("?code=c&session_state=zz&state=s#frag");
        assert_eq!(p.code.as_deref(), Some("c"));
        assert_eq!(p.state.as_deref(), Some("s"));
        assert!(p.error.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let p = CallbackParams::parse("error=access_denied&error_description=User+cancelled&state=s");
        assert_eq!(p.error.as_deref(), Some("access_denied"));
        assert_eq!(p.error_description.as_deref(), Some("User cancelled"));
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_before_exchange() {
        let store = Arc::new(TokenStore::in_memory());
        store.save_pending_authorization("verifier", "expected");
        let nav = Arc::new(RecordingNavigator::new());

        let state = handler(store.clone(), nav.clone())
            .handle("?code=c&state=forged")
            .await;

        assert!(matches!(state.error(), Some(AuthError::CsrfValidation(_))));
        assert!(nav.history().is_empty());
        // Consumed even though the attempt failed.
        assert!(store.take_pending_authorization().state.is_none());
    }

    #[tokio::test]
    async fn test_missing_saved_state_is_csrf_failure() {
        let store = Arc::new(TokenStore::in_memory());
        let state = handler(store, Arc::new(RecordingNavigator::new()))
            .handle("?code=c&state=anything")
            .await;
        assert!(matches!(state.error(), Some(AuthError::CsrfValidation(_))));
    }

    #[tokio::test]
    async fn test_missing_code_fails() {
        let store = Arc::new(TokenStore::in_memory());
        store.save_pending_authorization("verifier", "s");
        let state = handler(store, Arc::new(RecordingNavigator::new()))
            .handle("?state=s")
            .await;
        assert!(matches!(state.error(), Some(AuthError::InvalidCallback(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let store = Arc::new(TokenStore::in_memory());
        store.save_pending_authorization("verifier", "s");
        let state = handler(store, Arc::new(RecordingNavigator::new()))
            .handle("?error=access_denied&state=s")
            .await;
        let message = state.error().unwrap().to_string();
        assert!(message.contains("access_denied"));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_exchange_failure() {
        let store = Arc::new(TokenStore::in_memory());
        store.save_pending_authorization("verifier", "s");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();

        let state = handler(store.clone(), Arc::new(RecordingNavigator::new()))
            .with_observer(move |st| s.lock().unwrap().push(st.name()))
            .handle("?code=c&state=s")
            .await;

        assert!(matches!(
            state.error(),
            Some(AuthError::Exchange { status: None, .. })
        ));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["arriving", "validating_state", "exchanging_code", "failed"]
        );
        assert!(store.access_token().is_none());
    }
}
