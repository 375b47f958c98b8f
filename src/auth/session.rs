//! Wiring of the authentication components around one token store

use std::sync::Arc;

use crate::auth::callback::{CallbackHandler, CallbackState};
use crate::auth::client::AuthenticatedClient;
use crate::auth::guard::{GuardDecision, OrgTypeGuard, SessionGuard};
use crate::auth::login::LoginInitiator;
use crate::auth::navigation::{Destination, LoginReason, Navigator};
use crate::auth::profile::{sync_from_token, UserProfile};
use crate::auth::refresh::{Refresh, TokenRefresher};
use crate::auth::storage::{KeyringStorage, MemoryStorage, Storage};
use crate::auth::token_endpoint::TokenEndpoint;
use crate::auth::token_store::{SessionStatus, TokenStore};
use crate::config::AuthConfig;
use crate::error::AuthError;

/// The authentication subsystem for one console instance.
///
/// Every component shares the same [`TokenStore`], [`Navigator`], and HTTP
/// connection pool.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use erp_auth::auth::navigation::RecordingNavigator;
/// use erp_auth::auth::session::AuthSession;
/// use erp_auth::auth::storage::MemoryStorage;
/// use erp_auth::auth::token_store::SessionStatus;
/// use erp_auth::config::AuthConfig;
///
/// let session = AuthSession::new(
///     AuthConfig::default(),
///     Arc::new(MemoryStorage::new()),
///     Arc::new(MemoryStorage::new()),
///     Arc::new(RecordingNavigator::new()),
/// );
/// assert_eq!(session.status(), SessionStatus::Dead);
/// ```
pub struct AuthSession {
    config: AuthConfig,
    http: reqwest::Client,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    refresher: Arc<TokenRefresher>,
    client: AuthenticatedClient,
}

impl AuthSession {
    /// Builds the subsystem over the given storage backends.
    pub fn new(
        config: AuthConfig,
        session_storage: Arc<dyn Storage>,
        durable_storage: Arc<dyn Storage>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let http = reqwest::Client::new();
        let store = Arc::new(TokenStore::new(session_storage, durable_storage));
        let refresher = Arc::new(TokenRefresher::new(
            TokenEndpoint::from_config(http.clone(), &config),
            store.clone(),
            navigator.clone(),
        ));
        let client = AuthenticatedClient::new(http.clone(), store.clone(), refresher.clone());

        Self {
            config,
            http,
            store,
            navigator,
            refresher,
            client,
        }
    }

    /// Builds the subsystem with the refresh token in the OS keyring and
    /// everything else in process memory.
    pub fn with_keyring(config: AuthConfig, navigator: Arc<dyn Navigator>) -> Self {
        let durable = Arc::new(KeyringStorage::new(config.keyring_service.clone()));
        Self::new(config, Arc::new(MemoryStorage::new()), durable, navigator)
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns the shared token store.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Returns the authenticated request client.
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Returns the liveness of the session.
    pub fn status(&self) -> SessionStatus {
        self.store.session_status()
    }

    /// Returns the current profile.
    pub fn profile(&self) -> Option<UserProfile> {
        self.store.profile()
    }

    /// Starts a login.  See [`LoginInitiator::start_login_with_return`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the client is not fully
    /// configured.
    pub fn start_login(&self, return_to: Option<&str>) -> Result<String, AuthError> {
        self.login_initiator().start_login_with_return(return_to)
    }

    /// Completes a login from the redirect in `url_or_query`.
    pub async fn complete_login(&self, url_or_query: &str) -> CallbackState {
        self.callback_handler().handle(url_or_query).await
    }

    /// Mints a new access token from the refresh token.
    pub async fn refresh(&self) -> Option<String> {
        self.refresher.refresh().await
    }

    /// Makes sure an access token is available, refreshing when only a
    /// refresh token remains.  Returns the resulting status.
    pub async fn ensure_access_token(&self) -> SessionStatus {
        if self.status() == SessionStatus::Refreshable {
            self.refresh().await;
        }
        self.status()
    }

    /// Re-derives the profile from the current access token.
    pub fn sync_profile(&self) -> Option<UserProfile> {
        sync_from_token(&self.store, self.store.access_token().as_deref(), None)
    }

    /// Runs the session guard for `requested`.
    pub fn guard(&self, requested: &str) -> GuardDecision {
        SessionGuard::new(self.store.clone(), self.navigator.clone()).check(requested)
    }

    /// Creates an organization guard against the configured "who am I"
    /// endpoint.
    pub fn org_guard(&self) -> OrgTypeGuard {
        OrgTypeGuard::new(
            self.client.clone(),
            self.config.whoami_url.clone(),
            self.store.clone(),
            self.navigator.clone(),
        )
    }

    /// Hard logout followed by a redirect to login.
    pub fn logout(&self) {
        self.store.logout();
        self.navigator.navigate(Destination::Login {
            return_to: None,
            reason: LoginReason::NoSession,
        });
    }

    /// Creates a login initiator bound to this session.
    pub fn login_initiator(&self) -> LoginInitiator {
        LoginInitiator::new(
            self.config.clone(),
            self.store.clone(),
            self.navigator.clone(),
        )
    }

    /// Creates a callback handler bound to this session.
    pub fn callback_handler(&self) -> CallbackHandler {
        CallbackHandler::new(
            self.config.clone(),
            TokenEndpoint::from_config(self.http.clone(), &self.config),
            self.store.clone(),
            self.navigator.clone(),
        )
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
