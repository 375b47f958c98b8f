//! Silent re-authentication with a refresh token
//!
//! [`TokenRefresher`] exchanges the durable refresh token for a new token
//! pair.  Refresh tokens may rotate (single-use), so concurrent callers must
//! not each spend the same one: every caller that arrives while an exchange
//! is in flight joins that exchange and receives its result.
//!
//! A refresh that cannot produce a token is terminal for the session: the
//! store is cleared and the user is sent to the login entry point.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::auth::navigation::{Destination, LoginReason, Navigator};
use crate::auth::profile::sync_from_token;
use crate::auth::token_endpoint::TokenEndpoint;
use crate::auth::token_store::TokenStore;

/// Something that can mint a new access token.
///
/// The request client depends on this seam rather than on
/// [`TokenRefresher`] so that its retry logic can be tested in isolation.
#[async_trait]
pub trait Refresh: Send + Sync {
    /// Returns a new access token, or `None` when the session cannot be
    /// renewed.
    async fn refresh(&self) -> Option<String>;
}

type InFlight = Shared<BoxFuture<'static, Option<String>>>;

struct RefresherInner {
    endpoint: TokenEndpoint,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

/// Single-flight refresh-token exchanger.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use erp_auth::auth::navigation::BrowserNavigator;
/// use erp_auth::auth::refresh::{Refresh, TokenRefresher};
/// use erp_auth::auth::token_endpoint::TokenEndpoint;
/// use erp_auth::auth::token_store::TokenStore;
///
/// # async fn example() {
/// let store = Arc::new(TokenStore::in_memory());
/// let endpoint = TokenEndpoint::new(
///     reqwest::Client::new(),
///     "https://auth.example.com/oauth2/token",
///     Some("erp-console".to_string()),
///     None,
/// );
/// let refresher = TokenRefresher::new(endpoint, store, Arc::new(BrowserNavigator));
/// let token = refresher.refresh().await;
/// # }
/// ```
pub struct TokenRefresher {
    inner: Arc<RefresherInner>,
    in_flight: Mutex<Option<InFlight>>,
}

impl TokenRefresher {
    /// Creates a refresher writing into `store`.
    pub fn new(
        endpoint: TokenEndpoint,
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                endpoint,
                store,
                navigator,
            }),
            in_flight: Mutex::new(None),
        }
    }

    /// Returns the shared exchange, starting one if none is in flight.
    fn join_or_start(&self) -> InFlight {
        let mut slot = match self.in_flight.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = slot.as_ref() {
            tracing::debug!("Joining in-flight token refresh");
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let exchange = async move { inner.exchange().await }.boxed().shared();
        *slot = Some(exchange.clone());
        exchange
    }

    /// Forgets `finished` if it is still the registered exchange.
    fn release(&self, finished: &InFlight) {
        let mut slot = match self.in_flight.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot
            .as_ref()
            .is_some_and(|current| Shared::ptr_eq(current, finished))
        {
            *slot = None;
        }
    }
}

#[async_trait]
impl Refresh for TokenRefresher {
    async fn refresh(&self) -> Option<String> {
        let exchange = self.join_or_start();
        let result = exchange.clone().await;
        self.release(&exchange);
        result
    }
}

impl RefresherInner {
    async fn exchange(&self) -> Option<String> {
        let Some(refresh_token) = self.store.refresh_token() else {
            tracing::info!("No refresh token available; session cannot be renewed");
            self.expire(LoginReason::NoSession);
            return None;
        };

        tracing::debug!("Refreshing access token");
        match self.endpoint.refresh(&refresh_token).await {
            Ok(pair) => {
                self.store.store_pair(&pair);
                sync_from_token(&self.store, Some(&pair.access_token), None);
                tracing::info!(
                    "Access token refreshed (refresh token rotated: {})",
                    pair.refresh_token.is_some()
                );
                Some(pair.access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.expire(LoginReason::SessionExpired);
                None
            }
        }
    }

    fn expire(&self, reason: LoginReason) {
        self.store.logout();
        self.navigator.navigate(Destination::Login {
            return_to: None,
            reason,
        });
    }
}
