//! HTTP client that attaches the access token and renews it once on 401
//!
//! Every API call the console makes goes through [`AuthenticatedClient`]:
//!
//! 1. The current access token (if any) is attached as
//!    `Authorization: Bearer <token>`.
//! 2. A response other than `401 Unauthorized` is returned as-is.
//! 3. On `401` the refresher is asked exactly once for a new token.  Without
//!    one, the original `401` is returned unchanged.  With one, the request
//!    is replayed once and that response is returned whatever its status.
//!
//! The bound is enforced by [`RetryState`], which can only move forward.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response, StatusCode};

use crate::auth::refresh::Refresh;
use crate::auth::token_store::TokenStore;
use crate::error::{AuthError, Result};

/// Progress of one logical request through the refresh-and-retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// First attempt, not yet answered.
    Initial,
    /// The first attempt was rejected with 401; one replay is allowed.
    Retried,
    /// A response has been settled on.  No further attempts.
    Done,
}

impl RetryState {
    /// Advances after a response.  Only `Initial` followed by a 401 earns a
    /// replay; every other combination ends the cycle.
    ///
    /// # Examples
    ///
    /// ```
    /// use erp_auth::auth::client::RetryState;
    ///
    /// assert_eq!(RetryState::Initial.next(true), RetryState::Retried);
    /// assert_eq!(RetryState::Initial.next(false), RetryState::Done);
    /// assert_eq!(RetryState::Retried.next(true), RetryState::Done);
    /// ```
    pub fn next(self, unauthorized: bool) -> Self {
        match (self, unauthorized) {
            (Self::Initial, true) => Self::Retried,
            _ => Self::Done,
        }
    }
}

/// Bearer-authenticated HTTP client with one-shot silent renewal.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use erp_auth::auth::client::AuthenticatedClient;
/// use erp_auth::auth::refresh::Refresh;
/// use erp_auth::auth::token_store::TokenStore;
///
/// # async fn example(refresher: Arc<dyn Refresh>) -> erp_auth::error::Result<()> {
/// let store = Arc::new(TokenStore::in_memory());
/// let client = AuthenticatedClient::new(reqwest::Client::new(), store, refresher);
/// let response = client.get("https://erp.example.com/api/orders").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    store: Arc<TokenStore>,
    refresher: Arc<dyn Refresh>,
}

impl AuthenticatedClient {
    /// Creates a client reading tokens from `store` and renewing through
    /// `refresher`.
    pub fn new(http: reqwest::Client, store: Arc<TokenStore>, refresher: Arc<dyn Refresh>) -> Self {
        Self {
            http,
            store,
            refresher,
        }
    }

    /// Starts building a request.  Send it with [`send`](Self::send).
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Issues an authenticated `GET`.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the transport fails.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Response> {
        self.send(self.request(Method::GET, url)).await
    }

    /// Builds and issues `builder` as an authenticated request.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be built or the transport
    /// fails.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(AuthError::Http)?;
        self.execute(request).await
    }

    /// Issues `request`, renewing the access token once on `401`.
    ///
    /// Requests whose body cannot be cloned (streams) are not replayed; the
    /// refresh still happens so that later requests use the new token.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures of the request itself.
    /// A failed refresh is not an error: the original `401` is returned.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut state = RetryState::Initial;
        let mut token = self.store.access_token();
        let mut request = request;

        loop {
            let replay = request.try_clone();
            let response = self.dispatch(request, token.as_deref()).await?;

            state = state.next(response.status() == StatusCode::UNAUTHORIZED);
            if state == RetryState::Done {
                return Ok(response);
            }

            tracing::debug!("Request to {} rejected with 401; refreshing", response.url());
            let Some(fresh) = self.refresher.refresh().await else {
                return Ok(response);
            };

            match replay {
                Some(copy) => {
                    token = Some(fresh);
                    request = copy;
                }
                None => {
                    tracing::warn!(
                        "Request to {} cannot be replayed; returning original 401",
                        response.url()
                    );
                    return Ok(response);
                }
            }
        }
    }

    async fn dispatch(&self, mut request: Request, token: Option<&str>) -> Result<Response> {
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access token is not a valid header value; sending without it"),
            }
        }

        Ok(self.http.execute(request).await.map_err(AuthError::Http)?)
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
