//! Route guards
//!
//! Two checks stand in front of protected locations:
//!
//! - [`SessionGuard`] admits a location when an access token is present and
//!   otherwise sends the user to login, remembering where they were going.
//!   It does not look at expiry; an expired token is caught later by the
//!   request client's 401 handling.
//! - [`OrgTypeGuard`] asks the server who the caller is and compares the
//!   reported organization type with the one a location requires.
//!
//! The organization check can be superseded.  Every call to
//! [`OrgTypeGuard::check`] or [`OrgTypeGuard::cancel`] bumps a generation
//! counter; a response that arrives for an older generation is dropped
//! without touching state or navigating.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;

use crate::auth::client::AuthenticatedClient;
use crate::auth::navigation::{Destination, LoginReason, Navigator};
use crate::auth::token_store::TokenStore;
use crate::error::AuthError;

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// Outcome of a [`SessionGuard`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// The location may be shown.
    Admit,
    /// The user was sent to login.
    Redirect,
}

/// Coarse guard: is there a session at all?
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use erp_auth::auth::guard::{GuardDecision, SessionGuard};
/// use erp_auth::auth::navigation::RecordingNavigator;
/// use erp_auth::auth::token_store::TokenStore;
///
/// let store = Arc::new(TokenStore::in_memory());
/// let guard = SessionGuard::new(store.clone(), Arc::new(RecordingNavigator::new()));
///
/// assert_eq!(guard.check("/orders"), GuardDecision::Redirect);
/// store.set_access_token("a1");
/// assert_eq!(guard.check("/orders"), GuardDecision::Admit);
/// ```
pub struct SessionGuard {
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl SessionGuard {
    /// Creates a guard over `store`.
    pub fn new(store: Arc<TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    /// Admits `requested` or redirects to login with `requested` as the
    /// return location.
    pub fn check(&self, requested: &str) -> GuardDecision {
        if self.store.access_token().is_some() {
            return GuardDecision::Admit;
        }

        tracing::debug!("No session for {}; redirecting to login", requested);
        self.navigator.navigate(Destination::Login {
            return_to: Some(requested.to_string()),
            reason: LoginReason::Unauthenticated,
        });
        GuardDecision::Redirect
    }
}

// ---------------------------------------------------------------------------
// OrgTypeGuard
// ---------------------------------------------------------------------------

/// State of an [`OrgTypeGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthGuardState {
    /// No check has run, or the last one was cancelled.
    Idle,
    /// A "who am I" request is in flight.
    Checking,
    /// Access granted.  Carries the caller's organization type when one was
    /// checked.
    Authorized(Option<String>),
    /// The caller is authenticated but belongs to another organization type.
    Forbidden {
        /// Organization type the location requires.
        required: String,
        /// Organization type the server reported.
        actual: String,
    },
    /// The check itself failed.
    Error {
        /// HTTP status, when the server answered with a non-2xx.
        status: Option<u16>,
        /// What went wrong.
        message: String,
    },
}

impl AuthGuardState {
    /// Returns `true` once a check has settled.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Idle | Self::Checking)
    }

    /// Returns the denial as an error value for a forbidden state.
    pub fn denial(&self) -> Option<AuthError> {
        match self {
            Self::Forbidden { actual, .. } => Some(AuthError::AuthorizationDenied {
                org_type: actual.clone(),
            }),
            _ => None,
        }
    }
}

/// Response envelope of the "who am I" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmIEnvelope {
    /// Server status code or label; not interpreted.
    #[serde(default)]
    pub status: Value,
    /// Application-level success flag.
    #[serde(default)]
    pub success: bool,
    /// Server message, shown when `success` is false.
    #[serde(default)]
    pub message: String,
    /// Either the organization type itself or an object carrying it.
    #[serde(default)]
    pub data: Value,
}

impl WhoAmIEnvelope {
    /// Extracts the organization type from `data`.
    ///
    /// Accepts a bare string or an object with `orgType`, `org_type`, or
    /// `organizationType`.
    ///
    /// # Examples
    ///
    /// ```
    /// use erp_auth::auth::guard::WhoAmIEnvelope;
    ///
    /// let e: WhoAmIEnvelope =
    ///     serde_json::from_str(r#"{"success":true,"data":{"orgType":"HQ"}}"#).unwrap();
    /// assert_eq!(e.org_type().as_deref(), Some("HQ"));
    /// ```
    pub fn org_type(&self) -> Option<String> {
        let value = match &self.data {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => ["orgType", "org_type", "organizationType"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        };
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Fine-grained guard: does the caller's organization type match?
pub struct OrgTypeGuard {
    client: AuthenticatedClient,
    whoami_url: String,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    generation: AtomicU64,
    state: Mutex<AuthGuardState>,
}

impl OrgTypeGuard {
    /// Creates a guard that queries `whoami_url` through `client`.
    pub fn new(
        client: AuthenticatedClient,
        whoami_url: impl Into<String>,
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            client,
            whoami_url: whoami_url.into(),
            store,
            navigator,
            generation: AtomicU64::new(0),
            state: Mutex::new(AuthGuardState::Idle),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> AuthGuardState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Discards any in-flight check and returns to [`AuthGuardState::Idle`].
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.settle(generation, AuthGuardState::Idle);
    }

    /// Checks the caller against `required`.
    ///
    /// Returns the settled state, or `None` when a later
    /// [`check`](Self::check) or [`cancel`](Self::cancel) superseded this
    /// one before it finished.  A superseded check changes nothing.
    pub async fn check(&self, required: Option<&str>) -> Option<AuthGuardState> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(required) = required.map(str::trim).filter(|r| !r.is_empty()) else {
            let state = AuthGuardState::Authorized(None);
            return self.settle(generation, state.clone()).then_some(state);
        };

        self.settle(generation, AuthGuardState::Checking);
        let outcome = self.query(required).await;

        if !self.is_current(generation) {
            tracing::debug!("Discarding stale organization check for {}", required);
            return None;
        }

        let state = match outcome {
            Some(state) => state,
            None => {
                tracing::warn!("Who-am-I response carries no organization type; logging out");
                self.store.logout();
                self.navigator.navigate(Destination::Login {
                    return_to: None,
                    reason: LoginReason::Corrupted,
                });
                AuthGuardState::Idle
            }
        };

        self.settle(generation, state.clone()).then_some(state)
    }

    /// Performs the request and classifies the answer.  `None` means the
    /// server reported success without a recognizable organization type.
    async fn query(&self, required: &str) -> Option<AuthGuardState> {
        let response = match self.client.get(&self.whoami_url).await {
            Ok(response) => response,
            Err(e) => {
                return Some(AuthGuardState::Error {
                    status: None,
                    message: format!("who-am-I request failed: {e}"),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Some(AuthGuardState::Error {
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("request rejected")
                    .to_string(),
            });
        }

        let envelope: WhoAmIEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                return Some(AuthGuardState::Error {
                    status: Some(status.as_u16()),
                    message: format!("unreadable who-am-I response: {e}"),
                })
            }
        };

        if !envelope.success {
            let message = if envelope.message.is_empty() {
                "server reported failure".to_string()
            } else {
                envelope.message
            };
            return Some(AuthGuardState::Error {
                status: Some(status.as_u16()),
                message,
            });
        }

        let actual = envelope.org_type()?;
        if actual == required {
            tracing::debug!("Organization type {} authorized", actual);
            Some(AuthGuardState::Authorized(Some(actual)))
        } else {
            tracing::info!(
                "Organization type {} does not satisfy required {}",
                actual,
                required
            );
            Some(AuthGuardState::Forbidden {
                required: required.to_string(),
                actual,
            })
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Writes `next` if `generation` is still current.
    fn settle(&self, generation: u64, next: AuthGuardState) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !self.is_current(generation) {
            return false;
        }
        *state = next;
        true
    }
}

impl std::fmt::Debug for OrgTypeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgTypeGuard")
            .field("whoami_url", &self.whoami_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
