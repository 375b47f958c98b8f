//! Process-wide session state: tokens, pending PKCE material, and profile
//!
//! [`TokenStore`] is the single writer for everything the session owns:
//!
//! - the current [`TokenPair`] (access token in tab-scoped storage, refresh
//!   token in durable storage; an access token is never written to durable
//!   storage),
//! - the verifier and `state` of an in-progress login,
//! - the derived [`UserProfile`] and the listeners observing it.
//!
//! The store is an explicit value handed to every component through an
//! `Arc`, so each test can build a fresh one.  It cannot fail: storage
//! backend errors are logged and read as "absent".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::auth::profile::UserProfile;
use crate::auth::storage::{MemoryStorage, Storage};

/// Tab-scoped key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Durable key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Tab-scoped key holding the pending PKCE verifier.
pub const PKCE_VERIFIER_KEY: &str = "pkce_verifier";
/// Tab-scoped key holding the pending `state` nonce.
pub const OAUTH_STATE_KEY: &str = "oauth_state";
/// Tab-scoped key holding the location to return to after login.
pub const POST_LOGIN_PATH_KEY: &str = "post_login_path";

const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    PKCE_VERIFIER_KEY,
    OAUTH_STATE_KEY,
    POST_LOGIN_PATH_KEY,
];

// ---------------------------------------------------------------------------
// TokenPair / SessionStatus / PendingAuthorization
// ---------------------------------------------------------------------------

/// The current access token and, when issued, its refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived bearer credential.
    pub access_token: String,

    /// Longer-lived credential used to mint new access tokens.  `None` when
    /// the server did not issue or rotate one.
    pub refresh_token: Option<String>,
}

/// Liveness of the implicit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// An access token is present.
    Active,
    /// No access token, but a refresh token can mint one.
    Refreshable,
    /// Neither token exists; the user must log in.
    Dead,
}

impl SessionStatus {
    /// Returns `true` unless the session is [`SessionStatus::Dead`].
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Dead)
    }
}

/// Verifier and state saved before the redirect to the authorization server.
///
/// Returned by [`TokenStore::take_pending_authorization`], which removes both
/// values from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAuthorization {
    /// Saved PKCE verifier.
    pub verifier: Option<String>,
    /// Saved `state` nonce.
    pub state: Option<String>,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

type Listener = Arc<dyn Fn(Option<&UserProfile>) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Handle returned by [`TokenStore::subscribe`].
///
/// Dropping the handle does NOT unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe).  The handle is `Clone` so a listener
/// can hold its own.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Stops future notifications for this listener.  Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut list) = listeners.lock() {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Owner of the session's tokens and profile.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::profile::UserProfile;
/// use erp_auth::auth::token_store::{SessionStatus, TokenStore};
///
/// let store = TokenStore::in_memory();
/// assert_eq!(store.session_status(), SessionStatus::Dead);
///
/// store.set_refresh_token("r1");
/// assert_eq!(store.session_status(), SessionStatus::Refreshable);
///
/// store.set_profile(Some(UserProfile::new("Kim")));
/// assert_eq!(store.profile().unwrap().name, "Kim");
/// store.clear();
/// assert!(store.profile().is_none());
/// ```
pub struct TokenStore {
    session: Arc<dyn Storage>,
    durable: Arc<dyn Storage>,
    profile: Mutex<Option<UserProfile>>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

impl TokenStore {
    /// Creates a store over the given tab-scoped and durable backends.
    pub fn new(session: Arc<dyn Storage>, durable: Arc<dyn Storage>) -> Self {
        Self {
            session,
            durable,
            profile: Mutex::new(None),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Creates a store with two fresh [`MemoryStorage`] backends.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Returns the current access token.
    pub fn access_token(&self) -> Option<String> {
        read(self.session.as_ref(), ACCESS_TOKEN_KEY)
    }

    /// Replaces the access token in tab-scoped storage.
    pub fn set_access_token(&self, token: &str) {
        write(self.session.as_ref(), ACCESS_TOKEN_KEY, token);
    }

    /// Returns the current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        read(self.durable.as_ref(), REFRESH_TOKEN_KEY)
    }

    /// Replaces the refresh token in durable storage.
    pub fn set_refresh_token(&self, token: &str) {
        write(self.durable.as_ref(), REFRESH_TOKEN_KEY, token);
    }

    /// Makes `pair` the current token pair.
    ///
    /// The access token always replaces the previous one.  The refresh token
    /// is only replaced when the pair carries one, so a server that does not
    /// rotate refresh tokens keeps the existing one usable.
    pub fn store_pair(&self, pair: &TokenPair) {
        self.set_access_token(&pair.access_token);
        if let Some(refresh) = pair.refresh_token.as_deref() {
            self.set_refresh_token(refresh);
        }
    }

    /// Returns the liveness of the session.
    pub fn session_status(&self) -> SessionStatus {
        if self.access_token().is_some() {
            SessionStatus::Active
        } else if self.refresh_token().is_some() {
            SessionStatus::Refreshable
        } else {
            SessionStatus::Dead
        }
    }

    // -----------------------------------------------------------------------
    // Pending login
    // -----------------------------------------------------------------------

    /// Saves the verifier and `state` of a login that is about to redirect.
    pub fn save_pending_authorization(&self, verifier: &str, state: &str) {
        write(self.session.as_ref(), PKCE_VERIFIER_KEY, verifier);
        write(self.session.as_ref(), OAUTH_STATE_KEY, state);
    }

    /// Removes and returns the saved verifier and `state`.
    ///
    /// The values are single-use: a second call returns empty fields.
    pub fn take_pending_authorization(&self) -> PendingAuthorization {
        let pending = PendingAuthorization {
            verifier: read(self.session.as_ref(), PKCE_VERIFIER_KEY),
            state: read(self.session.as_ref(), OAUTH_STATE_KEY),
        };
        remove(self.session.as_ref(), PKCE_VERIFIER_KEY);
        remove(self.session.as_ref(), OAUTH_STATE_KEY);
        pending
    }

    /// Remembers where to send the user once login completes.
    pub fn set_post_login_path(&self, path: &str) {
        write(self.session.as_ref(), POST_LOGIN_PATH_KEY, path);
    }

    /// Removes and returns the remembered post-login location.
    pub fn take_post_login_path(&self) -> Option<String> {
        let path = read(self.session.as_ref(), POST_LOGIN_PATH_KEY);
        remove(self.session.as_ref(), POST_LOGIN_PATH_KEY);
        path
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// Replaces the profile, then synchronously notifies every listener.
    ///
    /// Listeners are snapshotted before the first call, so a listener may
    /// unsubscribe itself or another listener without skipping anyone in
    /// the current round.
    pub fn set_profile(&self, profile: Option<UserProfile>) {
        if let Ok(mut current) = self.profile.lock() {
            *current = profile.clone();
        }

        let snapshot: Vec<Listener> = match self.listeners.lock() {
            Ok(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => Vec::new(),
        };

        for listener in snapshot {
            listener(profile.as_ref());
        }
    }

    /// Returns a snapshot of the current profile.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.lock().ok().and_then(|p| p.clone())
    }

    /// Registers `listener` for every subsequent [`set_profile`](Self::set_profile).
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&UserProfile>) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut list) = self.listeners.lock() {
            list.push((id, Arc::new(listener)));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Clears the profile.  Equivalent to `set_profile(None)`.
    pub fn clear(&self) {
        self.set_profile(None);
    }

    /// Hard logout: forgets every token, pending login, and the profile.
    pub fn logout(&self) {
        for key in SESSION_KEYS {
            remove(self.session.as_ref(), key);
        }
        remove(self.durable.as_ref(), REFRESH_TOKEN_KEY);
        self.clear();
        tracing::info!("Session cleared");
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("status", &self.session_status())
            .field("profile", &self.profile())
            .finish_non_exhaustive()
    }
}

fn read(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            tracing::warn!("Failed to read '{}' from storage: {}", key, e);
            None
        }
    }
}

fn write(storage: &dyn Storage, key: &str, value: &str) {
    if let Err(e) = storage.set(key, value) {
        tracing::warn!("Failed to write '{}' to storage: {}", key, e);
    }
}

fn remove(storage: &dyn Storage, key: &str) {
    if let Err(e) = storage.remove(key) {
        tracing::warn!("Failed to remove '{}' from storage: {}", key, e);
    }
}
