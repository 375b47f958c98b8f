//! OAuth 2.0 authorization-code + PKCE session management for the console
//!
//! # Flow
//!
//! ```text
//! LoginInitiator --(redirect)--> authorization server --(redirect)--> CallbackHandler
//!      |                                                                   |
//!      +-- PkceMaterial (verifier, state) --> TokenStore <-- TokenPair ----+
//!                                                |
//!                      SessionGuard / OrgTypeGuard admit navigation
//!                                                |
//!                 AuthenticatedClient --(401)--> TokenRefresher (single-flight)
//! ```
//!
//! # Modules
//!
//! - [`pkce`] - verifier, S256 challenge, and `state` generation.
//! - [`claims`] - typed decoding of the access token payload.
//! - [`storage`] - key/value backends (process memory, OS keyring).
//! - [`token_store`] - tokens, pending login material, and the observable
//!   profile.
//! - [`profile`] - display identity derived from the access token.
//! - [`navigation`] - the "navigate away" capability.
//! - [`token_endpoint`] - code and refresh grants.
//! - [`refresh`] - single-flight refresh-token exchange.
//! - [`client`] - bearer requests with one refresh-and-retry on 401.
//! - [`login`] - authorization request construction.
//! - [`callback`] - redirect handling state machine.
//! - [`guard`] - session and organization-type route guards.
//! - [`session`] - everything above wired around one store.

pub mod callback;
pub mod claims;
pub mod client;
pub mod guard;
pub mod login;
pub mod navigation;
pub mod pkce;
pub mod profile;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod token_endpoint;
pub mod token_store;

pub use callback::{CallbackHandler, CallbackState};
pub use client::AuthenticatedClient;
pub use guard::{AuthGuardState, GuardDecision, OrgTypeGuard, SessionGuard};
pub use login::LoginInitiator;
pub use navigation::{Destination, LoginReason, Navigator};
pub use refresh::{Refresh, TokenRefresher};
pub use session::AuthSession;
pub use token_store::{SessionStatus, TokenPair, TokenStore};
