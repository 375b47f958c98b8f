//! The "navigate away" capability
//!
//! Guards, the login initiator, the callback handler, and the refresher all
//! end some paths by sending the user somewhere else.  They do so through a
//! [`Navigator`] handed to them at construction, so their state machines can
//! be tested without a browser.

use std::sync::Mutex;

/// Why the user is being sent to the login entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    /// No session exists for a protected location.
    Unauthenticated,
    /// The refresh token is absent; there is nothing to renew.
    NoSession,
    /// The refresh token was rejected; the user must re-authenticate.
    SessionExpired,
    /// The session was found in a state that cannot be trusted.
    Corrupted,
}

impl LoginReason {
    /// Short machine-readable tag, suitable for a query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NoSession => "no_session",
            Self::SessionExpired => "session_expired",
            Self::Corrupted => "corrupted",
        }
    }

    /// User-facing message.
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Please sign in to continue.",
            Self::NoSession => "No active session. Please sign in.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::Corrupted => "Your session could not be verified. Please sign in again.",
        }
    }
}

/// Where to send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The console's login entry point.
    Login {
        /// Location to resume after login, when known.
        return_to: Option<String>,
        /// Why login is required.
        reason: LoginReason,
    },
    /// A location inside the authenticated application.
    App(String),
    /// A full URL outside the application (the authorization endpoint).
    External(String),
}

/// Performs a navigation.  Never returns control to the page that was left
/// in a browser; in other hosts it simply records or reports the move.
pub trait Navigator: Send + Sync {
    /// Sends the user to `destination`.
    fn navigate(&self, destination: Destination);
}

// ---------------------------------------------------------------------------
// BrowserNavigator
// ---------------------------------------------------------------------------

/// Navigator for a terminal host.
///
/// External URLs are printed to stderr and opened in the system browser
/// when possible; in-app moves and login prompts are reported on stderr.
#[derive(Debug, Default, Clone)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, destination: Destination) {
        match destination {
            Destination::External(url) => {
                eprintln!("Open the following URL in your browser to sign in:\n{}", url);
                try_open_browser(&url);
            }
            Destination::App(path) => {
                tracing::info!("Signed in; continuing to {}", path);
            }
            Destination::Login { return_to, reason } => {
                eprintln!("{} Run `erp-auth login` to start a new session.", reason.message());
                if let Some(path) = return_to {
                    tracing::debug!("Login requested for {}", path);
                }
            }
        }
    }
}

/// Attempts to open `url` in the user's default browser.
///
/// Errors are ignored; the URL has already been printed.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}

// ---------------------------------------------------------------------------
// RecordingNavigator
// ---------------------------------------------------------------------------

/// Navigator that records every destination instead of moving.
///
/// Used by embedders that drive navigation themselves, and by tests.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::navigation::{Destination, Navigator, RecordingNavigator};
///
/// let nav = RecordingNavigator::new();
/// nav.navigate(Destination::App("/".to_string()));
/// assert_eq!(nav.last(), Some(Destination::App("/".to_string())));
/// ```
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<Destination>>,
}

impl RecordingNavigator {
    /// Creates a navigator with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every destination in navigation order.
    pub fn history(&self) -> Vec<Destination> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Returns the most recent destination.
    pub fn last(&self) -> Option<Destination> {
        self.history().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: Destination) {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(destination);
        }
    }
}
