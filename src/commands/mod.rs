/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `login`: Browser sign-in with a loopback callback listener
- `status`: Session summary
- `refresh`: One refresh-token exchange
- `whoami`: Organization-type check against the server
- `logout`: Hard logout

Every handler builds an [`AuthSession`] with the refresh token in the OS
keyring, so sessions survive between invocations while access tokens live
only as long as the process.
*/

use crate::auth::navigation::BrowserNavigator;
use crate::auth::AuthSession;
use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;

// Browser sign-in
pub mod login;

// Session summary
pub mod status;

/// Builds the session used by every command.
fn open_session(config: Config) -> AuthSession {
    AuthSession::with_keyring(config.auth, Arc::new(BrowserNavigator))
}

// Refresh command handler
pub mod refresh {
    //! One-shot refresh-token exchange.

    use super::*;
    use colored::Colorize;

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// On failure the session is cleared and the user is told to log in
    /// again; the command itself still succeeds.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    pub async fn run_refresh(config: Config) -> Result<()> {
        let session = open_session(config);
        match session.refresh().await {
            Some(_) => {
                println!("{}", "Session renewed.".green());
                if let Some(profile) = session.profile() {
                    println!("Signed in as {}", profile.name.bold());
                }
            }
            None => println!("{}", "Session could not be renewed.".yellow()),
        }
        Ok(())
    }
}

// Who-am-I command handler
pub mod whoami {
    //! Organization-type check through the authenticated client.

    use super::*;
    use crate::auth::guard::AuthGuardState;
    use crate::auth::token_store::SessionStatus;
    use crate::error::AuthError;
    use colored::Colorize;

    /// Runs the organization guard and prints its verdict.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `require` - Organization type the caller must have, if any
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AuthorizationDenied`] when the caller's
    /// organization type does not match, and an error when the check fails.
    pub async fn run_whoami(config: Config, require: Option<String>) -> Result<()> {
        let session = open_session(config);
        if session.ensure_access_token().await == SessionStatus::Dead {
            println!("{}", "Not signed in.".yellow());
            return Ok(());
        }

        let guard = session.org_guard();
        match guard.check(require.as_deref()).await {
            Some(AuthGuardState::Authorized(org)) => {
                match org {
                    Some(org) => println!("{} ({})", "Authorized".green(), org),
                    None => println!("{}", "Authorized".green()),
                }
                Ok(())
            }
            Some(state @ AuthGuardState::Forbidden { .. }) => {
                eprintln!("{}", "Forbidden".red());
                match state.denial() {
                    Some(denial) => Err(denial.into()),
                    None => Ok(()),
                }
            }
            Some(AuthGuardState::Error { status, message }) => Err(AuthError::Exchange {
                status,
                message: format!("who-am-I check failed: {message}"),
            }
            .into()),
            Some(AuthGuardState::Idle) => {
                println!("{}", "Session was reset; please log in again.".yellow());
                Ok(())
            }
            Some(AuthGuardState::Checking) | None => Ok(()),
        }
    }
}

// Logout command handler
pub mod logout {
    //! Hard logout.

    use super::*;
    use colored::Colorize;

    /// Forgets every token for the configured keyring service.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    pub fn run_logout(config: Config) -> Result<()> {
        let session = open_session(config);
        session.store().logout();
        println!("{}", "Signed out.".green());
        Ok(())
    }
}
