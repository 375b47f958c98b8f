//! Session summary command

use chrono::{DateTime, Utc};
use colored::Colorize;

use super::open_session;
use crate::auth::claims::decode_claims;
use crate::auth::token_store::SessionStatus;
use crate::config::Config;
use crate::error::Result;

/// Prints the session status, the signed-in profile, and when the access
/// token expires.  Never contacts the server.
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
pub async fn show_status(config: Config) -> Result<()> {
    let session = open_session(config);
    let status = session.status();

    println!("{} {}", "Session:".bold(), status_label(status));

    if let Some(profile) = session.sync_profile() {
        match profile.email {
            Some(email) => println!("{} {} <{}>", "User:".bold(), profile.name, email),
            None => println!("{} {}", "User:".bold(), profile.name),
        }
    }

    if let Some(token) = session.store().access_token() {
        match decode_claims(&token) {
            Ok(claims) => {
                if let Some(exp) = claims.exp {
                    println!("{} {}", "Expires:".bold(), describe_expiry(exp, Utc::now()));
                }
            }
            Err(e) => tracing::debug!("Access token claims unavailable: {}", e),
        }
    }

    if status == SessionStatus::Refreshable {
        println!("Run `erp-auth refresh` to obtain a new access token.");
    }
    Ok(())
}

fn status_label(status: SessionStatus) -> colored::ColoredString {
    match status {
        SessionStatus::Active => "active".green(),
        SessionStatus::Refreshable => "refreshable".yellow(),
        SessionStatus::Dead => "signed out".red(),
    }
}

/// Renders an `exp` claim relative to `now`.
fn describe_expiry(exp: i64, now: DateTime<Utc>) -> String {
    let Some(at) = DateTime::<Utc>::from_timestamp(exp, 0) else {
        return format!("invalid timestamp {exp}");
    };
    let remaining = at.signed_duration_since(now);
    if remaining.num_seconds() <= 0 {
        format!("{} (expired)", at.to_rfc3339())
    } else {
        format!("{} (in {}m)", at.to_rfc3339(), remaining.num_minutes())
    }
}
