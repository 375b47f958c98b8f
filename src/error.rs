//! Error types for erp-auth
//!
//! This module defines the error taxonomy of the authentication subsystem,
//! using `thiserror` for ergonomic error handling.
//!
//! Only the login and callback paths surface these errors to a user.  The
//! refresher and the request client convert transport failures locally and
//! never let them escape as unhandled errors.

use thiserror::Error;

use crate::auth::claims::DecodeError;

/// Main error type for erp-auth operations
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing or unusable client configuration (client id, redirect URI,
    /// endpoints).  Fatal: blocks login.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The `state` returned by the authorization server does not match the
    /// one saved before the redirect.
    #[error("Security error: {0}")]
    CsrfValidation(String),

    /// The callback carried no usable `code`, or the saved verifier is gone.
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    /// The token endpoint rejected a code exchange or could not be reached.
    #[error("Token exchange failed{}: {message}", status_suffix(.status))]
    Exchange {
        /// HTTP status returned by the token endpoint, when one was received
        status: Option<u16>,
        /// Server-provided text, surfaced verbatim where available
        message: String,
    },

    /// The token endpoint answered 2xx but the body is unusable.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// Access token claims could not be decoded.
    #[error("Token decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The caller's organization type does not satisfy a route requirement.
    #[error("Access denied for organization type: {org_type}")]
    AuthorizationDenied {
        /// Organization type reported by the server
        org_type: String,
    },

    /// The refresh token is absent or was rejected.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Session storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type alias for erp-auth operations
///
/// Uses `anyhow::Error` so that callers can attach context while still
/// downcasting to [`AuthError`] where the variant matters.
pub type Result<T> = anyhow::Result<T>;
