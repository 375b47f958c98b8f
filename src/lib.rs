//! erp-auth - Session and authorization layer for the ERP console
//!
//! This library implements the client side of an OAuth 2.0
//! authorization-code flow with PKCE: login initiation, callback handling,
//! token storage and refresh, an authenticated HTTP client, and route guards.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE, token store, refresher, request client, login, callback,
//!   and guards
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind the `erp-auth` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use erp_auth::auth::navigation::BrowserNavigator;
//! use erp_auth::auth::AuthSession;
//! use erp_auth::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let session = AuthSession::with_keyring(config.auth, Arc::new(BrowserNavigator));
//!     let response = session.client().get("http://localhost:8080/api/orders").await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::AuthSession;
pub use config::Config;
pub use error::{AuthError, Result};
