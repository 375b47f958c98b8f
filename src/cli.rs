//! Command-line interface definition for erp-auth
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to sign in, inspect, renew, and end a console session.

use clap::{Parser, Subcommand};

/// erp-auth - ERP console session tool
///
/// Signs in against the ERP authorization server with PKCE and manages the
/// resulting session.
#[derive(Parser, Debug, Clone)]
#[command(name = "erp-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ERP_AUTH_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the configured OAuth client id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Override the origin the console is served from
    #[arg(long)]
    pub origin: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for erp-auth
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in through the browser
    Login {
        /// Console location to resume after signing in
        #[arg(long)]
        return_to: Option<String>,
    },

    /// Show the current session
    Status,

    /// Renew the access token with the stored refresh token
    Refresh,

    /// Ask the server who the session belongs to
    Whoami {
        /// Organization type the caller must have
        #[arg(short, long)]
        require: Option<String>,
    },

    /// Forget every token and end the session
    Logout,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            client_id: None,
            origin: None,
            command: Commands::Status,
        }
    }
}
