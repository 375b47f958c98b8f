//! erp-auth - ERP console session tool
//!
#![doc = "erp-auth - ERP console session tool"]
#![doc = "Main entry point for the erp-auth command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use erp_auth::cli::{Cli, Commands};
use erp_auth::commands;
use erp_auth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login { return_to } => {
            tracing::info!("Starting login");
            if let Some(path) = &return_to {
                tracing::debug!("Resuming at {} after login", path);
            }
            commands::login::run_login(config, return_to).await?;
            Ok(())
        }
        Commands::Status => {
            commands::status::show_status(config).await?;
            Ok(())
        }
        Commands::Refresh => {
            tracing::info!("Refreshing session");
            commands::refresh::run_refresh(config).await?;
            Ok(())
        }
        Commands::Whoami { require } => {
            if let Some(org) = &require {
                tracing::debug!("Requiring organization type: {}", org);
            }
            commands::whoami::run_whoami(config, require).await?;
            Ok(())
        }
        Commands::Logout => {
            commands::logout::run_logout(config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "erp_auth=debug"
    } else {
        "erp_auth=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
