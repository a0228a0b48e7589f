//! Warden - SOC portal sign-in and role management from the terminal
//!
//! Main entry point for the warden CLI.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{login, logout, register, roles, whoami};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Warden - SOC portal sign-in and role management
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Portal backend URL (overrides config and WARDEN_API_BASE)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password, or through the browser
    Login(login::LoginArgs),

    /// Create an account through the identity provider
    Register(register::RegisterArgs),

    /// Sign out and forget the stored session
    Logout(logout::LogoutArgs),

    /// Show the signed-in user and what they can do
    Whoami(whoami::WhoamiArgs),

    /// Request, review and count role promotions
    Roles(roles::RolesArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = warden_config::load_config(None).context("Failed to load configuration")?;
    let mut config = loaded.config.clone();
    if let Some(server) = cli.server {
        config.set_backend_url(server);
    }

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "warden=debug,warden_auth=debug,warden_client=debug,warden_config=debug,info"
    } else {
        "warden=info,warden_auth=warn,warden_client=warn,warn"
    };

    let log_dir = config
        .data_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "warden.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "warden=trace,warden_auth=debug,warden_client=debug,warden_config=debug,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Register(args) => register::run(args, &ctx).await,
        Commands::Logout(args) => logout::run(args, &ctx).await,
        Commands::Whoami(args) => whoami::run(args, &ctx).await,
        Commands::Roles(args) => roles::run(args, &ctx).await,
    }
}
