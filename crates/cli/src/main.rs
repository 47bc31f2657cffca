//! Corner Shop CLI - database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! cs-cli migrate
//!
//! # Load products from a YAML file
//! cs-cli seed crates/cli/seed/products.yaml
//!
//! # Check a seed file without touching the database
//! cs-cli seed crates/cli/seed/products.yaml --dry-run
//!
//! # Grant or revoke admin rights
//! cs-cli admin grant -e owner@example.com
//! cs-cli admin revoke -e owner@example.com
//! ```
//!
//! All commands read `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`), loading
//! `.env` if present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cs-cli")]
#[command(author, version, about = "Corner Shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Insert catalog products from a YAML file
    Seed {
        /// Path to the YAML file
        file: String,

        /// Validate the file only
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage admin rights
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Make an existing user an admin
    Grant {
        /// User email address
        #[arg(short, long)]
        email: String,
    },
    /// Remove admin rights from a user
    Revoke {
        /// User email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, dry_run } => commands::seed::products(&file, dry_run).await?,
        Commands::Admin { action } => match action {
            AdminAction::Grant { email } => commands::admin::set_admin(&email, true).await?,
            AdminAction::Revoke { email } => commands::admin::set_admin(&email, false).await?,
        },
    }
    Ok(())
}
