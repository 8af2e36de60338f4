//! CLI entry point for Passenger.
//!
//! This binary provides the `passenger` command: server setup, login with a
//! short-lived cached session, and account management against a Passenger
//! server.

mod api;
mod cli;
mod commands;
mod config;
mod prompt;
mod schemas;
mod table;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::AppContext;
use crate::config::Config;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    let config = Config::load().context("failed to load configuration")?;
    let mut ctx = AppContext::new(config);

    match cli.command {
        Commands::Server { url } => commands::cmd_server(&mut ctx, &url),
        Commands::Status => commands::cmd_status(&ctx).await,
        Commands::Register => commands::cmd_register(&ctx).await,
        Commands::Validate { recovery } => commands::cmd_validate(&ctx, recovery).await,
        Commands::Login => commands::cmd_login(&ctx).await,
        Commands::Logout => commands::cmd_logout(&ctx),
        Commands::List => commands::cmd_list(&ctx).await,
        Commands::Get { id } => commands::cmd_get(&ctx, &id).await,
        Commands::Create(args) => commands::cmd_create(&ctx, args).await,
        Commands::Update {
            id,
            fields,
            change_passphrase,
        } => commands::cmd_update(&ctx, &id, fields, change_passphrase).await,
        Commands::Delete { id } => commands::cmd_delete(&ctx, &id).await,
        Commands::Generate { length } => commands::cmd_generate(&ctx, length).await,
        Commands::Alternate { passphrase } => commands::cmd_alternate(&ctx, &passphrase).await,
        Commands::MasterPassphrase => commands::cmd_master_passphrase(&ctx).await,
        Commands::Import { file } => commands::cmd_import(&ctx, &file).await,
        Commands::Export { output } => commands::cmd_export(&ctx, output.as_deref()).await,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
/// Logs go to stderr so command output can be piped.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
