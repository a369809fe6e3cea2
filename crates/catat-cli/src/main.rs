//! Catat CLI - Conversational transaction ledger
//!
//! Usage:
//!   catat init                    Initialize database
//!   catat serve --port 3000       Start webhook server
//!   catat users upgrade <address> Activate premium
//!   catat report <address>        Income/expense report

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_users_list(&db, 20, 0),
                Some(UsersAction::List { limit, offset }) => {
                    commands::cmd_users_list(&db, limit, offset)
                }
                Some(UsersAction::Show { address }) => commands::cmd_users_show(&db, &address),
                Some(UsersAction::Upgrade {
                    address,
                    start,
                    months,
                }) => commands::cmd_users_upgrade(&db, &address, start.as_deref(), months),
                Some(UsersAction::Downgrade { address }) => {
                    commands::cmd_users_downgrade(&db, &address)
                }
                Some(UsersAction::Block { address }) => {
                    commands::cmd_users_set_blocked(&db, &address, true)
                }
                Some(UsersAction::Unblock { address }) => {
                    commands::cmd_users_set_blocked(&db, &address, false)
                }
            }
        }
        Commands::Transactions { address, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, &address, limit)
        }
        Commands::Report {
            address,
            period,
            from,
            to,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let (start, end) = commands::resolve_period(&period, from.as_deref(), to.as_deref())?;
            commands::cmd_report(&db, &address, start, end)
        }
        Commands::Audit { address, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, address.as_deref(), limit)
        }
        Commands::Actions { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_admin_actions(&db, limit)
        }
        Commands::Cleanup { dedup_days } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_cleanup(&db, dedup_days)
        }
        Commands::Parse { text, image } => {
            commands::cmd_parse(text.as_deref(), image.as_deref()).await
        }
    }
}
