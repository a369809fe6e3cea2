//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Catat - Record income and expenses by chatting
#[derive(Parser)]
#[command(name = "catat")]
#[command(about = "Conversational transaction ledger bot", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "catat.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CATAT_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the webhook server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable admin API authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// Webhook deliveries still require WEBHOOK_SECRET.
        #[arg(long)]
        no_auth: bool,
    },

    /// Show database status (encryption, size, user counts)
    Status,

    /// Manage users (list, show, upgrade, downgrade, block, unblock)
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// List a user's most recent transactions
    Transactions {
        /// Messaging address of the user
        address: String,

        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Income/expense report for a user
    Report {
        /// Messaging address of the user
        address: String,

        /// Period: today, week, month
        #[arg(short, long, default_value = "month")]
        period: String,

        /// Custom start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Custom end date (YYYY-MM-DD, exclusive)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show the transaction audit log
    Audit {
        /// Only entries for this user
        #[arg(long)]
        address: Option<String>,

        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Show the admin action log
    Actions {
        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Remove expired conversation states and old dedup rows
    Cleanup {
        /// Keep processed message ids for this many days
        #[arg(long, default_value = "7")]
        dedup_days: i64,
    },

    /// Run extraction on a message against the configured provider
    Parse {
        /// Message text, e.g. "beli bensin 50rb"
        text: Option<String>,

        /// Receipt or transfer screenshot to extract from instead
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List users, newest first
    List {
        /// Maximum number of users to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Number of users to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Show plan, quota and block status of a user
    Show {
        /// Messaging address
        address: String,
    },
    /// Activate premium
    Upgrade {
        /// Messaging address
        address: String,

        /// First day of premium (YYYY-MM-DD, default: today)
        #[arg(long)]
        start: Option<String>,

        /// Number of months
        #[arg(short, long, default_value = "1")]
        months: u32,
    },
    /// Return a user to the free plan
    Downgrade {
        /// Messaging address
        address: String,
    },
    /// Block a user
    Block {
        /// Messaging address
        address: String,
    },
    /// Unblock a user
    Unblock {
        /// Messaging address
        address: String,
    },
}
