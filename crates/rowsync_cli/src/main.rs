//! RowSync CLI
//!
//! Runs and inspects a RowSync push/pull sync server.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP sync server
//! - `token` - Issue a bearer token for a user
//! - `inspect` - Display store statistics

mod commands;

use clap::{Parser, Subcommand};
use rowsync_server::ServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// RowSync sync server and tools.
#[derive(Parser)]
#[command(name = "rowsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// SQLite database file (in-memory if omitted)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Require bearer tokens signed with this secret
        #[arg(long, env = "ROWSYNC_AUTH_SECRET")]
        auth_secret: Option<String>,

        /// Token lifetime in seconds
        #[arg(long, default_value = "86400")]
        token_expiry_secs: u64,

        /// Keep at most this many client view records (unbounded if omitted)
        #[arg(long)]
        cvr_cache_capacity: Option<usize>,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout_secs: u64,

        /// Maximum mutations per push
        #[arg(long, default_value = "100")]
        max_push_batch: usize,

        /// Halt a push at the first rejected mutation instead of skipping it
        #[arg(long)]
        halt_on_failed_mutation: bool,
    },

    /// Issue a bearer token for a user
    Token {
        /// Shared secret (same as the server's --auth-secret)
        #[arg(short, long, env = "ROWSYNC_AUTH_SECRET")]
        secret: String,

        /// User ID to embed
        #[arg(short, long)]
        user: String,
    },

    /// Display store statistics
    Inspect {
        /// SQLite database file
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            database,
            auth_secret,
            token_expiry_secs,
            cvr_cache_capacity,
            request_timeout_secs,
            max_push_batch,
            halt_on_failed_mutation,
        } => {
            let mut config = ServerConfig::new(bind)
                .with_request_timeout(Duration::from_secs(request_timeout_secs))
                .with_max_push_batch(max_push_batch)
                .with_skip_failed_mutations(!halt_on_failed_mutation)
                .with_token_expiry(Duration::from_secs(token_expiry_secs));
            if let Some(capacity) = cvr_cache_capacity {
                config = config.with_cvr_cache_capacity(capacity);
            }
            if let Some(secret) = auth_secret {
                config = config.with_auth(secret.into_bytes());
            }
            commands::serve::run(commands::serve::ServeOptions { config, database })?;
        }
        Commands::Token { secret, user } => {
            commands::token::run(&secret, &user)?;
        }
        Commands::Inspect { path, format } => {
            commands::inspect::run(&path, &format)?;
        }
        Commands::Version => {
            println!("RowSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Protocol: push v{}, pull v{}",
                rowsync_protocol::PUSH_VERSION,
                rowsync_protocol::PULL_VERSION
            );
        }
    }

    Ok(())
}
