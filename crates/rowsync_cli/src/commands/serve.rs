//! Serve command implementation.

use rowsync_cli::CliError;
use rowsync_server::{BroadcastNotifier, ServerConfig, SyncServer};
use rowsync_store::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Options for `serve`.
#[derive(Debug)]
pub struct ServeOptions {
    /// Server configuration.
    pub config: ServerConfig,
    /// SQLite file; in-memory when absent.
    pub database: Option<PathBuf>,
}

/// Runs the serve command until Ctrl-C.
pub fn run(options: ServeOptions) -> Result<(), CliError> {
    let ServeOptions { config, database } = options;
    let addr = config.bind_addr;

    let mut builder = SyncServer::builder(config).notifier(Arc::new(BroadcastNotifier::default()));
    match &database {
        Some(path) => {
            info!(path = %path.display(), "opening SQLite store");
            builder = builder.store(Arc::new(SqliteStore::open(path)?));
        }
        None => info!("using in-memory store; data is lost on exit"),
    }
    let server = Arc::new(builder.build());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(rowsync_cli::serve(server, addr))
}
