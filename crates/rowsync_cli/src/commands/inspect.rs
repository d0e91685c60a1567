//! Inspect command implementation.

use rowsync_cli::CliError;
use rowsync_store::SqliteStore;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Known client groups.
    pub client_groups: u64,
    /// Known clients.
    pub clients: u64,
    /// Stored lists.
    pub lists: u64,
    /// Stored todos.
    pub todos: u64,
    /// Last row version handed out.
    pub row_version: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), CliError> {
    if !path.exists() {
        return Err(CliError::Usage(format!("No database found at {:?}", path)));
    }

    let file_size = std::fs::metadata(path)?.len();
    let stats = SqliteStore::open(path)?.stats()?;
    let result = InspectResult {
        path: path.display().to_string(),
        file_size,
        client_groups: stats.client_groups,
        clients: stats.clients,
        lists: stats.lists,
        todos: stats.todos,
        row_version: stats.row_version,
    };

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| CliError::Usage(format!("cannot encode result: {e}")))?;
            println!("{json}");
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("RowSync Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Sync state:");
    println!("  Client groups: {}", result.client_groups);
    println!("  Clients:       {}", result.clients);
    println!("  Row version:   {}", result.row_version);
    println!();
    println!("Entities:");
    println!("  Lists: {}", result.lists);
    println!("  Todos: {}", result.todos);
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
