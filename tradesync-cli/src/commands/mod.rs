pub mod client;
pub mod health;
pub mod jobs;
pub mod logs;
pub mod mappings;
pub mod serve;
pub mod sync;
pub mod test_odoo;

use colored::{ColoredString, Colorize};

/// Colour a status word the way every table in the CLI does.
pub fn paint_status(status: &str) -> ColoredString {
    match status {
        "Synced" | "Success" | "Succeeded" | "ok" => status.green().bold(),
        "Error" | "Failed" | "degraded" => status.red().bold(),
        "Syncing" | "Running" | "Queued" => status.cyan(),
        "OutOfSync" => status.yellow(),
        _ => status.bright_black(),
    }
}
