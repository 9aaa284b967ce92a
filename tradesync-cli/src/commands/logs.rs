//! `tradesync logs`: recent sync runs, newest first.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use super::client::Client;
use super::paint_status;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Maximum number of entries to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Log {
    id: String,
    timestamp: DateTime<Utc>,
    status: String,
    sync_type: String,
    message: String,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "started")]
    started: String,
    #[tabled(rename = "type")]
    sync_type: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "message")]
    message: String,
}

impl LogsArgs {
    pub fn run(self, client: &Client) -> Result<()> {
        let logs: Vec<Log> = client.get(&format!("/logs?limit={}", self.limit))?;
        if logs.is_empty() {
            println!("No sync runs recorded yet.");
            return Ok(());
        }

        let rows: Vec<LogRow> = logs
            .into_iter()
            .map(|log| LogRow {
                id: log.id,
                started: log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                sync_type: log.sync_type,
                status: paint_status(&log.status).to_string(),
                message: log.message,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
