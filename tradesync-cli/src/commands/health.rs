//! `tradesync health`: queue and worker pool summary.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;

use super::client::Client;
use super::paint_status;

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Print the raw JSON answer.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: String,
    queue_available: bool,
    workers_active: usize,
    worker_pool_size: usize,
    last_successful_sync: Option<DateTime<Utc>>,
    pending_tasks: usize,
    running_tasks: usize,
}

impl HealthArgs {
    pub fn run(self, client: &Client) -> Result<()> {
        if self.json {
            let raw: serde_json::Value = client.get("/health")?;
            println!("{}", serde_json::to_string_pretty(&raw)?);
            return Ok(());
        }

        let health: Health = client.get("/health")?;
        println!("daemon:   {}", paint_status(&health.status));
        println!(
            "queue:    {} ({} pending, {} running)",
            if health.queue_available { "available" } else { "closed" },
            health.pending_tasks,
            health.running_tasks,
        );
        println!(
            "workers:  {}/{} alive",
            health.workers_active, health.worker_pool_size
        );
        match health.last_successful_sync {
            Some(at) => println!("last ok:  {}", at.to_rfc3339()),
            None => println!("last ok:  never"),
        }
        Ok(())
    }
}
