//! `tradesync sync`: queue a sync job, optionally waiting for it.

use std::thread::sleep;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::json;

use super::client::Client;
use super::jobs::{print_job, Job};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Arguments for `tradesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Inventory (everything), Product or Order.
    pub sync_type: String,

    /// Narrow the job to one mapped product.
    #[arg(long)]
    pub entity: Option<String>,

    /// Block until the job reaches a terminal state.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trigger {
    job_id: u64,
    message: String,
}

impl SyncArgs {
    pub fn run(self, client: &Client) -> Result<()> {
        let mut body = json!({ "type": self.sync_type });
        if let Some(entity) = &self.entity {
            body["entityId"] = json!(entity);
        }
        let trigger: Trigger = client.post("/sync/trigger", &body)?;
        println!("{}", trigger.message);

        if !self.wait {
            return Ok(());
        }
        let job = loop {
            let job: Job = client.get(&format!("/jobs/{}", trigger.job_id))?;
            if job.is_terminal() {
                break job;
            }
            sleep(POLL_INTERVAL);
        };
        print_job(&job);
        if job.state == "Failed" {
            bail!("job {} failed", job.id);
        }
        Ok(())
    }
}
