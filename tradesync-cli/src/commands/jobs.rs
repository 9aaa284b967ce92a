//! `tradesync job` and `tradesync cancel`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;
use serde_json::json;

use super::client::Client;
use super::paint_status;

#[derive(Args, Debug)]
pub struct JobArgs {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u64,
    pub scope: String,
    pub state: String,
    pub requested_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deduped_into: Option<u64>,
    pub log_id: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state.as_str(),
            "Succeeded" | "Failed" | "Deduped" | "Cancelled"
        )
    }
}

pub fn print_job(job: &Job) {
    println!("job {} [{}] {}", job.id, job.scope, paint_status(&job.state));
    println!("  requested: {}", job.requested_at.to_rfc3339());
    if let Some(at) = job.finished_at {
        println!("  finished:  {}", at.to_rfc3339());
    }
    if let Some(into) = job.deduped_into {
        println!("  covered by job {into}");
    }
    if let Some(log) = &job.log_id {
        println!("  run log:   {log}");
    }
}

impl JobArgs {
    pub fn show(self, client: &Client) -> Result<()> {
        let job: Job = client.get(&format!("/jobs/{}", self.id))?;
        print_job(&job);
        Ok(())
    }

    pub fn cancel(self, client: &Client) -> Result<()> {
        let job: Job = client.post(&format!("/jobs/{}/cancel", self.id), &json!({}))?;
        print_job(&job);
        Ok(())
    }
}
