use chrono::{DateTime, Utc};
use serde::Serialize;

use tradesync_core::{
    EntityMapping, JobState, MappingStatus, RunLogEntry, RunStatus, SyncJob, SyncType,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` when the queue accepts jobs and at least one worker is alive.
    pub status: &'static str,
    pub queue_available: bool,
    pub workers_active: usize,
    pub worker_pool_size: usize,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub pending_tasks: usize,
    pub running_tasks: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDto {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub sync_type: SyncType,
    pub message: String,
}

impl From<RunLogEntry> for LogDto {
    fn from(entry: RunLogEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            timestamp: entry.timestamp,
            status: entry.status,
            sync_type: entry.sync_type,
            message: entry.message,
        }
    }
}

/// Odoo product ids are integers; other local ids pass through as strings.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProductIdDto {
    Number(i64),
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDto {
    pub id: String,
    pub odoo_product_id: ProductIdDto,
    pub ebay_sku: String,
    pub odoo_name: String,
    pub entity_type: SyncType,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub status: MappingStatus,
    pub last_error: Option<String>,
}

impl From<EntityMapping> for MappingDto {
    fn from(m: EntityMapping) -> Self {
        let odoo_product_id = match m.local_id.0.parse::<i64>() {
            Ok(n) => ProductIdDto::Number(n),
            Err(_) => ProductIdDto::Text(m.local_id.0.clone()),
        };
        Self {
            id: m.local_id.0,
            odoo_product_id,
            ebay_sku: m.remote_sku.0,
            odoo_name: m.display_name,
            entity_type: m.entity_type,
            last_synced_at: m.last_synced_at,
            status: m.status,
            last_error: m.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    /// `Queued` or `Deduped`.
    pub status: JobState,
    pub job_id: u64,
    pub deduped: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: u64,
    pub scope: String,
    pub state: JobState,
    pub requested_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deduped_into: Option<u64>,
    pub log_id: Option<String>,
}

impl From<SyncJob> for JobDto {
    fn from(job: SyncJob) -> Self {
        Self {
            id: job.id.0,
            scope: job.scope.label(),
            state: job.state,
            requested_at: job.requested_at,
            finished_at: job.finished_at,
            deduped_into: job.deduped_into.map(|id| id.0),
            log_id: job.log_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestOdooResponse {
    pub success: bool,
    pub message: String,
}
