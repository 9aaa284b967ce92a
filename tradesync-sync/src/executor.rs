//! Job executor: runs one dispatched job against the collaborators.
//!
//! A job is split in two phases so that a supervisor can clean up after a
//! crashed worker:
//!
//! 1. [`Executor::prepare`] resolves the scope and opens a `Running` run log
//!    entry.
//! 2. [`Executor::execute`] processes every entity under its single-writer
//!    token and writes the terminal run log status.
//!
//! Entity failures are isolated: one entity failing never stops the others,
//! and any failure makes the whole run `Failed` with the failed ids listed in
//! the run log message.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use tradesync_core::{
    EntityMapping, JobId, JobScope, LocalId, LogId, MappingFilter, MappingStatus, MappingStore,
    RetryPolicy, RunLog, RunStatus, StoreError, SyncConfig, SyncJob, SyncType,
};

use crate::collaborator::{Erp, Marketplace};
use crate::error::EntityError;
use crate::locks::EntityLocks;
use crate::reconcile::{self, Operation, OperationKind};
use crate::retry::call_with_retry;

/// Prefix of the run log message when every entity failed for availability
/// reasons.
pub const UNREACHABLE_PREFIX: &str = "collaborator unreachable";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A job whose scope has been resolved and whose run log entry is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedJob {
    pub job_id: JobId,
    pub log_id: LogId,
    pub sync_type: SyncType,
    /// Entities in scope, in processing order.
    pub entities: Vec<LocalId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityOutcome {
    Applied { operation: Operation },
    Failed { error: String, transient: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub local_id: LocalId,
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

impl EntityReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, EntityOutcome::Failed { .. })
    }
}

/// Outcome of one executed job, mirrored into its run log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub log_id: LogId,
    pub status: RunStatus,
    pub message: String,
    pub entities: Vec<EntityReport>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn failed_ids(&self) -> Vec<&LocalId> {
        self.entities
            .iter()
            .filter(|e| e.is_failure())
            .map(|e| &e.local_id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    mappings: Arc<MappingStore>,
    run_log: Arc<RunLog>,
    marketplace: Arc<dyn Marketplace>,
    erp: Arc<dyn Erp>,
    locks: EntityLocks,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Executor {
    pub fn new(
        mappings: Arc<MappingStore>,
        run_log: Arc<RunLog>,
        marketplace: Arc<dyn Marketplace>,
        erp: Arc<dyn Erp>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            mappings,
            run_log,
            marketplace,
            erp,
            locks: EntityLocks::new(),
            retry: config.retry.clone(),
            call_timeout: config.per_call_timeout(),
        }
    }

    /// Mappings a scope covers, ordered by local id.
    ///
    /// A `ByEntity` scope naming an unknown id resolves to nothing.
    pub fn resolve_scope(&self, scope: &JobScope) -> Vec<EntityMapping> {
        match scope {
            JobScope::Full => self.mappings.list(&MappingFilter::default()),
            JobScope::ByType(t) => self.mappings.list(&MappingFilter {
                entity_type: Some(*t),
                ..MappingFilter::default()
            }),
            JobScope::ByEntity(id) => self.mappings.get(id).into_iter().collect(),
        }
    }

    /// Label recorded on the run log entry for a scope.
    pub fn sync_type_for(&self, scope: &JobScope) -> SyncType {
        match scope {
            JobScope::Full => SyncType::Inventory,
            JobScope::ByType(t) => *t,
            JobScope::ByEntity(id) => self.mappings.type_of(id).unwrap_or_default(),
        }
    }

    pub fn prepare(&self, job: &SyncJob) -> Result<PreparedJob, StoreError> {
        let entities: Vec<LocalId> = self
            .resolve_scope(&job.scope)
            .into_iter()
            .map(|m| m.local_id)
            .collect();
        let sync_type = self.sync_type_for(&job.scope);
        let log_id = self.run_log.begin(sync_type)?;
        tracing::info!(
            job = %job.id,
            log = %log_id,
            scope = %job.scope,
            entities = entities.len(),
            "sync run started",
        );
        Ok(PreparedJob {
            job_id: job.id,
            log_id,
            sync_type,
            entities,
        })
    }

    /// Process every entity of a prepared job and close its run log entry.
    ///
    /// An `Err` means a store write failed; the run log entry is left for
    /// [`Executor::abandon`] to close.
    pub async fn execute(&self, prepared: &PreparedJob) -> Result<JobReport, StoreError> {
        let mut entities = Vec::with_capacity(prepared.entities.len());
        for id in &prepared.entities {
            entities.push(self.sync_one(id).await?);
        }

        let (status, message) = summarize(&entities);
        let run_log = self.run_log.clone();
        let (log_id, closing) = (prepared.log_id, message.clone());
        blocking(move || run_log.complete(log_id, status, closing)).await?;
        match status {
            RunStatus::Success => {
                tracing::info!(job = %prepared.job_id, log = %prepared.log_id, %message, "sync run succeeded")
            }
            _ => {
                tracing::warn!(job = %prepared.job_id, log = %prepared.log_id, %message, "sync run failed")
            }
        }

        Ok(JobReport {
            job_id: prepared.job_id,
            log_id: prepared.log_id,
            status,
            message,
            entities,
        })
    }

    /// [`Executor::prepare`] then [`Executor::execute`], closing the run log
    /// entry as `Failed` if execution hits a store error.
    pub async fn run(&self, job: &SyncJob) -> Result<JobReport, StoreError> {
        let prepared = self.prepare(job)?;
        match self.execute(&prepared).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.abandon(&prepared, &err.to_string());
                Err(err)
            }
        }
    }

    /// Clean up after a job that could not finish: close its run log entry
    /// as `Failed` and demote its entities still marked `Syncing`.
    ///
    /// Best effort; failures are logged, not returned.
    pub fn abandon(&self, prepared: &PreparedJob, reason: &str) {
        if let Err(e) = self
            .run_log
            .complete(prepared.log_id, RunStatus::Failed, reason.to_string())
        {
            tracing::error!(log = %prepared.log_id, error = %e, "could not close run log entry");
        }
        match self.mappings.demote_syncing(&prepared.entities) {
            Ok(demoted) if !demoted.is_empty() => {
                tracing::warn!(job = %prepared.job_id, count = demoted.len(), "demoted orphaned entities")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(job = %prepared.job_id, error = %e, "could not demote entities"),
        }
    }

    async fn sync_one(&self, id: &LocalId) -> Result<EntityReport, StoreError> {
        let _token = self.locks.acquire(id).await;

        // Re-read under the token: a job that held it may have moved the
        // baseline fingerprint.
        let mapping = self
            .with_mappings({
                let id = id.clone();
                move |m: &MappingStore| m.set_status(&id, MappingStatus::Syncing, None)
            })
            .await?;

        let outcome = match self.push_entity(&mapping).await {
            Ok(operation) => {
                let row = self
                    .with_mappings({
                        let id = id.clone();
                        let sku = mapping.remote_sku.clone();
                        let fingerprint = operation.payload.fingerprint();
                        move |m: &MappingStore| m.record_synced(&id, &sku, fingerprint)
                    })
                    .await?;
                if row.status != MappingStatus::Synced {
                    tracing::warn!(
                        entity = %id,
                        pushed = %mapping.remote_sku,
                        current = %row.remote_sku,
                        "mapping moved to another sku during sync; left out of sync",
                    );
                } else if operation.resolution.overwrites_remote_edit() {
                    tracing::warn!(
                        entity = %id,
                        sku = %mapping.remote_sku,
                        resolution = ?operation.resolution,
                        fields = ?operation.fields_changed,
                        "remote edit overwritten with local values",
                    );
                } else {
                    tracing::debug!(entity = %id, kind = ?operation.kind, "entity synced");
                }
                EntityOutcome::Applied { operation }
            }
            Err(err) => {
                let transient = err.is_transient();
                let error = err.to_string();
                self.with_mappings({
                    let id = id.clone();
                    let error = error.clone();
                    move |m: &MappingStore| m.set_status(&id, MappingStatus::Error, Some(error))
                })
                .await?;
                tracing::warn!(entity = %id, transient, error = %error, "entity sync failed");
                EntityOutcome::Failed { error, transient }
            }
        };

        Ok(EntityReport {
            local_id: id.clone(),
            outcome,
        })
    }

    /// Run a mapping store call on the blocking pool. Every write rewrites
    /// the whole mappings document, so it must not sit on a runtime worker.
    async fn with_mappings<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&MappingStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let mappings = self.mappings.clone();
        blocking(move || f(mappings.as_ref())).await
    }

    async fn push_entity(&self, mapping: &EntityMapping) -> Result<Operation, EntityError> {
        let sku = &mapping.remote_sku;
        let local_id = &mapping.local_id;
        let marketplace = &self.marketplace;
        let erp = &self.erp;

        let local = call_with_retry(&self.retry, self.call_timeout, "fetch_product", move || {
            erp.fetch_product(local_id)
        })
        .await?
        .ok_or_else(|| EntityError::MissingLocal(local_id.to_string()))?;

        let remote = call_with_retry(&self.retry, self.call_timeout, "fetch_listing", move || {
            marketplace.fetch_listing(sku)
        })
        .await?;

        let operation = reconcile::diff(
            &local,
            remote.as_ref(),
            mapping.synced_fingerprint.as_ref(),
        );

        match operation.kind {
            OperationKind::Create => {
                let payload = &operation.payload;
                call_with_retry(&self.retry, self.call_timeout, "create_listing", move || {
                    marketplace.create_listing(sku, payload)
                })
                .await?;
            }
            OperationKind::Update => {
                let payload = &operation.payload;
                let changed = operation.fields_changed.as_slice();
                call_with_retry(&self.retry, self.call_timeout, "update_listing", move || {
                    marketplace.update_listing(sku, payload, changed)
                })
                .await?;
            }
            OperationKind::NoOp => {}
        }

        Ok(operation)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        // Keep panics visible to the worker supervisor.
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(StoreError::Cancelled(err.to_string())),
    }
}

/// Terminal status and run log message for a finished set of entities.
pub fn summarize(entities: &[EntityReport]) -> (RunStatus, String) {
    let total = entities.len();
    if total == 0 {
        return (RunStatus::Success, "No mappings in scope".to_string());
    }

    let failed: Vec<&EntityReport> = entities.iter().filter(|e| e.is_failure()).collect();
    if failed.is_empty() {
        let mut created = 0;
        let mut updated = 0;
        let mut unchanged = 0;
        let mut overwritten = 0;
        for entity in entities {
            if let EntityOutcome::Applied { operation } = &entity.outcome {
                match operation.kind {
                    OperationKind::Create => created += 1,
                    OperationKind::Update => updated += 1,
                    OperationKind::NoOp => unchanged += 1,
                }
                if operation.resolution.overwrites_remote_edit() {
                    overwritten += 1;
                }
            }
        }
        let mut message = format!(
            "Synced {total} mapping(s): {created} created, {updated} updated, {unchanged} unchanged"
        );
        if overwritten > 0 {
            message.push_str(&format!("; {overwritten} remote edit(s) overwritten"));
        }
        return (RunStatus::Success, message);
    }

    let ids = failed
        .iter()
        .map(|e| e.local_id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let all_transient = failed.len() == total
        && failed
            .iter()
            .all(|e| matches!(e.outcome, EntityOutcome::Failed { transient: true, .. }));
    let message = if all_transient {
        format!("{UNREACHABLE_PREFIX}: {total} of {total} mapping(s) failed: {ids}")
    } else {
        format!("{} of {total} mapping(s) failed: {ids}", failed.len())
    };
    (RunStatus::Failed, message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
