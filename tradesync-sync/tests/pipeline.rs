use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tradesync_core::{
    EntityMapping, JobScope, JobState, LocalId, MappingStatus, MappingStore, RemoteSku, RunLog,
    RunStatus, Snapshot, StoreError, SyncConfig, SyncType,
};
use tradesync_sync::memory::{MemoryErp, MemoryMarketplace};
use tradesync_sync::{CollaboratorError, Executor, JobQueue};

fn snap(title: &str, quantity: i64, price_cents: i64) -> Snapshot {
    Snapshot {
        title: title.to_string(),
        quantity,
        price_cents,
    }
}

struct Harness {
    home: TempDir,
    mappings: Arc<MappingStore>,
    run_log: Arc<RunLog>,
    market: Arc<MemoryMarketplace>,
    erp: Arc<MemoryErp>,
    queue: Arc<JobQueue>,
    executor: Arc<Executor>,
}

fn harness() -> Harness {
    let home = TempDir::new().expect("home");
    let mappings = Arc::new(MappingStore::open_at(home.path()).expect("mappings"));
    let run_log = Arc::new(RunLog::open_at(home.path()).expect("run log"));
    let market = Arc::new(MemoryMarketplace::new());
    let erp = Arc::new(MemoryErp::new());
    let config = SyncConfig::default();
    let executor = Arc::new(Executor::new(
        mappings.clone(),
        run_log.clone(),
        market.clone(),
        erp.clone(),
        &config,
    ));
    Harness {
        home,
        mappings,
        run_log,
        market,
        erp,
        queue: Arc::new(JobQueue::new(config.dedup_enabled)),
        executor,
    }
}

impl Harness {
    /// Drain the queue the way one worker would.
    async fn drain(&self) {
        while let Some(job) = self.queue.try_next_job() {
            let prepared = self.executor.prepare(&job).expect("prepare");
            self.queue.attach_log(job.id, prepared.log_id).expect("attach");
            let report = self.executor.execute(&prepared).await.expect("execute");
            self.queue
                .finish(job.id, report.succeeded())
                .expect("finish");
        }
    }

    fn submit(&self, scope: JobScope) -> tradesync_sync::SubmitOutcome {
        let mappings = self.mappings.clone();
        self.queue
            .submit(scope, move |id| mappings.type_of(id))
            .expect("submit")
    }
}

#[tokio::test(start_paused = true)]
async fn full_sync_of_three_mappings_pushes_two() {
    let h = harness();
    for (id, sku, name) in [("1", "A", "Desk"), ("2", "B", "Chair"), ("3", "C", "Lamp")] {
        h.mappings
            .upsert(EntityMapping::new(id, sku, name, SyncType::Product))
            .expect("upsert");
    }
    h.erp.insert("1", snap("Desk", 4, 12000));
    h.erp.insert("2", snap("Chair", 10, 4500));
    h.erp.insert("3", snap("Lamp", 7, 1999));
    h.market.insert("B", snap("Chair", 9, 4500));
    h.market.insert("C", snap("Lamp", 7, 1999));

    let outcome = h.submit(JobScope::Full);
    h.drain().await;

    assert_eq!(h.market.pushes().len(), 2);
    let job = h.queue.get(outcome.job_id).expect("job");
    assert_eq!(job.state, JobState::Succeeded);

    let entry = h.run_log.get(job.log_id.expect("log id")).expect("entry");
    assert_eq!(entry.status, RunStatus::Success);
    assert!(h
        .mappings
        .list(&Default::default())
        .iter()
        .all(|m| m.status == MappingStatus::Synced));
}

#[tokio::test(start_paused = true)]
async fn overlapping_requests_run_once() {
    let h = harness();
    h.mappings
        .upsert(EntityMapping::new("p1", "P1", "Pot", SyncType::Product))
        .expect("upsert");
    h.erp.insert("p1", snap("Pot", 2, 800));

    let by_type = h.submit(JobScope::ByType(SyncType::Product));
    let by_entity = h.submit(JobScope::ByEntity(LocalId::from("p1")));
    assert!(by_entity.deduped);
    assert_eq!(by_entity.job_id, by_type.job_id);

    h.drain().await;
    assert_eq!(h.run_log.list(10).len(), 1, "one run for both requests");
}

#[tokio::test(start_paused = true)]
async fn failed_job_reports_failed_entity_and_keeps_others() {
    let h = harness();
    for id in ["1", "2"] {
        h.mappings
            .upsert(EntityMapping::new(id, format!("S{id}"), id, SyncType::Order))
            .expect("upsert");
        h.erp.insert(id, snap(id, 1, 100));
    }
    h.market
        .fail_always("S2", CollaboratorError::Permanent("HTTP 400".into()));

    let outcome = h.submit(JobScope::ByType(SyncType::Order));
    h.drain().await;

    let job = h.queue.get(outcome.job_id).expect("job");
    assert_eq!(job.state, JobState::Failed);
    let entry = h.run_log.get(job.log_id.expect("log id")).expect("entry");
    assert_eq!(entry.sync_type, SyncType::Order);
    assert!(entry.message.ends_with(": 2"), "{}", entry.message);
    assert_eq!(
        h.mappings.get(&LocalId::from("1")).expect("row").status,
        MappingStatus::Synced
    );
}

#[tokio::test(start_paused = true)]
async fn restart_recovers_interrupted_state() {
    let h = harness();
    let id = LocalId::from("1");
    h.mappings
        .upsert(EntityMapping::new("1", "A", "Desk", SyncType::Product))
        .expect("upsert");
    h.erp.insert("1", snap("Desk", 4, 12000));
    h.submit(JobScope::Full);
    h.drain().await;
    let synced = h.mappings.get(&id).expect("row");
    assert_eq!(synced.status, MappingStatus::Synced);

    // A second run dies while the entity is marked Syncing.
    h.erp.insert("1", snap("Desk", 3, 12000));
    let job = {
        h.submit(JobScope::Full);
        h.queue.try_next_job().expect("dispatch")
    };
    let prepared = h.executor.prepare(&job).expect("prepare");
    h.mappings
        .set_status(&id, MappingStatus::Syncing, None)
        .expect("syncing");

    // Simulate a process restart: reopen both stores from disk.
    let mappings = MappingStore::open_at(h.home.path()).expect("reopen mappings");
    let run_log = RunLog::open_at(h.home.path()).expect("reopen run log");

    assert_eq!(mappings.recover_syncing().expect("recover"), vec![id.clone()]);
    assert_eq!(run_log.recover_interrupted().expect("recover"), vec![prepared.log_id]);

    let entry = run_log.get(prepared.log_id).expect("entry");
    assert_eq!(entry.status, RunStatus::Failed);

    let row = mappings.get(&id).expect("row");
    assert_eq!(row.status, MappingStatus::OutOfSync);
    assert_eq!(row.remote_sku, synced.remote_sku);
    assert_eq!(row.display_name, synced.display_name);
    assert_eq!(row.entity_type, synced.entity_type);
    assert_eq!(row.last_synced_at, synced.last_synced_at);
    assert_eq!(row.synced_fingerprint, synced.synced_fingerprint);
    assert!(row.synced_fingerprint.is_some());

    // The recovered mapping syncs normally afterwards.
    h.queue.finish(job.id, false).expect("finish");
    h.submit(JobScope::Full);
    h.drain().await;
    assert_eq!(
        h.mappings.get(&id).expect("row").status,
        MappingStatus::Synced
    );
    assert_eq!(
        h.market.listing(&RemoteSku::from("A")),
        Some(snap("Desk", 3, 12000))
    );
}

#[tokio::test(start_paused = true)]
async fn sku_change_is_refused_while_entity_syncs() {
    let h = harness();
    let id = LocalId::from("1");
    h.mappings
        .upsert(EntityMapping::new("1", "OLD", "Desk", SyncType::Product))
        .expect("upsert");
    h.erp.insert("1", snap("Desk", 4, 12000));
    h.market.set_latency(Duration::from_millis(100));

    h.submit(JobScope::ByEntity(id.clone()));
    let job = h.queue.try_next_job().expect("dispatch");
    let prepared = h.executor.prepare(&job).expect("prepare");
    let running = {
        let executor = h.executor.clone();
        tokio::spawn(async move { executor.execute(&prepared).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.mappings.get(&id).expect("row").status, MappingStatus::Syncing);
    let err = h
        .mappings
        .upsert(EntityMapping::new("1", "NEW", "Desk", SyncType::Product))
        .expect_err("sku change during sync");
    assert!(matches!(err, StoreError::MappingBusy(_)), "got: {err}");

    let report = running.await.expect("join").expect("execute");
    assert!(report.succeeded());
    h.queue.finish(job.id, true).expect("finish");

    let row = h.mappings.get(&id).expect("row");
    assert_eq!(row.remote_sku, RemoteSku::from("OLD"));
    assert_eq!(row.status, MappingStatus::Synced);
    assert_eq!(
        h.market.listing(&RemoteSku::from("OLD")),
        Some(snap("Desk", 4, 12000))
    );

    // Once the entity is idle the move goes through and the next run
    // creates the listing under the new SKU.
    let moved = h
        .mappings
        .upsert(EntityMapping::new("1", "NEW", "Desk", SyncType::Product))
        .expect("move");
    assert_eq!(moved.status, MappingStatus::OutOfSync);
    h.submit(JobScope::Full);
    h.drain().await;

    let row = h.mappings.get(&id).expect("row");
    assert_eq!(row.remote_sku, RemoteSku::from("NEW"));
    assert_eq!(row.status, MappingStatus::Synced);
    assert_eq!(
        h.market.listing(&RemoteSku::from("NEW")),
        Some(snap("Desk", 4, 12000))
    );
}
