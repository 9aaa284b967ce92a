//! Bounded worker pool draining the job queue.
//!
//! Each worker runs the execution phase of a job in its own spawned task so
//! that a panic surfaces as a `JoinError` instead of killing the worker. The
//! crashed job is failed and its orphaned entities are demoted.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use tradesync_core::SyncJob;
use tradesync_sync::{Executor, JobQueue};

/// Live counters for `/health`.
#[derive(Debug, Default)]
pub struct WorkerStats {
    alive: AtomicUsize,
    busy: AtomicUsize,
}

impl WorkerStats {
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Decrements a counter when dropped.
struct Counted<'a>(&'a AtomicUsize);

impl<'a> Counted<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Counted<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn spawn_workers(
    size: usize,
    queue: Arc<JobQueue>,
    executor: Arc<Executor>,
    stats: Arc<WorkerStats>,
) -> Vec<JoinHandle<()>> {
    (0..size)
        .map(|index| {
            let queue = queue.clone();
            let executor = executor.clone();
            let stats = stats.clone();
            tokio::spawn(async move { worker_loop(index, queue, executor, stats).await })
        })
        .collect()
}

async fn worker_loop(
    index: usize,
    queue: Arc<JobQueue>,
    executor: Arc<Executor>,
    stats: Arc<WorkerStats>,
) {
    let _alive = Counted::enter(&stats.alive);
    tracing::debug!(worker = index, "worker started");
    while let Some(job) = queue.next_job().await {
        let _busy = Counted::enter(&stats.busy);
        tracing::info!(worker = index, job = %job.id, scope = %job.scope, "job dispatched");
        process_job(&queue, &executor, job).await;
    }
    tracing::debug!(worker = index, "worker stopped");
}

/// Run one dispatched job to a terminal state, whatever happens inside it.
pub async fn process_job(queue: &JobQueue, executor: &Arc<Executor>, job: SyncJob) {
    let prepared = match executor.prepare(&job) {
        Ok(prepared) => prepared,
        Err(err) => {
            tracing::error!(job = %job.id, error = %err, "could not start sync run");
            finish(queue, &job, false);
            return;
        }
    };
    if let Err(err) = queue.attach_log(job.id, prepared.log_id) {
        tracing::warn!(job = %job.id, error = %err, "could not attach run log entry");
    }

    let handle = {
        let executor = executor.clone();
        let prepared = prepared.clone();
        tokio::spawn(async move { executor.execute(&prepared).await })
    };

    let succeeded = match handle.await {
        Ok(Ok(report)) => report.succeeded(),
        Ok(Err(err)) => {
            executor.abandon(&prepared, &format!("store error: {err}"));
            false
        }
        Err(join_err) => {
            let reason = format!("worker crashed: {}", describe_join_error(join_err));
            tracing::error!(job = %job.id, %reason, "sync task crashed");
            executor.abandon(&prepared, &reason);
            false
        }
    };
    finish(queue, &job, succeeded);
}

fn finish(queue: &JobQueue, job: &SyncJob, succeeded: bool) {
    match queue.finish(job.id, succeeded) {
        Ok(done) => tracing::info!(job = %done.id, state = %done.state, "job finished"),
        Err(err) => tracing::warn!(job = %job.id, error = %err, "could not finish job"),
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }

    #[test]
    fn counted_guard_restores_counter() {
        let counter = AtomicUsize::new(0);
        {
            let _a = Counted::enter(&counter);
            let _b = Counted::enter(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
