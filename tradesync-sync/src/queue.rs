//! In-process job queue with scope deduplication.
//!
//! Admission (dedup check + enqueue) runs inside one critical section of the
//! queue-wide mutex, so two concurrent submissions can never both pass the
//! dedup check. The mutex is never held across an `.await`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;

use tradesync_core::{JobId, JobScope, JobState, LocalId, LogId, SyncJob, SyncType};

use crate::error::QueueError;

/// Finished jobs kept for status queries before the oldest are dropped.
pub const HISTORY_LIMIT: usize = 500;

/// What the caller of [`JobQueue::submit`] gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    /// The admitted job, or the already active job that covers the request.
    pub job_id: JobId,
    /// `Queued` when admitted, `Deduped` when an active job covers the scope.
    pub state: JobState,
    pub deduped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    jobs: BTreeMap<JobId, SyncJob>,
    pending: VecDeque<JobId>,
    closed: bool,
}

impl QueueState {
    fn allocate(&mut self, scope: JobScope, state: JobState) -> JobId {
        self.next_id += 1;
        let id = JobId(self.next_id);
        self.jobs.insert(
            id,
            SyncJob {
                id,
                scope,
                requested_at: Utc::now(),
                state,
                deduped_into: None,
                log_id: None,
                finished_at: None,
            },
        );
        id
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut SyncJob, QueueError> {
        self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))
    }

    /// Drop the oldest finished jobs beyond [`HISTORY_LIMIT`].
    fn prune(&mut self) {
        let finished: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.state.is_terminal())
            .map(|j| j.id)
            .collect();
        if finished.len() <= HISTORY_LIMIT {
            return;
        }
        for id in &finished[..finished.len() - HISTORY_LIMIT] {
            self.jobs.remove(id);
        }
    }
}

#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    dedup_enabled: bool,
}

impl JobQueue {
    pub fn new(dedup_enabled: bool) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            dedup_enabled,
        }
    }

    /// Admit a sync request, or point the caller at the active job that
    /// already covers it.
    ///
    /// `type_of` resolves entity types for `ByType ⊇ ByEntity` containment.
    pub fn submit<F>(&self, scope: JobScope, type_of: F) -> Result<SubmitOutcome, QueueError>
    where
        F: Fn(&LocalId) -> Option<SyncType>,
    {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }

        if self.dedup_enabled {
            let covering = state
                .jobs
                .values()
                .find(|job| job.state.is_active() && job.scope.covers(&scope, &type_of))
                .map(|job| job.id);

            if let Some(existing) = covering {
                let record = state.allocate(scope.clone(), JobState::Deduped);
                if let Some(job) = state.jobs.get_mut(&record) {
                    job.deduped_into = Some(existing);
                    job.finished_at = Some(Utc::now());
                }
                state.prune();
                tracing::info!(
                    scope = %scope,
                    existing = %existing,
                    "sync request deduped into active job",
                );
                return Ok(SubmitOutcome {
                    job_id: existing,
                    state: JobState::Deduped,
                    deduped: true,
                });
            }
        }

        let id = state.allocate(scope.clone(), JobState::Queued);
        state.pending.push_back(id);
        drop(state);

        self.wake.notify_one();
        tracing::info!(job = %id, scope = %scope, "sync job queued");
        Ok(SubmitOutcome {
            job_id: id,
            state: JobState::Queued,
            deduped: false,
        })
    }

    /// Cancel a job that has not been dispatched yet.
    pub fn cancel(&self, id: JobId) -> Result<SyncJob, QueueError> {
        let mut state = self.lock();
        let job = state.job_mut(id)?;
        match job.state {
            JobState::Queued => {
                job.state = JobState::Cancelled;
                job.finished_at = Some(Utc::now());
                let cancelled = job.clone();
                state.pending.retain(|pending| *pending != id);
                state.prune();
                tracing::info!(job = %id, "sync job cancelled");
                Ok(cancelled)
            }
            JobState::Running => Err(QueueError::AlreadyRunning(id)),
            _ => Err(QueueError::AlreadyFinished(id)),
        }
    }

    /// Wait for the next queued job and mark it `Running`.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn next_job(&self) -> Option<SyncJob> {
        loop {
            let notified = self.wake.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(job) = Self::pop_next(&mut state) {
                    let more = !state.pending.is_empty();
                    drop(state);
                    if more {
                        // A single stored permit may have stood for several
                        // submissions; pass the wakeup on.
                        self.wake.notify_one();
                    }
                    return Some(job);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`JobQueue::next_job`].
    pub fn try_next_job(&self) -> Option<SyncJob> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        Self::pop_next(&mut state)
    }

    fn pop_next(state: &mut QueueState) -> Option<SyncJob> {
        while let Some(id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Queued {
                continue;
            }
            job.state = JobState::Running;
            return Some(job.clone());
        }
        None
    }

    /// Attach the run log entry created for a dispatched job.
    pub fn attach_log(&self, id: JobId, log_id: LogId) -> Result<(), QueueError> {
        let mut state = self.lock();
        state.job_mut(id)?.log_id = Some(log_id);
        Ok(())
    }

    /// Move a running job to its terminal state.
    pub fn finish(&self, id: JobId, succeeded: bool) -> Result<SyncJob, QueueError> {
        let next = if succeeded {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        let mut state = self.lock();
        let job = state.job_mut(id)?;
        if !job.state.can_transition_to(next) {
            return Err(match job.state {
                JobState::Queued => QueueError::NotRunning(id),
                _ => QueueError::AlreadyFinished(id),
            });
        }
        job.state = next;
        job.finished_at = Some(Utc::now());
        let finished = job.clone();
        state.prune();
        Ok(finished)
    }

    pub fn get(&self, id: JobId) -> Result<SyncJob, QueueError> {
        self.lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or(QueueError::JobNotFound(id))
    }

    /// Up to `limit` jobs, newest first.
    pub fn list_recent(&self, limit: usize) -> Vec<SyncJob> {
        self.lock().jobs.values().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Queued => stats.queued += 1,
                JobState::Running => stats.running += 1,
                _ => {}
            }
        }
        stats
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Stop handing out jobs and release every waiting worker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn no_types(_: &LocalId) -> Option<SyncType> {
        None
    }

    fn entity(id: &str) -> JobScope {
        JobScope::ByEntity(LocalId::from(id))
    }

    #[test]
    fn pending_full_dedupes_narrower_scopes() {
        let queue = JobQueue::new(true);
        let full = queue.submit(JobScope::Full, no_types).unwrap();
        assert!(!full.deduped);

        for scope in [JobScope::Full, JobScope::ByType(SyncType::Order), entity("9")] {
            let out = queue.submit(scope, no_types).unwrap();
            assert!(out.deduped);
            assert_eq!(out.state, JobState::Deduped);
            assert_eq!(out.job_id, full.job_id);
        }
        assert_eq!(queue.stats().queued, 1);
    }

    #[test]
    fn by_type_dedupes_entity_of_same_type_only() {
        let queue = JobQueue::new(true);
        let type_of = |id: &LocalId| match id.0.as_str() {
            "p1" => Some(SyncType::Product),
            "o1" => Some(SyncType::Order),
            _ => None,
        };
        let products = queue
            .submit(JobScope::ByType(SyncType::Product), type_of)
            .unwrap();

        let covered = queue.submit(entity("p1"), type_of).unwrap();
        assert!(covered.deduped);
        assert_eq!(covered.job_id, products.job_id);

        let other = queue.submit(entity("o1"), type_of).unwrap();
        assert!(!other.deduped);
    }

    #[test]
    fn narrower_active_job_does_not_cover_wider_request() {
        let queue = JobQueue::new(true);
        queue.submit(entity("1"), no_types).unwrap();
        let full = queue.submit(JobScope::Full, no_types).unwrap();
        assert!(!full.deduped);
        assert_eq!(queue.stats().queued, 2);
    }

    #[test]
    fn running_job_still_dedupes() {
        let queue = JobQueue::new(true);
        let first = queue.submit(JobScope::Full, no_types).unwrap();
        let running = queue.try_next_job().expect("dispatch");
        assert_eq!(running.state, JobState::Running);

        let again = queue.submit(entity("x"), no_types).unwrap();
        assert!(again.deduped);
        assert_eq!(again.job_id, first.job_id);
    }

    #[test]
    fn finished_job_no_longer_dedupes() {
        let queue = JobQueue::new(true);
        let first = queue.submit(JobScope::Full, no_types).unwrap();
        queue.try_next_job().unwrap();
        queue.finish(first.job_id, true).unwrap();

        let second = queue.submit(JobScope::Full, no_types).unwrap();
        assert!(!second.deduped);
        assert_ne!(second.job_id, first.job_id);
    }

    #[test]
    fn dedup_disabled_admits_everything() {
        let queue = JobQueue::new(false);
        queue.submit(JobScope::Full, no_types).unwrap();
        let second = queue.submit(JobScope::Full, no_types).unwrap();
        assert!(!second.deduped);
        assert_eq!(queue.stats().queued, 2);
    }

    #[test]
    fn deduped_request_is_recorded_as_terminal() {
        let queue = JobQueue::new(true);
        let first = queue.submit(JobScope::Full, no_types).unwrap();
        queue.submit(JobScope::Full, no_types).unwrap();

        let recent = queue.list_recent(10);
        let record = recent
            .iter()
            .find(|j| j.state == JobState::Deduped)
            .expect("deduped record");
        assert_eq!(record.deduped_into, Some(first.job_id));
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn cancel_rules() {
        let queue = JobQueue::new(false);
        let a = queue.submit(JobScope::Full, no_types).unwrap().job_id;
        let b = queue.submit(JobScope::Full, no_types).unwrap().job_id;

        assert_eq!(queue.try_next_job().unwrap().id, a);
        assert_eq!(queue.cancel(a), Err(QueueError::AlreadyRunning(a)));

        let cancelled = queue.cancel(b).unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);
        assert_eq!(queue.cancel(b), Err(QueueError::AlreadyFinished(b)));
        assert!(queue.try_next_job().is_none(), "cancelled job must not dispatch");
        assert_eq!(queue.cancel(JobId(99)), Err(QueueError::JobNotFound(JobId(99))));
    }

    #[test]
    fn terminal_state_is_immutable() {
        let queue = JobQueue::new(true);
        let id = queue.submit(JobScope::Full, no_types).unwrap().job_id;
        queue.try_next_job().unwrap();
        queue.finish(id, false).unwrap();

        assert_eq!(queue.finish(id, true), Err(QueueError::AlreadyFinished(id)));
        assert_eq!(queue.get(id).unwrap().state, JobState::Failed);
    }

    #[test]
    fn dispatch_is_fifo() {
        let queue = JobQueue::new(false);
        let ids: Vec<_> = (0..3)
            .map(|_| queue.submit(JobScope::Full, no_types).unwrap().job_id)
            .collect();
        let dispatched: Vec<_> = std::iter::from_fn(|| queue.try_next_job())
            .map(|j| j.id)
            .collect();
        assert_eq!(dispatched, ids);
    }

    #[test]
    fn concurrent_submissions_admit_exactly_one() {
        let queue = Arc::new(JobQueue::new(true));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || queue.submit(JobScope::Full, no_types).unwrap())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let admitted: Vec<_> = outcomes.iter().filter(|o| !o.deduped).collect();
        assert_eq!(admitted.len(), 1);
        assert!(outcomes.iter().all(|o| o.job_id == admitted[0].job_id));
    }

    #[tokio::test]
    async fn next_job_wakes_on_submit_and_close() {
        let queue = Arc::new(JobQueue::new(true));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_job().await })
        };
        tokio::task::yield_now().await;
        let id = queue.submit(JobScope::Full, no_types).unwrap().job_id;
        let job = waiter.await.unwrap().expect("job");
        assert_eq!(job.id, id);

        let idle = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_job().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert!(idle.await.unwrap().is_none());
        assert_eq!(
            queue.submit(JobScope::Full, no_types),
            Err(QueueError::Closed)
        );
    }

    #[test]
    fn history_is_bounded() {
        let queue = JobQueue::new(false);
        for _ in 0..(HISTORY_LIMIT + 20) {
            let id = queue.submit(JobScope::Full, no_types).unwrap().job_id;
            queue.cancel(id).unwrap();
        }
        assert_eq!(queue.list_recent(usize::MAX).len(), HISTORY_LIMIT);
    }
}
