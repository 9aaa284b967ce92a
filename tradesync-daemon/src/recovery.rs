//! Boot-time recovery of state left behind by a crash or kill.

use serde::Serialize;

use tradesync_core::{LocalId, LogId, MappingStore, RunLog, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Mappings demoted from `Syncing` to `OutOfSync`.
    pub demoted: Vec<LocalId>,
    /// Run log entries closed as `Failed`.
    pub interrupted: Vec<LogId>,
}

/// Must run before any worker starts: nothing can legitimately be in flight.
pub fn recover(mappings: &MappingStore, run_log: &RunLog) -> Result<RecoveryReport, StoreError> {
    let report = RecoveryReport {
        demoted: mappings.recover_syncing()?,
        interrupted: run_log.recover_interrupted()?,
    };
    if report.demoted.is_empty() && report.interrupted.is_empty() {
        tracing::debug!("nothing to recover");
    } else {
        tracing::warn!(
            demoted = report.demoted.len(),
            interrupted = report.interrupted.len(),
            "recovered state from previous run",
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tradesync_core::run_log::INTERRUPTED_MESSAGE;
    use tradesync_core::{EntityMapping, MappingStatus, RemoteSku, RunStatus, Snapshot, SyncType};

    use super::*;

    #[test]
    fn recover_after_kill() {
        let home = TempDir::new().unwrap();
        let log_id = {
            let mappings = MappingStore::open_at(home.path()).unwrap();
            let run_log = RunLog::open_at(home.path()).unwrap();
            mappings
                .upsert(EntityMapping::new("1", "A", "Desk", SyncType::Product))
                .unwrap();
            mappings
                .upsert(EntityMapping::new("2", "B", "Chair", SyncType::Product))
                .unwrap();
            mappings
                .set_status(&LocalId::from("1"), MappingStatus::Syncing, None)
                .unwrap();
            run_log.begin(SyncType::Inventory).unwrap()
        };

        let mappings = MappingStore::open_at(home.path()).unwrap();
        let run_log = RunLog::open_at(home.path()).unwrap();
        let report = recover(&mappings, &run_log).unwrap();

        assert_eq!(report.demoted, vec![LocalId::from("1")]);
        assert_eq!(report.interrupted, vec![log_id]);
        let entry = run_log.get(log_id).unwrap();
        assert_eq!(entry.status, RunStatus::Failed);
        assert_eq!(entry.message, INTERRUPTED_MESSAGE);

        // Second pass finds nothing.
        assert_eq!(recover(&mappings, &run_log).unwrap(), RecoveryReport::default());
    }

    #[test]
    fn recovery_only_touches_status() {
        let home = TempDir::new().unwrap();
        let id = LocalId::from("1");
        let fingerprint = Snapshot {
            title: "Desk".to_string(),
            quantity: 4,
            price_cents: 12_000,
        }
        .fingerprint();
        let before = {
            let mappings = MappingStore::open_at(home.path()).unwrap();
            mappings
                .upsert(EntityMapping::new("1", "A", "Desk", SyncType::Order))
                .unwrap();
            let synced = mappings
                .record_synced(&id, &RemoteSku::from("A"), fingerprint.clone())
                .unwrap();
            mappings
                .set_status(&id, MappingStatus::Syncing, None)
                .unwrap();
            synced
        };

        let mappings = MappingStore::open_at(home.path()).unwrap();
        let run_log = RunLog::open_at(home.path()).unwrap();
        assert_eq!(recover(&mappings, &run_log).unwrap().demoted, vec![id.clone()]);

        let after = mappings.get(&id).unwrap();
        assert_eq!(after.status, MappingStatus::OutOfSync);
        assert_eq!(
            EntityMapping {
                status: MappingStatus::Synced,
                ..after
            },
            before
        );
        assert_eq!(before.synced_fingerprint, Some(fingerprint));
        assert!(before.last_synced_at.is_some());
    }
}
