//! Entity mapping store: durable local-item ⇄ marketplace-listing links.
//!
//! The whole store is held in memory behind a mutex and rewritten atomically
//! on every mutation (`<home>/.tradesync/mappings.json`), so each write costs
//! O(mappings) and blocks; async callers run writes on the blocking pool.
//! Sync state of a row is written by the executor under its per-entity
//! token, and [`MappingStore::upsert`] refuses to move a `Syncing` row to
//! another SKU.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::paths::mappings_path;
use crate::persist;
use crate::types::{EntityMapping, Fingerprint, LocalId, MappingStatus, RemoteSku, SyncType};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MappingsFile {
    version: u32,
    #[serde(default)]
    mappings: Vec<EntityMapping>,
}

/// Optional constraints for [`MappingStore::list`]. Empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingFilter {
    pub status: Option<MappingStatus>,
    pub entity_type: Option<SyncType>,
}

impl MappingFilter {
    fn matches(&self, mapping: &EntityMapping) -> bool {
        self.status.map_or(true, |s| mapping.status == s)
            && self.entity_type.map_or(true, |t| mapping.entity_type == t)
    }
}

#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    rows: Mutex<BTreeMap<LocalId, EntityMapping>>,
}

impl MappingStore {
    /// Open the store under `<home>/.tradesync/`.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        Self::open(mappings_path(home))
    }

    /// Open the store at an explicit document path. A missing file is an
    /// empty store; the file is created on the first mutation.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let file: Option<MappingsFile> = persist::load(&path)?;
        let mut rows = BTreeMap::new();
        for mapping in file.map(|f| f.mappings).unwrap_or_default() {
            if rows.insert(mapping.local_id.clone(), mapping).is_some() {
                return Err(StoreError::Invalid(format!(
                    "duplicate local id in {}",
                    path.display()
                )));
            }
        }
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, local_id: &LocalId) -> Result<EntityMapping, StoreError> {
        self.lock()
            .get(local_id)
            .cloned()
            .ok_or_else(|| StoreError::MappingNotFound(local_id.clone()))
    }

    pub fn type_of(&self, local_id: &LocalId) -> Option<SyncType> {
        self.lock().get(local_id).map(|m| m.entity_type)
    }

    /// Insert a new mapping or update the descriptive fields of an existing one.
    ///
    /// For an existing row the sync state (status, timestamps, error,
    /// fingerprint) is kept; if the remote SKU changes the row is reset to
    /// `OutOfSync` because the old fingerprint describes a different listing.
    /// A SKU change is refused with [`StoreError::MappingBusy`] while the row
    /// is `Syncing`.
    pub fn upsert(&self, mapping: EntityMapping) -> Result<EntityMapping, StoreError> {
        if mapping.local_id.0.trim().is_empty() {
            return Err(StoreError::Invalid("local id must not be empty".to_string()));
        }
        if mapping.remote_sku.0.trim().is_empty() {
            return Err(StoreError::Invalid("remote sku must not be empty".to_string()));
        }

        self.mutate(|rows| {
            let stored = match rows.get(&mapping.local_id) {
                Some(existing) if existing.remote_sku == mapping.remote_sku => EntityMapping {
                    status: existing.status,
                    last_synced_at: existing.last_synced_at,
                    last_error: existing.last_error.clone(),
                    synced_fingerprint: existing.synced_fingerprint.clone(),
                    ..mapping
                },
                Some(existing) if existing.status == MappingStatus::Syncing => {
                    return Err(StoreError::MappingBusy(mapping.local_id.clone()));
                }
                Some(_) => EntityMapping {
                    status: MappingStatus::OutOfSync,
                    last_error: None,
                    synced_fingerprint: None,
                    ..mapping
                },
                None => mapping,
            };
            rows.insert(stored.local_id.clone(), stored.clone());
            Ok(stored)
        })
    }

    /// Mappings matching `filter`, ordered by local id.
    pub fn list(&self, filter: &MappingFilter) -> Vec<EntityMapping> {
        self.lock()
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomic read-modify-write of a row's status.
    ///
    /// `Synced` stamps `last_synced_at` and clears the error; `Error` stores
    /// `error` (or a placeholder when none is given).
    pub fn set_status(
        &self,
        local_id: &LocalId,
        status: MappingStatus,
        error: Option<String>,
    ) -> Result<EntityMapping, StoreError> {
        self.mutate(|rows| {
            let row = rows
                .get_mut(local_id)
                .ok_or_else(|| StoreError::MappingNotFound(local_id.clone()))?;
            row.status = status;
            match status {
                MappingStatus::Synced => {
                    row.last_synced_at = Some(Utc::now());
                    row.last_error = None;
                }
                MappingStatus::Error => {
                    row.last_error =
                        Some(error.unwrap_or_else(|| "unspecified error".to_string()));
                }
                MappingStatus::OutOfSync | MappingStatus::Syncing => {}
            }
            Ok(row.clone())
        })
    }

    /// Mark a row `Synced` and remember the fingerprint both sides now share.
    ///
    /// `pushed_to` is the SKU the values were written to. If the row now
    /// points at another SKU it is left `OutOfSync` without a baseline.
    pub fn record_synced(
        &self,
        local_id: &LocalId,
        pushed_to: &RemoteSku,
        fingerprint: Fingerprint,
    ) -> Result<EntityMapping, StoreError> {
        self.mutate(|rows| {
            let row = rows
                .get_mut(local_id)
                .ok_or_else(|| StoreError::MappingNotFound(local_id.clone()))?;
            if &row.remote_sku != pushed_to {
                row.status = MappingStatus::OutOfSync;
                row.synced_fingerprint = None;
                return Ok(row.clone());
            }
            row.status = MappingStatus::Synced;
            row.last_synced_at = Some(Utc::now());
            row.last_error = None;
            row.synced_fingerprint = Some(fingerprint);
            Ok(row.clone())
        })
    }

    /// Boot-time recovery: demote every `Syncing` row to `OutOfSync`.
    pub fn recover_syncing(&self) -> Result<Vec<LocalId>, StoreError> {
        self.demote_where(|_| true)
    }

    /// Demote the listed rows that are still `Syncing`. Used after a worker
    /// crash, when only the crashed job's entities are orphaned.
    pub fn demote_syncing(&self, ids: &[LocalId]) -> Result<Vec<LocalId>, StoreError> {
        self.demote_where(|id| ids.contains(id))
    }

    fn demote_where<F>(&self, pick: F) -> Result<Vec<LocalId>, StoreError>
    where
        F: Fn(&LocalId) -> bool,
    {
        self.mutate(|rows| {
            let mut demoted = Vec::new();
            for (id, row) in rows.iter_mut() {
                if row.status == MappingStatus::Syncing && pick(id) {
                    row.status = MappingStatus::OutOfSync;
                    demoted.push(id.clone());
                }
            }
            Ok(demoted)
        })
    }

    /// Apply `f` to the rows and persist. The in-memory copy is rolled back if
    /// the write fails, so memory never runs ahead of disk.
    fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut BTreeMap<LocalId, EntityMapping>) -> Result<T, StoreError>,
    {
        let mut rows = self.lock();
        let before = rows.clone();
        let out = f(&mut *rows)?;
        let file = MappingsFile {
            version: STORE_VERSION,
            mappings: rows.values().cloned().collect(),
        };
        if let Err(err) = persist::save(&self.path, &file) {
            *rows = before;
            return Err(err);
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<LocalId, EntityMapping>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RemoteSku, Snapshot};
    use tempfile::TempDir;

    fn mapping(id: &str, ty: SyncType) -> EntityMapping {
        EntityMapping::new(id, format!("SKU-{id}"), format!("Item {id}"), ty)
    }

    #[test]
    fn get_unknown_is_not_found() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        let err = store.get(&LocalId::from("nope")).unwrap_err();
        assert!(matches!(err, StoreError::MappingNotFound(_)), "got: {err}");
    }

    #[test]
    fn set_status_unknown_is_not_found() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        let err = store
            .set_status(&LocalId::from("nope"), MappingStatus::Synced, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::MappingNotFound(_)));
    }

    #[test]
    fn upsert_keeps_sync_state_of_existing_row() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        store.upsert(mapping("1", SyncType::Product)).unwrap();
        store
            .set_status(&LocalId::from("1"), MappingStatus::Error, Some("boom".into()))
            .unwrap();

        let mut renamed = mapping("1", SyncType::Product);
        renamed.display_name = "Renamed".to_string();
        let stored = store.upsert(renamed).unwrap();

        assert_eq!(stored.display_name, "Renamed");
        assert_eq!(stored.status, MappingStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn upsert_with_new_sku_resets_to_out_of_sync() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        store.upsert(mapping("1", SyncType::Product)).unwrap();
        let fp = Snapshot {
            title: "x".into(),
            quantity: 1,
            price_cents: 1,
        }
        .fingerprint();
        store
            .record_synced(&LocalId::from("1"), &RemoteSku::from("SKU-1"), fp)
            .unwrap();

        let mut moved = mapping("1", SyncType::Product);
        moved.remote_sku = RemoteSku::from("SKU-NEW");
        let stored = store.upsert(moved).unwrap();

        assert_eq!(stored.status, MappingStatus::OutOfSync);
        assert!(stored.synced_fingerprint.is_none());
    }

    #[test]
    fn upsert_rejects_blank_keys() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        let err = store.upsert(mapping(" ", SyncType::Product)).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn synced_stamps_time_and_clears_error() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        store.upsert(mapping("1", SyncType::Inventory)).unwrap();
        let id = LocalId::from("1");
        store
            .set_status(&id, MappingStatus::Error, Some("bad".into()))
            .unwrap();

        let row = store.set_status(&id, MappingStatus::Synced, None).unwrap();
        assert!(row.last_synced_at.is_some());
        assert!(row.last_error.is_none());
    }

    #[test]
    fn list_filters_and_orders_by_local_id() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        store.upsert(mapping("b", SyncType::Order)).unwrap();
        store.upsert(mapping("a", SyncType::Product)).unwrap();
        store.upsert(mapping("c", SyncType::Product)).unwrap();
        store
            .set_status(&LocalId::from("c"), MappingStatus::Synced, None)
            .unwrap();

        let all: Vec<_> = store
            .list(&MappingFilter::default())
            .into_iter()
            .map(|m| m.local_id.0)
            .collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let products = store.list(&MappingFilter {
            entity_type: Some(SyncType::Product),
            ..Default::default()
        });
        assert_eq!(products.len(), 2);

        let synced_products = store.list(&MappingFilter {
            status: Some(MappingStatus::Synced),
            entity_type: Some(SyncType::Product),
        });
        assert_eq!(synced_products.len(), 1);
        assert_eq!(synced_products[0].local_id, LocalId::from("c"));
    }

    #[test]
    fn demote_syncing_only_touches_listed_rows() {
        let home = TempDir::new().unwrap();
        let store = MappingStore::open_at(home.path()).unwrap();
        for id in ["1", "2", "3"] {
            store.upsert(mapping(id, SyncType::Inventory)).unwrap();
            store
                .set_status(&LocalId::from(id), MappingStatus::Syncing, None)
                .unwrap();
        }

        let demoted = store
            .demote_syncing(&[LocalId::from("1"), LocalId::from("3")])
            .unwrap();
        assert_eq!(demoted, vec![LocalId::from("1"), LocalId::from("3")]);
        assert_eq!(
            store.get(&LocalId::from("2")).unwrap().status,
            MappingStatus::Syncing
        );
    }

    #[test]
    fn state_survives_reopen() {
        let home = TempDir::new().unwrap();
        {
            let store = MappingStore::open_at(home.path()).unwrap();
            store.upsert(mapping("1", SyncType::Order)).unwrap();
            store
                .set_status(&LocalId::from("1"), MappingStatus::Error, Some("x".into()))
                .unwrap();
        }
        let reopened = MappingStore::open_at(home.path()).unwrap();
        let row = reopened.get(&LocalId::from("1")).unwrap();
        assert_eq!(row.status, MappingStatus::Error);
        assert_eq!(row.entity_type, SyncType::Order);
    }
}
