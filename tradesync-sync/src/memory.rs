//! In-memory collaborators with scriptable failures, for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use tradesync_core::{LocalId, RemoteSku, Snapshot, SyncField};

use crate::collaborator::{ConnectionInfo, Erp, Marketplace};
use crate::error::CollaboratorError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failures injected for one key: a queue consumed call by call, then an
/// optional error returned forever.
#[derive(Debug, Default)]
struct Script {
    next: VecDeque<CollaboratorError>,
    always: Option<CollaboratorError>,
    panic: bool,
}

#[derive(Debug)]
struct Scripts<K> {
    by_key: Mutex<HashMap<K, Script>>,
}

impl<K> Default for Scripts<K> {
    fn default() -> Self {
        Self {
            by_key: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: std::hash::Hash + Eq + Clone + std::fmt::Display> Scripts<K> {
    fn fail_next(&self, key: &K, err: CollaboratorError, times: usize) {
        let mut map = lock(&self.by_key);
        let script = map.entry(key.clone()).or_default();
        script.next.extend(std::iter::repeat(err).take(times));
    }

    fn fail_always(&self, key: &K, err: CollaboratorError) {
        lock(&self.by_key).entry(key.clone()).or_default().always = Some(err);
    }

    fn panic_on(&self, key: &K) {
        lock(&self.by_key).entry(key.clone()).or_default().panic = true;
    }

    fn check(&self, key: &K) -> Result<(), CollaboratorError> {
        let mut map = lock(&self.by_key);
        let Some(script) = map.get_mut(key) else {
            return Ok(());
        };
        if script.panic {
            drop(map);
            panic!("injected panic for {key}");
        }
        if let Some(err) = script.next.pop_front() {
            return Err(err);
        }
        match &script.always {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// A recorded write against [`MemoryMarketplace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    Create(RemoteSku, Snapshot),
    Update(RemoteSku, Snapshot, Vec<SyncField>),
}

#[derive(Debug, Default)]
pub struct MemoryMarketplace {
    listings: Mutex<HashMap<RemoteSku, Snapshot>>,
    scripts: Scripts<RemoteSku>,
    pushes: Mutex<Vec<Push>>,
    latency: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sku: impl Into<RemoteSku>, listing: Snapshot) {
        lock(&self.listings).insert(sku.into(), listing);
    }

    pub fn listing(&self, sku: &RemoteSku) -> Option<Snapshot> {
        lock(&self.listings).get(sku).cloned()
    }

    /// Fail the next `times` calls touching `sku` with `err`.
    pub fn fail_next(&self, sku: impl Into<RemoteSku>, err: CollaboratorError, times: usize) {
        self.scripts.fail_next(&sku.into(), err, times);
    }

    pub fn fail_always(&self, sku: impl Into<RemoteSku>, err: CollaboratorError) {
        self.scripts.fail_always(&sku.into(), err);
    }

    /// Panic inside any call touching `sku`.
    pub fn panic_on(&self, sku: impl Into<RemoteSku>) {
        self.scripts.panic_on(&sku.into());
    }

    /// Sleep this long inside every call.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    pub fn pushes(&self) -> Vec<Push> {
        lock(&self.pushes).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, sku: &RemoteSku) -> Result<(), CollaboratorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.scripts.check(sku)
    }
}

#[async_trait]
impl Marketplace for MemoryMarketplace {
    async fn fetch_listing(&self, sku: &RemoteSku) -> Result<Option<Snapshot>, CollaboratorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.enter(sku).await?;
        Ok(self.listing(sku))
    }

    async fn create_listing(&self, sku: &RemoteSku, fields: &Snapshot) -> Result<(), CollaboratorError> {
        self.enter(sku).await?;
        lock(&self.listings).insert(sku.clone(), fields.clone());
        lock(&self.pushes).push(Push::Create(sku.clone(), fields.clone()));
        Ok(())
    }

    async fn update_listing(
        &self,
        sku: &RemoteSku,
        fields: &Snapshot,
        changed: &[SyncField],
    ) -> Result<(), CollaboratorError> {
        self.enter(sku).await?;
        lock(&self.listings).insert(sku.clone(), fields.clone());
        lock(&self.pushes).push(Push::Update(sku.clone(), fields.clone(), changed.to_vec()));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryErp {
    products: Mutex<HashMap<LocalId, Snapshot>>,
    scripts: Scripts<LocalId>,
    connection: Mutex<Result<ConnectionInfo, CollaboratorError>>,
}

impl Default for MemoryErp {
    fn default() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
            scripts: Scripts::default(),
            connection: Mutex::new(Ok(ConnectionInfo {
                user_id: 1,
                message: "Connected to Odoo as user 1".to_string(),
            })),
        }
    }
}

impl MemoryErp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<LocalId>, product: Snapshot) {
        lock(&self.products).insert(id.into(), product);
    }

    pub fn fail_next(&self, id: impl Into<LocalId>, err: CollaboratorError, times: usize) {
        self.scripts.fail_next(&id.into(), err, times);
    }

    pub fn fail_always(&self, id: impl Into<LocalId>, err: CollaboratorError) {
        self.scripts.fail_always(&id.into(), err);
    }

    pub fn set_connection(&self, result: Result<ConnectionInfo, CollaboratorError>) {
        *lock(&self.connection) = result;
    }
}

#[async_trait]
impl Erp for MemoryErp {
    async fn fetch_product(&self, id: &LocalId) -> Result<Option<Snapshot>, CollaboratorError> {
        self.scripts.check(id)?;
        Ok(lock(&self.products).get(id).cloned())
    }

    async fn check_connection(&self) -> Result<ConnectionInfo, CollaboratorError> {
        lock(&self.connection).clone()
    }
}
