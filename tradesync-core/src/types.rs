//! Domain types for the tradesync engine.
//!
//! All types are serializable via serde; persisted documents use the
//! `snake_case` field names declared here, the HTTP layer maps them to its own
//! DTOs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a product on the local (ERP) side. Unique key of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub String);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for LocalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// SKU of the listing on the marketplace side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteSku(pub String);

impl fmt::Display for RemoteSku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteSku {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteSku {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Sequential job identifier, unique for the lifetime of a daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Run log entry identifier. Persisted, so it keeps increasing across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub u64);

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of entity a mapping tracks, also the label of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SyncType {
    #[default]
    Inventory,
    Product,
    Order,
}

impl SyncType {
    pub fn all() -> &'static [SyncType] {
        &[SyncType::Inventory, SyncType::Product, SyncType::Order]
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::Inventory => write!(f, "Inventory"),
            SyncType::Product => write!(f, "Product"),
            SyncType::Order => write!(f, "Order"),
        }
    }
}

impl FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inventory" => Ok(SyncType::Inventory),
            "product" => Ok(SyncType::Product),
            "order" => Ok(SyncType::Order),
            other => Err(format!(
                "unknown sync type '{other}'; expected: Inventory, Product, Order"
            )),
        }
    }
}

/// Synchronization state of a single mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MappingStatus {
    Synced,
    Error,
    #[default]
    OutOfSync,
    /// Held only while a running job owns the entity.
    Syncing,
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingStatus::Synced => write!(f, "Synced"),
            MappingStatus::Error => write!(f, "Error"),
            MappingStatus::OutOfSync => write!(f, "OutOfSync"),
            MappingStatus::Syncing => write!(f, "Syncing"),
        }
    }
}

impl FromStr for MappingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synced" => Ok(MappingStatus::Synced),
            "error" => Ok(MappingStatus::Error),
            "outofsync" | "out_of_sync" => Ok(MappingStatus::OutOfSync),
            "syncing" => Ok(MappingStatus::Syncing),
            other => Err(format!(
                "unknown mapping status '{other}'; expected: Synced, Error, OutOfSync, Syncing"
            )),
        }
    }
}

/// Status of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Success => write!(f, "Success"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Breadth of entities a sync job covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target")]
pub enum JobScope {
    Full,
    ByType(SyncType),
    ByEntity(LocalId),
}

impl JobScope {
    /// Whether this scope covers `other`.
    ///
    /// `type_of` resolves the entity type of a local id; an entity whose type
    /// is unknown is only covered by `Full` or by an identical `ByEntity`.
    pub fn covers<F>(&self, other: &JobScope, type_of: F) -> bool
    where
        F: Fn(&LocalId) -> Option<SyncType>,
    {
        match (self, other) {
            (JobScope::Full, _) => true,
            (JobScope::ByType(a), JobScope::ByType(b)) => a == b,
            (JobScope::ByType(t), JobScope::ByEntity(id)) => type_of(id) == Some(*t),
            (JobScope::ByEntity(a), JobScope::ByEntity(b)) => a == b,
            _ => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            JobScope::Full => "full".to_string(),
            JobScope::ByType(t) => format!("type:{t}"),
            JobScope::ByEntity(id) => format!("entity:{id}"),
        }
    }
}

impl fmt::Display for JobScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Lifecycle state of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Deduped,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Deduped | JobState::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }

    /// Allowed edges of the job state machine.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Deduped)
                | (JobState::Queued, JobState::Cancelled)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "Queued",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::Deduped => "Deduped",
            JobState::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One of the fields the reconciler compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncField {
    Quantity,
    Price,
    Title,
}

impl SyncField {
    pub fn all() -> &'static [SyncField] {
        &[SyncField::Quantity, SyncField::Price, SyncField::Title]
    }
}

impl fmt::Display for SyncField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncField::Quantity => write!(f, "quantity"),
            SyncField::Price => write!(f, "price"),
            SyncField::Title => write!(f, "title"),
        }
    }
}

/// Point-in-time read of an entity's syncable fields from one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub title: String,
    pub quantity: i64,
    /// Price in minor currency units.
    pub price_cents: i64,
}

impl Snapshot {
    /// Fields whose values differ between `self` and `other`, in
    /// [`SyncField::all`] order.
    pub fn differing_fields(&self, other: &Snapshot) -> Vec<SyncField> {
        SyncField::all()
            .iter()
            .copied()
            .filter(|field| match field {
                SyncField::Quantity => self.quantity != other.quantity,
                SyncField::Price => self.price_cents != other.price_cents,
                SyncField::Title => self.title != other.title,
            })
            .collect()
    }

    /// SHA-256 hex digest over the syncable fields.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut h = Sha256::new();
        h.update(self.quantity.to_le_bytes());
        h.update(self.price_cents.to_le_bytes());
        h.update(self.title.as_bytes());
        Fingerprint(hex::encode(h.finalize()))
    }
}

/// Digest of a snapshot as last confirmed on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Durable link between a local item and a marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub local_id: LocalId,
    pub remote_sku: RemoteSku,
    pub display_name: String,
    #[serde(default)]
    pub entity_type: SyncType,
    #[serde(default)]
    pub status: MappingStatus,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_fingerprint: Option<Fingerprint>,
}

impl EntityMapping {
    /// A fresh, never-synced mapping.
    pub fn new(
        local_id: impl Into<LocalId>,
        remote_sku: impl Into<RemoteSku>,
        display_name: impl Into<String>,
        entity_type: SyncType,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            remote_sku: remote_sku.into(),
            display_name: display_name.into(),
            entity_type,
            status: MappingStatus::OutOfSync,
            last_synced_at: None,
            last_error: None,
            synced_fingerprint: None,
        }
    }
}

/// A queued or finished sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: JobId,
    pub scope: JobScope,
    pub requested_at: DateTime<Utc>,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduped_into: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<LogId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One attempt of a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub id: LogId,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub sync_type: SyncType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
