//! Capabilities the executor needs from the external systems.
//!
//! Both sides are treated as slow, unreliable network services: every method
//! may fail with [`CollaboratorError::Transient`] and is wrapped by the
//! executor in a timeout plus retry loop.

use async_trait::async_trait;
use serde::Serialize;

use tradesync_core::{LocalId, RemoteSku, Snapshot, SyncField};

use crate::error::CollaboratorError;

/// The e-commerce marketplace, the replica side of the sync.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Current listing for `sku`, or `None` if no listing exists.
    async fn fetch_listing(&self, sku: &RemoteSku) -> Result<Option<Snapshot>, CollaboratorError>;

    async fn create_listing(
        &self,
        sku: &RemoteSku,
        fields: &Snapshot,
    ) -> Result<(), CollaboratorError>;

    /// Push `fields`; `changed` names the fields that actually differ.
    async fn update_listing(
        &self,
        sku: &RemoteSku,
        fields: &Snapshot,
        changed: &[SyncField],
    ) -> Result<(), CollaboratorError>;
}

/// Result of a successful ERP connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Id of the authenticated ERP user.
    pub user_id: i64,
    pub message: String,
}

/// The ERP system, the authoritative side of the sync.
#[async_trait]
pub trait Erp: Send + Sync {
    /// Current product state for `id`, or `None` if the ERP has no such product.
    async fn fetch_product(&self, id: &LocalId) -> Result<Option<Snapshot>, CollaboratorError>;

    /// Authenticate with the configured credentials.
    async fn check_connection(&self) -> Result<ConnectionInfo, CollaboratorError>;
}
