//! # tradesync-sync
//!
//! Job queue, reconciler and executor for the ERP to marketplace sync.
//!
//! - [`queue::JobQueue`] admits jobs with scope dedup and hands them to workers.
//! - [`executor::Executor`] runs one job: resolve scope, reconcile each entity,
//!   push through the [`collaborator`] traits with retry.
//! - [`odoo::OdooClient`] and [`marketplace::RestMarketplace`] are the
//!   reqwest-backed collaborators.

pub mod collaborator;
pub mod error;
pub mod executor;
mod http;
pub mod locks;
pub mod marketplace;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod odoo;
pub mod queue;
pub mod reconcile;
pub mod retry;

pub use collaborator::{ConnectionInfo, Erp, Marketplace};
pub use error::{CollaboratorError, EntityError, QueueError};
pub use executor::{EntityOutcome, EntityReport, Executor, JobReport, PreparedJob};
pub use marketplace::RestMarketplace;
pub use odoo::OdooClient;
pub use queue::{JobQueue, QueueStats, SubmitOutcome};
pub use reconcile::{Operation, OperationKind, Resolution};
