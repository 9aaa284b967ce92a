//! Long-running sync daemon: worker pool over the job queue plus the HTTP
//! API served to the dashboard.

pub mod api;
pub mod collaborators;
mod error;
pub mod recovery;
mod runtime;
pub mod workers;

pub use api::{build_router, AppState, ErpConnector};
pub use error::DaemonError;
pub use recovery::{recover, RecoveryReport};
pub use runtime::{boot, init_tracing, run, start_blocking, Daemon};
pub use workers::{process_job, spawn_workers, WorkerStats};
