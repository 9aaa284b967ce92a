use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use tradesync_core::config::LogFormat;
use tradesync_core::paths::tradesync_root;
use tradesync_core::{MappingStore, RunLog, TradesyncConfig};
use tradesync_sync::{Erp, Executor, JobQueue, Marketplace};

use crate::api::{build_router, AppState, ErpConnector};
use crate::collaborators::{build_erp, build_marketplace, odoo_connector};
use crate::error::{io_err, DaemonError};
use crate::recovery::{recover, RecoveryReport};
use crate::workers::{spawn_workers, WorkerStats};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let config = TradesyncConfig::load_at(home)?;
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon until ctrl-c: boot, serve HTTP, then drain workers.
pub async fn run(home: PathBuf, config: TradesyncConfig) -> Result<(), DaemonError> {
    let marketplace = build_marketplace(&config)?;
    let erp = build_erp(&config)?;
    let daemon = boot(&home, &config, marketplace, erp, odoo_connector())?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let state = daemon.state.clone();
        let bind = config.server.bind.clone();
        let origins = config.server.allowed_origins.clone();
        tokio::spawn(async move {
            let result = server_task(state, bind, origins, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task(
                            "signal_handler",
                            format!("ctrl-c handler failed: {err}"),
                        )),
                    }
                }
            }
        })
    };

    let (server_result, signal_result) = tokio::join!(server_handle, signal_handle);
    daemon.shutdown().await;

    handle_join("http_server", server_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// A booted daemon: stores open, recovery done, workers running.
pub struct Daemon {
    pub state: AppState,
    pub recovery: RecoveryReport,
    workers: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Stop dispatching and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.state.queue.close();
        for handle in self.workers {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker join failure");
            }
        }
        tracing::info!("workers drained");
    }
}

/// Open the stores, run recovery, then start the worker pool.
///
/// Recovery happens strictly before any worker exists.
pub fn boot(
    home: &Path,
    config: &TradesyncConfig,
    marketplace: Arc<dyn Marketplace>,
    erp: Arc<dyn Erp>,
    erp_connector: ErpConnector,
) -> Result<Daemon, DaemonError> {
    config.validate()?;
    let root = tradesync_root(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let mappings = Arc::new(MappingStore::open_at(home)?);
    let run_log = Arc::new(RunLog::open_at(home)?);
    let recovery = recover(&mappings, &run_log)?;

    let queue = Arc::new(JobQueue::new(config.sync.dedup_enabled));
    let executor = Arc::new(Executor::new(
        mappings.clone(),
        run_log.clone(),
        marketplace,
        erp,
        &config.sync,
    ));
    let stats = Arc::new(WorkerStats::default());
    let workers = spawn_workers(
        config.sync.worker_pool_size,
        queue.clone(),
        executor,
        stats.clone(),
    );
    tracing::info!(
        workers = config.sync.worker_pool_size,
        mappings = mappings.len(),
        "daemon booted",
    );

    Ok(Daemon {
        state: AppState {
            mappings,
            run_log,
            queue,
            workers: stats,
            worker_pool_size: config.sync.worker_pool_size,
            erp_connector,
            call_timeout: config.sync.per_call_timeout(),
        },
        recovery,
        workers,
    })
}

async fn server_task(
    state: AppState,
    bind: String,
    allowed_origins: Vec<String>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: bind.clone(),
            source,
        })?;
    tracing::info!(addr = %bind, "http server listening");

    let app = build_router(state, &allowed_origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(bind.as_str(), e))
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(task, format!("join failure: {err}"))),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
