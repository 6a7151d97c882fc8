//! Canopy server: prepares the tree store and object store, then runs the
//! background repair worker until shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use canopy_core::config::{AppConfig, DatabaseBackend};
use canopy_core::error::AppError;
use canopy_core::traits::storage::ObjectStore;
use canopy_database::{DatabasePool, MemoryTreeStore, PgTreeStore, TreeStore};
use canopy_service::Services;
use canopy_storage::LocalStorageProvider;
use canopy_worker::RepairRunner;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("CANOPY_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Canopy v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Tree store ───────────────────────────────────────
    let (store, db_pool): (Arc<dyn TreeStore>, Option<DatabasePool>) =
        match config.database.backend {
            DatabaseBackend::Postgres => {
                tracing::info!("Connecting to database...");
                let pool = DatabasePool::connect(&config.database).await?;

                tracing::info!("Running database migrations...");
                canopy_database::migration::run_migrations(pool.pool()).await?;

                let store = PgTreeStore::new(pool.pool().clone());
                (Arc::new(store), Some(pool))
            }
            DatabaseBackend::Memory => {
                tracing::warn!("Using the in-memory tree store; state is lost on shutdown");
                (Arc::new(MemoryTreeStore::new()), None)
            }
        };

    // ── Step 2: Object store ─────────────────────────────────────
    tracing::info!(
        "Initializing object store at '{}'...",
        config.storage.root_path
    );
    let objects = Arc::new(LocalStorageProvider::new(&config.storage.root_path).await?);
    if !objects.health_check().await? {
        return Err(AppError::storage(format!(
            "Object store at '{}' is not writable",
            config.storage.root_path
        )));
    }
    tracing::info!("Object store initialized");

    // ── Step 3: Services ─────────────────────────────────────────
    let services = Services::new(Arc::clone(&store), objects, &config);
    tracing::info!(
        max_subfolder_depth = config.tree.max_subfolder_depth,
        "Services initialized"
    );

    // ── Step 4: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 5: Start repair worker ──────────────────────────────
    let worker_id = format!("canopy-{}", std::process::id());
    let runner = RepairRunner::new(
        Arc::new(services.repairs),
        config.repair.clone(),
        worker_id,
    );
    let worker_cancel = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move {
        runner.run(worker_cancel).await;
    });
    tracing::info!("Canopy running, press Ctrl+C to stop");

    // ── Step 6: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    tracing::info!("Waiting for background tasks to complete...");
    if tokio::time::timeout(Duration::from_secs(30), worker_handle)
        .await
        .is_err()
    {
        tracing::warn!("Repair worker did not stop within 30s");
    }

    if let Some(pool) = db_pool {
        pool.close().await;
    }

    tracing::info!("Canopy shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
