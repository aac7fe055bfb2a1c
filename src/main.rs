use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_pipeline::compose::NotificationComposer;
use notification_pipeline::config::{Settings, StoreBackend};
use notification_pipeline::postgres::PostgresPool;
use notification_pipeline::server::{create_app, AppState};
use notification_pipeline::store::create_store;
use notification_pipeline::tasks::Scheduler;
use notification_pipeline::transport::create_transports;
use notification_pipeline::worker::{create_work_queue, DeliveryWorker, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!(
        store = ?settings.store.backend,
        queue = ?settings.queue.backend,
        "Configuration loaded"
    );

    // PostgreSQL is only needed by the postgres store backend
    let postgres_pool = if settings.store.backend == StoreBackend::Postgres {
        match PostgresPool::new(&settings.database).await {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL, falling back to memory store");
                None
            }
        }
    } else {
        None
    };

    let store = create_store(&settings.store, postgres_pool.as_deref());
    let queue = create_work_queue(&settings.queue).await;
    let (email, push) = create_transports(&settings.transport)?;

    let worker = Arc::new(
        DeliveryWorker::new(store.clone(), email, push, settings.delivery.retry_backoff()),
    );
    let composer = Arc::new(
        NotificationComposer::new(store.clone(), settings.delivery.max_retries)
            .with_queue(queue.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Queue consumers
    let pool_handles =
        WorkerPool::new(worker.clone(), queue.clone(), &settings.queue).spawn(&shutdown_tx);

    // Recovery sweeps
    let scheduler_handle = if settings.scheduler.enabled {
        let scheduler = Arc::new(Scheduler::new(worker, settings.scheduler.clone()));
        Some(scheduler.spawn(&shutdown_tx))
    } else {
        tracing::warn!("Scheduler disabled, pending deliveries rely on the work queue only");
        None
    };

    let state = AppState::new(settings.clone(), composer, queue, postgres_pool.clone());
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    futures::future::join_all(pool_handles).await;
    if let Some(handle) = scheduler_handle {
        handle.join().await;
    }

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop queue consumers and sweep loops
    let _ = shutdown_tx.send(());
}
