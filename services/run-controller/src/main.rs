//! runrelay run controller
//!
//! Serves the Run API and reconciles Runs against the external job system.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use runrelay_controller::{
    api,
    config::Config,
    controller::RunController,
    events::TracingEventRecorder,
    http_client::HttpJobClient,
    state::AppState,
    store::{MemoryRunStore, RunStore},
};
use runrelay_reconcile::{Reconciler, SystemClock};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to RUNRELAY_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting run controller");
    info!(
        listen_addr = %config.listen_addr,
        job_api_version = %config.job_reference.api_version,
        job_kind = %config.job_reference.kind,
        job_timeout_ms = config.job_timeout.as_millis() as u64,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Configuration loaded"
    );

    if config.completion_pointer.is_none() {
        warn!("No completion pointer configured, runs will poll until stopped");
    }

    let client = HttpJobClient::new(config.http_timeout).context("failed to build HTTP client")?;
    let reconciler = Reconciler::new(
        Arc::new(client),
        config.completion_predicate(),
        Arc::new(SystemClock),
    )
    .with_reference(config.job_reference.clone())
    .with_policy(config.requeue_policy());

    let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = RunController::new(
        store.clone(),
        reconciler,
        Arc::new(TracingEventRecorder),
        config.controller_settings(),
    );
    let controller_handle = tokio::spawn(controller.run(shutdown_rx.clone()));

    let app = api::create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for controller to shut down...");
    if let Err(e) = tokio::time::timeout(Duration::from_secs(15), controller_handle).await {
        warn!(error = %e, "Controller did not shut down in time");
    }

    info!("Run controller shutdown complete");
    Ok(())
}
