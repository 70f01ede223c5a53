//! Daemon assembly and lifecycle.

use std::sync::Arc;

use tracing::{info, warn};

use netwarden_api::{ApiState, build_router};
use netwarden_core::NetwardenConfig;
use netwarden_governance::Authorizer;
use netwarden_poller::Poller;
use netwarden_snmp::{FetchBudget, SnmpClient};
use netwarden_state::StateStore;

pub async fn run(config: NetwardenConfig) -> anyhow::Result<()> {
    info!("netwarden daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    if let Some(dir) = config.storage.path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    let store = StateStore::open(&config.storage.path)?;
    info!(path = ?config.storage.path, "inventory store opened");

    let client = Arc::new(SnmpClient::new(config.snmp.port));
    let budget = FetchBudget {
        timeout: config.snmp.timeout(),
        retries: config.snmp.retries,
    };
    let poller = Poller::new(store.clone(), client, budget);
    let loops = poller.start_all().await?;
    info!(loops, timeout_ms = config.snmp.timeout_ms, retries = config.snmp.retries, "poller initialized");

    let authorizer = Authorizer::new(config.governance.admins.iter().cloned());
    let state = ApiState::new(
        store,
        authorizer,
        poller.clone(),
        config.poller.default_interval_secs,
    );

    // ── Start API server ───────────────────────────────────────

    let router = build_router(state);
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Loops are stopped even when the server failed.
    poller.stop_all().await;
    served?;

    info!("netwarden daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, stopping poll loops");
}
