//! Long-running mode: keep reference snapshots current and answer the
//! control socket until interrupted.

use std::future::Future;
use std::sync::Arc;

use sqlward_cache::{RefreshSchedule, RefreshScheduler};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::control::{ControlServer, ControlState};

pub async fn run_serve(ctx: AppContext) -> anyhow::Result<()> {
    run_until(ctx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c, shutting down");
        }
    })
    .await
}

/// Load every snapshot, run the refresh loops and the control socket, and
/// stop them once `shutdown` completes.
pub async fn run_until<F>(ctx: AppContext, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    info!("sqlwardd starting");
    let control = ControlServer::bind(&ctx.config.control.socket_path)?;
    let control_state = ControlState::from_context(&ctx)?;

    let outcomes = ctx.snapshots.refresh_all(&ctx.store).await;
    for (entity, outcome) in &outcomes {
        if !outcome.is_refreshed() {
            warn!(entity = entity.as_str(), "initial snapshot load failed, serving empty");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::spawn(
        Arc::clone(&ctx.snapshots),
        ctx.store.clone(),
        RefreshSchedule::from(&ctx.config.refresh),
        shutdown_rx.clone(),
    );
    let control = tokio::spawn(control.run(control_state, shutdown_rx));

    shutdown.await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    scheduler.join().await;
    if let Err(e) = control.await {
        warn!(error = %e, "control socket task failed");
    }

    info!("sqlwardd stopped");
    Ok(())
}
