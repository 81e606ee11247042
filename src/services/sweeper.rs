use {
    crate::domain::error::ReconcileError,
    crate::infra::sqlite::order_repo,
    crate::services::reconcile::Reconciler,
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

const SWEEP_BATCH: i64 = 50;

/// Periodically finish grants for orders stuck at `paid && !credits_added`.
///
/// This is the safety net behind two accepted risks: a crash between
/// mark-paid and the grant, and a grant that failed after the payment
/// itself succeeded. Correctness does not depend on it running; customer
/// goodwill does.
pub async fn run_sweeper(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "grant sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("grant sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match sweep_once(&reconciler).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "sweeper granted stuck orders"),
            Err(e) => tracing::error!(error = %e, "sweeper error"),
        }
    }
}

/// One pass over the unfinished-grant predicate. Returns how many orders
/// this pass granted.
pub async fn sweep_once(reconciler: &Reconciler) -> Result<u64, ReconcileError> {
    let stuck = order_repo::find_unfinished_grants(reconciler.pool(), SWEEP_BATCH).await?;

    let mut granted = 0u64;
    for order in stuck {
        match reconciler.retry_grant(order.id()).await {
            Ok(true) => granted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "retry grant failed, will retry next sweep");
            }
        }
    }

    Ok(granted)
}
