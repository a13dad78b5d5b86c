//! Reconciliation logic for MongoDB resources
//!
//! Each pass converges the StatefulSet through `ensure_workload` and records
//! the result on the MongoDB status subresource.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::StatusManager;
use crate::controller::workload::{VerbOutcome, ensure_workload};
use crate::crd::{DatabasePhase, MongoDB};

/// Periodic resync for converged resources
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Recheck interval while pods of an unchanged StatefulSet are still coming up
const PENDING_RECHECK_INTERVAL: Duration = Duration::from_secs(15);

/// Main reconciliation function
#[instrument(
    skip(db, ctx),
    fields(name = %db.name_any(), namespace = db.namespace().unwrap_or_default())
)]
pub async fn reconcile(db: Arc<MongoDB>, ctx: Arc<Context>) -> Result<Action> {
    let started = Instant::now();
    let ns = db.namespace().unwrap_or_default();
    let name = db.name_any();

    // Owned objects are removed by garbage collection
    if db.metadata.deletion_timestamp.is_some() {
        debug!("MongoDB is being deleted, nothing to do");
        return Ok(Action::await_change());
    }

    info!("Reconciling MongoDB");

    let status = StatusManager::new(&db, &ctx);
    if db.phase() == DatabasePhase::Pending {
        status.set_creating().await?;
    }

    let result = converge(&db, &ctx, &status).await;

    if let Some(health) = &ctx.health_state {
        match &result {
            Ok(_) => health
                .metrics
                .record_reconcile(&ns, &name, started.elapsed().as_secs_f64()),
            Err(_) => health.metrics.record_error(&ns, &name),
        }
    }

    match result {
        Ok(action) => {
            info!("Reconciliation completed successfully");
            Ok(action)
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            if let Err(status_err) = status.set_failed(failure_reason(&e), &e.to_string()).await {
                warn!(error = %status_err, "Failed to record failure on MongoDB status");
            }
            Err(e)
        }
    }
}

async fn converge(db: &MongoDB, ctx: &Context, status: &StatusManager<'_>) -> Result<Action> {
    let outcome = ensure_workload(ctx, db).await?;

    // A created or patched StatefulSet has already passed the readiness wait
    if outcome != VerbOutcome::Unchanged || statefulset_ready(db, ctx).await? {
        status.set_running().await?;
        return Ok(Action::requeue(RESYNC_INTERVAL));
    }

    debug!("StatefulSet unchanged but not ready yet");
    Ok(Action::requeue(PENDING_RECHECK_INTERVAL))
}

/// Whether the StatefulSet reports all of its replicas ready
///
/// A resource already marked Running stays Running while its StatefulSet is unchanged.
async fn statefulset_ready(db: &MongoDB, ctx: &Context) -> Result<bool> {
    if db.phase() == DatabasePhase::Running {
        return Ok(true);
    }
    let namespace = db
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let Some(sts) = ctx
        .client
        .get_statefulset(&namespace, &db.offshoot_name())
        .await?
    else {
        return Ok(false);
    };

    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    Ok(ready >= desired)
}

/// Reason recorded on the Ready condition for a failed pass
fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::NamingConflict(_) => "NamingConflict",
        Error::ReadinessTimeout { .. } => "ReadinessTimeout",
        Error::Cancelled(_) => "Cancelled",
        Error::InvalidConfig(_) => "InvalidConfig",
        _ => "ReconciliationFailed",
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(db: Arc<MongoDB>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = db.name_any();
    let backoff = BackoffConfig::default();

    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
