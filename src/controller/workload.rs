//! Create-or-patch of the MongoDB StatefulSet
//!
//! One invocation reads the live object at most once, computes the desired
//! object from it, and writes at most once. The write is either a create or
//! a JSON Patch pinned to the resourceVersion that was read, so a concurrent
//! writer makes our write fail instead of being overwritten.

use std::fmt;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::events::{publish_for, reasons};
use crate::controller::guard::check_statefulset;
use crate::controller::patch::statefulset_patch;
use crate::controller::readiness::wait_until_running;
use crate::crd::MongoDB;
use crate::resources::statefulset::{desired_statefulset, statefulset_skeleton};

/// What a create-or-patch did to the object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerbOutcome {
    Unchanged,
    Created,
    Patched,
}

impl fmt::Display for VerbOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerbOutcome::Unchanged => write!(f, "unchanged"),
            VerbOutcome::Created => write!(f, "created"),
            VerbOutcome::Patched => write!(f, "patched"),
        }
    }
}

/// Bring the StatefulSet in line with `db`
///
/// Guard failures and API errors (including stale-read conflicts) are returned as-is;
/// nothing is retried here.
pub async fn create_or_patch_statefulset(
    ctx: &Context,
    db: &MongoDB,
) -> Result<(StatefulSet, VerbOutcome)> {
    let namespace = db.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = db.offshoot_name();

    let Some(live) = check_statefulset(ctx.client.as_ref(), db).await? else {
        let desired = desired_statefulset(statefulset_skeleton(db), db, &ctx.config);
        let created = ctx.client.create_statefulset(&namespace, &desired).await?;
        info!(%namespace, %name, "Created StatefulSet");
        return Ok((created, VerbOutcome::Created));
    };

    let desired = desired_statefulset(live.clone(), db, &ctx.config);
    let Some(patch) = statefulset_patch(&live, &desired)? else {
        debug!(%namespace, %name, "StatefulSet already up to date");
        return Ok((live, VerbOutcome::Unchanged));
    };

    debug!(%namespace, %name, operations = patch.0.len(), "Patching StatefulSet");
    let patched = ctx.client.patch_statefulset(&namespace, &name, &patch).await?;
    info!(%namespace, %name, "Patched StatefulSet");
    Ok((patched, VerbOutcome::Patched))
}

/// Converge the StatefulSet and, if it changed, wait for its pods
///
/// Publishes `Successful` or `FailedToStart` on the MongoDB resource for every
/// create or patch. An unchanged StatefulSet is neither waited on nor reported.
pub async fn ensure_workload(ctx: &Context, db: &MongoDB) -> Result<VerbOutcome> {
    let (sts, outcome) = create_or_patch_statefulset(ctx, db).await?;

    if let Some(health) = &ctx.health_state {
        health.metrics.record_workload_operation(outcome);
    }

    if outcome == VerbOutcome::Unchanged {
        return Ok(outcome);
    }

    if let Err(e) = wait_until_running(
        ctx.client.as_ref(),
        &sts,
        &ctx.config.readiness,
        &ctx.shutdown,
    )
    .await
    {
        warn!(name = %db.name_any(), error = %e, "StatefulSet failed to start");
        if let Some(health) = &ctx.health_state {
            health
                .metrics
                .record_failed_start(&db.namespace().unwrap_or_default(), &db.name_any());
        }
        publish_for(
            ctx.events.as_ref(),
            db,
            EventType::Warning,
            reasons::FAILED_TO_START,
            format!("Failed to CreateOrPatch StatefulSet. Reason: {}", e),
        )
        .await;
        return Err(e);
    }

    publish_for(
        ctx.events.as_ref(),
        db,
        EventType::Normal,
        reasons::SUCCESSFUL,
        format!("Successfully {} StatefulSet", outcome),
    )
    .await;

    Ok(outcome)
}
