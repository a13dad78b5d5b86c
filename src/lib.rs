pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::OperatorConfig;
pub use controller::{
    BackoffConfig, Context, Error, Result, VerbOutcome, ensure_workload, error_policy, reconcile,
};
pub use crd::MongoDB;
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the MongoDB controller (cluster-wide).
///
/// Watches MongoDB resources and the StatefulSets they own, converging each
/// one on every event. Cancelling `shutdown` aborts pending readiness waits.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    shutdown: CancellationToken,
) {
    run_controller_scoped(client, config, health_state, shutdown, None).await
}

/// Run the MongoDB controller with optional namespace scoping.
///
/// Use the scoped version for integration tests to enable parallel test execution.
pub async fn run_controller_scoped(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    shutdown: CancellationToken,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for MongoDB resources (scope: {})",
        scope_msg
    );

    if let Some(ref state) = health_state {
        state.set_ready(true);
    }

    let ctx = Arc::new(Context::new(
        client.clone(),
        config,
        health_state,
        shutdown.clone(),
    ));

    let databases: Api<MongoDB> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client, namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(databases, watcher_config.clone())
        .owns(statefulsets, watcher_config)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // Watch events for an object deleted mid-flight end in a 404
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::info!("Controller stream ended");
}
