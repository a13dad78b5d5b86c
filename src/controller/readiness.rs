//! Wait for the pods of a StatefulSet to come up

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ReadinessConfig;
use crate::controller::client::KubeClient;
use crate::controller::error::{Error, Result};
use crate::resources::common::label_selector;

/// A pod counts once it is Running and its Ready condition is True
pub fn is_pod_running(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    let running = status.phase.as_deref() == Some("Running");
    let ready = status
        .conditions
        .as_ref()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    running && ready
}

/// Poll until the StatefulSet's expected replicas are running
///
/// Returns within one poll interval of the deadline or of cancellation.
/// API errors while listing pods are returned immediately.
pub async fn wait_until_running(
    client: &dyn KubeClient,
    sts: &StatefulSet,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let namespace = sts.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = sts.name_any();
    let spec = sts.spec.as_ref().ok_or(Error::MissingObjectKey(".spec"))?;
    let expected = spec.replicas.unwrap_or(1);
    let selector = spec
        .selector
        .match_labels
        .as_ref()
        .map(label_selector)
        .ok_or(Error::MissingObjectKey(".spec.selector.matchLabels"))?;

    let deadline = Instant::now() + config.timeout;

    loop {
        let pods = client.list_pods(&namespace, &selector).await?;
        let running = pods.iter().filter(|p| is_pod_running(p)).count() as i32;
        if running == expected {
            debug!(%namespace, %name, running, "StatefulSet pods are running");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::ReadinessTimeout {
                name,
                expected,
                running,
                timeout: config.timeout,
            });
        }

        debug!(%namespace, %name, running, expected, "Waiting for StatefulSet pods");
        tokio::select! {
            _ = sleep(config.poll_interval.min(deadline - now)) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled(name)),
        }
    }
}
