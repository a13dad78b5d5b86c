//! Precondition check before the StatefulSet is touched

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::warn;

use crate::controller::client::KubeClient;
use crate::controller::error::{Error, Result};
use crate::crd::MongoDB;
use crate::resources::common::{KIND, LABEL_DATABASE_KIND};

/// Check that the StatefulSet name is free or already ours
///
/// Returns the live object when it carries our kind marker, `None` when it
/// does not exist, and `NamingConflict` when someone else owns the name.
/// Never writes.
pub async fn check_statefulset(
    client: &dyn KubeClient,
    db: &MongoDB,
) -> Result<Option<StatefulSet>> {
    let namespace = db.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = db.offshoot_name();

    let live = match client.get_statefulset(&namespace, &name).await {
        Ok(live) => live,
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    match live {
        None => Ok(None),
        Some(sts) if is_owned_marker(&sts) => Ok(Some(sts)),
        Some(_) => {
            warn!(%namespace, %name, "StatefulSet exists without the MongoDB kind marker");
            Err(Error::NamingConflict(name))
        }
    }
}

fn is_owned_marker(sts: &StatefulSet) -> bool {
    sts.labels().get(LABEL_DATABASE_KIND).map(String::as_str) == Some(KIND)
}
