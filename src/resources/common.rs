//! Common utilities for Kubernetes resource generation
//!
//! Shared constants, labels and owner references used by every object the
//! operator manages for a MongoDB resource.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::MongoDB;

/// API version for the MongoDB CRD
pub const API_VERSION: &str = "kubedb.com/v1alpha1";

/// Kind for the MongoDB CRD
pub const KIND: &str = "MongoDB";

/// Operator field manager name
pub const FIELD_MANAGER: &str = "mongodb-operator";

/// Marker label naming the database kind that owns an object
pub const LABEL_DATABASE_KIND: &str = "kubedb.com/kind";

/// Label naming the database resource that owns an object
pub const LABEL_DATABASE_NAME: &str = "kubedb.com/name";

/// Client-side apply bookkeeping that must not leak onto owned objects
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Generate an owner reference for a MongoDB resource
///
/// Owned objects are garbage collected when the database is deleted.
pub fn owner_reference(db: &MongoDB) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: db.name_any(),
        uid: db.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels that select the pods of a database. Immutable once a StatefulSet exists.
pub fn selector_labels(db: &MongoDB) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_DATABASE_KIND.to_string(), KIND.to_string()),
        (LABEL_DATABASE_NAME.to_string(), db.name_any()),
    ])
}

/// Labels for objects owned by a database
///
/// User labels from the resource are carried over; the kind marker and
/// name label always win.
pub fn workload_labels(db: &MongoDB) -> BTreeMap<String, String> {
    let mut labels = db.labels().clone();
    labels.extend(selector_labels(db));
    labels
}

/// Annotations copied from the resource onto owned objects
pub fn workload_annotations(db: &MongoDB) -> BTreeMap<String, String> {
    db.annotations()
        .iter()
        .filter(|(key, _)| key.as_str() != LAST_APPLIED_ANNOTATION)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Render labels as a list selector (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
