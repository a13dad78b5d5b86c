//! JSON Patch (RFC 6902) computation for StatefulSet updates
//!
//! Operations come from `json_patch::diff` and address list entries by index,
//! so a patch only touches the entries that differ. Every non-empty patch
//! opens with a `test` on the resourceVersion that was read, which makes the
//! write fail if anyone else wrote the object in between.

use json_patch::{Patch, PatchOperation, TestOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use serde_json::Value;

use crate::controller::error::Result;

/// Operations turning `live` into `desired`, `None` when nothing differs
pub fn statefulset_patch(live: &StatefulSet, desired: &StatefulSet) -> Result<Option<Patch>> {
    let changes = json_patch::diff(&serde_json::to_value(live)?, &serde_json::to_value(desired)?);
    if changes.0.is_empty() {
        return Ok(None);
    }

    let mut operations = Vec::with_capacity(changes.0.len() + 1);
    if let Some(version) = live.resource_version() {
        operations.push(PatchOperation::Test(TestOperation {
            path: PointerBuf::from_tokens(["metadata", "resourceVersion"]),
            value: Value::String(version),
        }));
    }
    operations.extend(changes.0);
    Ok(Some(Patch(operations)))
}
