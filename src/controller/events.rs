//! Kubernetes Events for MongoDB resources
//!
//! Events are fire-and-forget: a failed publish is logged and never reaches
//! the reconcile result.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

use crate::crd::MongoDB;
use crate::resources::common::{API_VERSION, FIELD_MANAGER, KIND};

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// The StatefulSet was created or patched and its pods came up
    pub const SUCCESSFUL: &str = "Successful";
    /// Creating or patching the StatefulSet failed, or its pods never came up
    pub const FAILED_TO_START: &str = "FailedToStart";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    pub const CREATE_OR_PATCH: &str = "CreateOrPatch";
}

/// The object an event is recorded against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
}

impl ResourceIdentity {
    /// Identity of a MongoDB resource; `None` when it has no namespace or name
    pub fn from_resource(db: &MongoDB) -> Option<Self> {
        Some(Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            namespace: db.namespace()?,
            name: db.metadata.name.clone()?,
            uid: db.uid(),
        })
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(self.api_version.clone()),
            kind: Some(self.kind.clone()),
            namespace: Some(self.namespace.clone()),
            name: Some(self.name.clone()),
            uid: self.uid.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource`. Never fails; errors are logged.
    async fn publish(
        &self,
        resource: &ResourceIdentity,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource: &ResourceIdentity,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self
            .recorder
            .publish(&event, &resource.object_reference())
            .await
        {
            warn!(
                namespace = %resource.namespace,
                name = %resource.name,
                reason,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource: &ResourceIdentity,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Publish an event on a MongoDB resource, skipping resources without an identity
pub async fn publish_for(
    publisher: &dyn EventPublisher,
    db: &MongoDB,
    type_: EventType,
    reason: &str,
    note: String,
) {
    match ResourceIdentity::from_resource(db) {
        Some(identity) => {
            publisher
                .publish(&identity, type_, reason, actions::CREATE_OR_PATCH, Some(note))
                .await
        }
        None => debug!(reason, "Skipping event for MongoDB without namespace"),
    }
}
