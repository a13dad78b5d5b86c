//! In-memory stand-ins for the API server and the event sink
//!
//! `FakeKubeClient` keeps StatefulSets, pods and MongoDB statuses in memory.
//! It behaves like the API server where the convergence core depends on it:
//! creates fail with 409 when the name is taken, JSON Patches are applied
//! atomically and a failed `test` operation is a 422, and stored objects get
//! the defaults admission fills in (`resources: {}` on containers and
//! `defaultMode: 420` on secret and configMap volumes).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use kube::core::ObjectMeta;
use kube::runtime::events::EventType;
use mongodb_operator::controller::events::{EventPublisher, ResourceIdentity};
use mongodb_operator::controller::error::FAILED_TEST_MESSAGE;
use mongodb_operator::controller::{Error, KubeClient, Result};
use mongodb_operator::crd::MongoDBStatus;
use serde_json::Value;

type Key = (String, String);

/// File mode the API server puts on secret and configMap volumes
pub const DEFAULT_VOLUME_MODE: i32 = 420;

/// Build an API error the way kube surfaces one
pub fn api_error(code: u16, reason: &str) -> Error {
    Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    }))
}

/// How many times each API call was made
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub create: usize,
    pub patch: usize,
    pub list_pods: usize,
    pub patch_status: usize,
}

impl CallCounts {
    /// Creates and patches, the calls that mutate a StatefulSet
    pub fn writes(&self) -> usize {
        self.create + self.patch
    }
}

#[derive(Default)]
struct State {
    statefulsets: BTreeMap<Key, StatefulSet>,
    pods: BTreeMap<String, Vec<Pod>>,
    statuses: BTreeMap<Key, MongoDBStatus>,
    patches: Vec<json_patch::Patch>,
    next_version: u64,
    calls: CallCounts,
    pods_follow_statefulsets: bool,
    fail_next_patch: Option<u16>,
    fail_gets: Option<u16>,
}

#[derive(Default)]
pub struct FakeKubeClient {
    state: Mutex<State>,
}

impl FakeKubeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every StatefulSet in the store reports as many running pods as it has replicas
    pub fn with_running_pods(self) -> Self {
        self.state.lock().unwrap().pods_follow_statefulsets = true;
        self
    }

    /// Seed a StatefulSet as if another actor had created it
    pub fn insert_statefulset(&self, sts: StatefulSet) -> StatefulSet {
        let mut state = self.state.lock().unwrap();
        let key = key_of(&sts.metadata);
        let stored = state.stamp(sts);
        state.statefulsets.insert(key, stored.clone());
        stored
    }

    /// Apply a merge patch as another writer would, bumping the resourceVersion
    pub fn external_patch(&self, namespace: &str, name: &str, patch: Value) {
        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let current = state.statefulsets.get(&key).cloned().unwrap();
        let mut doc = serde_json::to_value(&current).unwrap();
        json_patch::merge(&mut doc, &patch);
        let updated = state.stamp(serde_json::from_value(doc).unwrap());
        state.statefulsets.insert(key, updated);
    }

    pub fn add_pod(&self, namespace: &str, pod: Pod) {
        let mut state = self.state.lock().unwrap();
        state
            .pods
            .entry(namespace.to_string())
            .or_default()
            .push(pod);
    }

    /// The next StatefulSet patch fails with this HTTP status
    pub fn fail_next_patch(&self, code: u16) {
        self.state.lock().unwrap().fail_next_patch = Some(code);
    }

    /// Every StatefulSet GET fails with this HTTP status
    pub fn fail_gets(&self, code: u16) {
        self.state.lock().unwrap().fail_gets = Some(code);
    }

    pub fn statefulset(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        let state = self.state.lock().unwrap();
        state
            .statefulsets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<MongoDBStatus> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// JSON Patches received, in order
    pub fn patches(&self) -> Vec<json_patch::Patch> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }
}

impl State {
    fn stamp(&mut self, mut sts: StatefulSet) -> StatefulSet {
        apply_server_defaults(&mut sts);
        self.next_version += 1;
        sts.metadata.resource_version = Some(self.next_version.to_string());
        sts.metadata.generation = Some(sts.metadata.generation.unwrap_or(0) + 1);
        if sts.metadata.uid.is_none() {
            sts.metadata.uid = Some(format!("sts-uid-{}", self.next_version));
        }
        sts
    }

    fn running_pods_for(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Vec<Pod> {
        self.statefulsets
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter_map(|(_, sts)| sts.spec.as_ref())
            .filter(|spec| spec.selector.match_labels.as_ref() == Some(selector))
            .flat_map(|spec| {
                let labels = selector.clone();
                (0..spec.replicas.unwrap_or(1)).map(move |_| running_pod(labels.clone()))
            })
            .collect()
    }
}

fn apply_server_defaults(sts: &mut StatefulSet) {
    let Some(pod) = sts.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
        return;
    };
    for container in &mut pod.containers {
        container.resources.get_or_insert_with(Default::default);
    }
    for volume in pod.volumes.iter_mut().flatten() {
        if let Some(secret) = volume.secret.as_mut() {
            secret.default_mode.get_or_insert(DEFAULT_VOLUME_MODE);
        }
        if let Some(config_map) = volume.config_map.as_mut() {
            config_map.default_mode.get_or_insert(DEFAULT_VOLUME_MODE);
        }
    }
}

fn key_of(meta: &ObjectMeta) -> Key {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn parse_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn matches_selector(pod: &Pod, selector: &BTreeMap<String, String>) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// A pod in phase Running with Ready=True
pub fn running_pod(labels: BTreeMap<String, String>) -> Pod {
    pod_with_phase(labels, "Running", "True")
}

pub fn pod_with_phase(labels: BTreeMap<String, String>, phase: &str, ready: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: ready.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl KubeClient for FakeKubeClient {
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        let mut state = self.state.lock().unwrap();
        state.calls.get += 1;
        if let Some(code) = state.fail_gets {
            return Err(api_error(code, "InternalError"));
        }
        Ok(state
            .statefulsets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet> {
        let mut state = self.state.lock().unwrap();
        state.calls.create += 1;
        let key = (namespace.to_string(), sts.metadata.name.clone().unwrap_or_default());
        if state.statefulsets.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut sts = sts.clone();
        sts.metadata.namespace = Some(namespace.to_string());
        let stored = state.stamp(sts);
        state.statefulsets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn patch_statefulset(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<StatefulSet> {
        let mut state = self.state.lock().unwrap();
        state.calls.patch += 1;
        state.patches.push(patch.clone());

        if let Some(code) = state.fail_next_patch.take() {
            return Err(api_error(code, "Injected"));
        }

        let key = (namespace.to_string(), name.to_string());
        let Some(current) = state.statefulsets.get(&key).cloned() else {
            return Err(api_error(404, "NotFound"));
        };

        let mut doc = serde_json::to_value(&current)?;
        if let Err(e) = json_patch::patch(&mut doc, patch) {
            let message = if matches!(e.kind, json_patch::PatchErrorKind::TestFailed { .. }) {
                format!("testing value failed: {}", FAILED_TEST_MESSAGE)
            } else {
                e.to_string()
            };
            return Err(Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message,
                reason: "Invalid".to_string(),
                code: 422,
            })));
        }
        let updated = state.stamp(serde_json::from_value(doc)?);
        state.statefulsets.insert(key, updated.clone());
        Ok(updated)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_pods += 1;
        let selector = parse_selector(label_selector);

        let mut pods: Vec<Pod> = state
            .pods
            .get(namespace)
            .map(|pods| {
                pods.iter()
                    .filter(|p| matches_selector(p, &selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if state.pods_follow_statefulsets {
            pods.extend(state.running_pods_for(namespace, &selector));
        }
        Ok(pods)
    }

    async fn patch_mongodb_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MongoDBStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.patch_status += 1;
        state
            .statuses
            .insert((namespace.to_string(), name.to_string()), status.clone());
        Ok(())
    }
}

/// An event captured by `RecordingEventPublisher`
#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub resource: ResourceIdentity,
    pub type_: EventType,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

impl RecordedEvent {
    pub fn is_warning(&self) -> bool {
        matches!(self.type_, EventType::Warning)
    }
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource: &ResourceIdentity,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            resource: resource.clone(),
            type_,
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}
