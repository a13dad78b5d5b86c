use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, GitRepoVolumeSource, LocalObjectReference,
    PersistentVolumeClaimVolumeSource, ResourceRequirements, SecretVolumeSource, Toleration,
    Volume,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MongoDB is the Schema for the mongodbs API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "kubedb.com",
    version = "v1alpha1",
    kind = "MongoDB",
    plural = "mongodbs",
    singular = "mongodb",
    shortname = "mg",
    namespaced,
    status = "MongoDBStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBSpec {
    /// MongoDB version, used as the image tag (e.g., "4.2", "7.0")
    pub version: String,

    /// Requested replica count.
    ///
    /// Accepted for API compatibility only. This resource kind runs a single
    /// primary, so the managed StatefulSet is always pinned to one replica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Persistent storage for the data directory.
    /// When omitted, an emptyDir volume is used instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    /// Compute resources for the database container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Secret holding the root credentials (keys `username` and `password`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_secret: Option<DatabaseSecret>,

    /// First-boot initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<InitSpec>,

    /// Prometheus exporter sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Scheduler for the database pods; the cluster default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,
}

/// Storage configuration for the data volume claim template
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the persistent volume (e.g., "1Gi", "100Gi")
    pub size: String,

    /// Access modes; defaults to ReadWriteOnce when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// Storage class name (uses the cluster default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSecret {
    pub secret_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitSpec {
    /// Volume holding bootstrap scripts, mounted into the entrypoint init directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_source: Option<ScriptSourceSpec>,
}

/// Where the init scripts come from. Exactly one source is expected.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<GitRepoVolumeSource>,
}

impl ScriptSourceSpec {
    /// Pod volume named `name` backed by this source
    pub fn to_volume(&self, name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            config_map: self.config_map.clone(),
            secret: self.secret.clone(),
            persistent_volume_claim: self.persistent_volume_claim.clone(),
            git_repo: self.git_repo.clone(),
            ..Default::default()
        }
    }
}

/// Metrics exporter configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    /// Enable the Prometheus exporter sidecar
    pub enabled: bool,

    /// Port for the metrics endpoint
    #[serde(default = "default_exporter_port")]
    pub port: i32,
}

impl Default for MonitorSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_exporter_port(),
        }
    }
}

fn default_exporter_port() -> i32 {
    56790
}

/// Status of the MongoDB resource
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBStatus {
    #[serde(default)]
    pub phase: DatabasePhase,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last failure reason, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Database lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub enum DatabasePhase {
    #[default]
    Pending,
    Creating,
    Running,
    Failed,
}

impl std::fmt::Display for DatabasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabasePhase::Pending => write!(f, "Pending"),
            DatabasePhase::Creating => write!(f, "Creating"),
            DatabasePhase::Running => write!(f, "Running"),
            DatabasePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False, or Unknown
    pub status: String,

    pub reason: String,

    pub message: String,

    pub last_transition_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl MongoDB {
    /// Name of every object this resource owns. Stable across reconciles.
    pub fn offshoot_name(&self) -> String {
        self.name_any()
    }

    /// Secret carrying the root credentials
    pub fn database_secret_name(&self) -> String {
        self.spec
            .database_secret
            .as_ref()
            .map(|s| s.secret_name.clone())
            .unwrap_or_else(|| format!("{}-auth", self.name_any()))
    }

    /// Exporter port when monitoring is enabled
    pub fn monitoring_port(&self) -> Option<i32> {
        self.spec
            .monitor
            .as_ref()
            .filter(|m| m.enabled)
            .map(|m| m.port)
    }

    /// Init script volume source, if one is declared
    pub fn init_script_source(&self) -> Option<&ScriptSourceSpec> {
        self.spec
            .init
            .as_ref()
            .and_then(|i| i.script_source.as_ref())
    }

    pub fn phase(&self) -> DatabasePhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }
}
