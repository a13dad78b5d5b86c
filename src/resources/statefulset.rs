//! StatefulSet generation for MongoDB resources
//!
//! `desired_statefulset` folds the MongoDB spec into an existing StatefulSet
//! (or an empty skeleton) and returns the target object. It only touches the
//! fields the operator owns; everything else on `current` is carried through
//! so the patch computed from the result never reverts fields written
//! by autoscalers, admission webhooks or users.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, ResourceRequirements, SecretKeySelector,
    SecretVolumeSource, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::crd::{MongoDB, StorageSpec};
use crate::resources::common::{
    owner_reference, selector_labels, workload_annotations, workload_labels,
};
use crate::resources::upsert::{NamedList, upsert_all, upsert_map, upsert_owner_reference};

/// Primary database container
pub const CONTAINER_NAME: &str = "mongodb";
pub const DATABASE_PORT_NAME: &str = "db";
pub const DATABASE_PORT: i32 = 27017;

/// Data volume, backed by a claim template or an emptyDir
pub const DATA_VOLUME: &str = "data";
pub const DATA_MOUNT_PATH: &str = "/data/db";

pub const INIT_SCRIPT_VOLUME: &str = "initial-script";
pub const INIT_SCRIPT_MOUNT_PATH: &str = "/docker-entrypoint-initdb.d";

/// Prometheus exporter sidecar
pub const EXPORTER_CONTAINER_NAME: &str = "exporter";
pub const EXPORTER_PORT_NAME: &str = "prom-http";
pub const EXPORTER_SECRET_VOLUME: &str = "db-secret";
pub const EXPORTER_SECRET_MOUNT_PATH: &str = "/var/run/secrets/kubedb.com/db-cred";

pub const ENV_ROOT_USERNAME: &str = "MONGO_INITDB_ROOT_USERNAME";
pub const ENV_ROOT_PASSWORD: &str = "MONGO_INITDB_ROOT_PASSWORD";
pub const SECRET_KEY_USERNAME: &str = "username";
pub const SECRET_KEY_PASSWORD: &str = "password";

pub const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// An empty StatefulSet carrying only the identity the resource will own
pub fn statefulset_skeleton(db: &MongoDB) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(db.offshoot_name()),
            namespace: db.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Merge the MongoDB spec into `current` and return the target StatefulSet
///
/// Pure and idempotent: feeding the result back in yields the same object.
pub fn desired_statefulset(
    current: StatefulSet,
    db: &MongoDB,
    config: &OperatorConfig,
) -> StatefulSet {
    let mut sts = current;

    sts.metadata.name = Some(db.offshoot_name());
    if sts.metadata.namespace.is_none() {
        sts.metadata.namespace = db.namespace();
    }
    upsert_map(&mut sts.metadata.labels, &workload_labels(db));
    upsert_map(&mut sts.metadata.annotations, &workload_annotations(db));
    upsert_owner_reference(&mut sts.metadata.owner_references, owner_reference(db));

    let mut spec = sts.spec.take().unwrap_or_default();
    apply_workload_spec(&mut spec, db, config);
    sts.spec = Some(spec);

    sts
}

fn apply_workload_spec(spec: &mut StatefulSetSpec, db: &MongoDB, config: &OperatorConfig) {
    // Single primary, whatever the resource asks for
    spec.replicas = Some(1);
    spec.service_name = Some(config.governing_service.clone());
    spec.selector = LabelSelector {
        match_labels: Some(selector_labels(db)),
        ..Default::default()
    };
    spec.update_strategy
        .get_or_insert_with(StatefulSetUpdateStrategy::default)
        .type_ = Some("RollingUpdate".to_string());

    let template = &mut spec.template;
    upsert_map(
        &mut template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .labels,
        &workload_labels(db),
    );

    let pod_spec = template.spec.get_or_insert_with(PodSpec::default);
    apply_containers(pod_spec, db, config);
    apply_scheduling(pod_spec, db);

    let mut volumes = NamedList::from_option(pod_spec.volumes.take());
    let mut claims = NamedList::from_option(spec.volume_claim_templates.take());

    apply_storage(&mut volumes, &mut claims, db.spec.storage.as_ref());

    if let Some(source) = db.init_script_source() {
        let mut volume = source.to_volume(INIT_SCRIPT_VOLUME);
        if let Some(live) = volumes.get(INIT_SCRIPT_VOLUME) {
            keep_default_modes(&mut volume, live);
        }
        volumes.upsert(volume);
    }

    if db.monitoring_port().is_some() {
        let volume = volumes.get_or_insert_with(EXPORTER_SECRET_VOLUME, || Volume {
            name: EXPORTER_SECRET_VOLUME.to_string(),
            ..Default::default()
        });
        volume
            .secret
            .get_or_insert_with(SecretVolumeSource::default)
            .secret_name = Some(db.database_secret_name());
    }

    pod_spec.volumes = volumes.into_option();
    spec.volume_claim_templates = claims.into_option();
}

fn apply_containers(pod_spec: &mut PodSpec, db: &MongoDB, config: &OperatorConfig) {
    let mut containers = NamedList::new(std::mem::take(&mut pod_spec.containers));

    let primary = containers.get_or_insert_with(CONTAINER_NAME, || Container {
        name: CONTAINER_NAME.to_string(),
        ..Default::default()
    });
    primary.image = Some(config.database_image(&db.spec.version));
    primary.args = Some(vec!["--auth".to_string()]);
    primary.ports = Some(vec![ContainerPort {
        name: Some(DATABASE_PORT_NAME.to_string()),
        container_port: DATABASE_PORT,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]);
    primary.resources = match &db.spec.resources {
        Some(resources) => Some(with_default_requests(resources.clone())),
        // The API server stores an unset block as `{}`
        None => primary
            .resources
            .take()
            .filter(|live| *live == ResourceRequirements::default()),
    };

    let secret_name = db.database_secret_name();
    upsert_all(
        &mut primary.env,
        [
            secret_env(ENV_ROOT_USERNAME, &secret_name, SECRET_KEY_USERNAME),
            secret_env(ENV_ROOT_PASSWORD, &secret_name, SECRET_KEY_PASSWORD),
        ],
    );

    let mut mounts = vec![VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: DATA_MOUNT_PATH.to_string(),
        ..Default::default()
    }];
    if db.init_script_source().is_some() {
        mounts.push(VolumeMount {
            name: INIT_SCRIPT_VOLUME.to_string(),
            mount_path: INIT_SCRIPT_MOUNT_PATH.to_string(),
            ..Default::default()
        });
    }
    upsert_all(&mut primary.volume_mounts, mounts);

    // A disabled monitor leaves an existing exporter in place
    if let Some(port) = db.monitoring_port() {
        let exporter = containers.get_or_insert_with(EXPORTER_CONTAINER_NAME, || Container {
            name: EXPORTER_CONTAINER_NAME.to_string(),
            ..Default::default()
        });
        exporter.image = Some(config.exporter_image());

        let mut args = vec![
            "export".to_string(),
            format!("--address=:{}", port),
            format!("--enable-analytics={}", config.enable_analytics),
        ];
        args.extend(config.exporter_log_flags());
        exporter.args = Some(args);

        exporter.ports = Some(vec![ContainerPort {
            name: Some(EXPORTER_PORT_NAME.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]);
        upsert_all(
            &mut exporter.volume_mounts,
            [VolumeMount {
                name: EXPORTER_SECRET_VOLUME.to_string(),
                mount_path: EXPORTER_SECRET_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }],
        );
    }

    pod_spec.containers = containers.into_vec();
}

/// Requests default to limits for every resource that sets only a limit
fn with_default_requests(mut resources: ResourceRequirements) -> ResourceRequirements {
    if let Some(limits) = &resources.limits {
        let requests = resources.requests.get_or_insert_with(BTreeMap::new);
        for (name, quantity) in limits {
            requests
                .entry(name.clone())
                .or_insert_with(|| quantity.clone());
        }
    }
    resources
}

/// Carry file modes defaulted by the API server when `volume` leaves them unset
fn keep_default_modes(volume: &mut Volume, live: &Volume) {
    if let (Some(source), Some(live)) = (volume.config_map.as_mut(), live.config_map.as_ref()) {
        source.default_mode = source.default_mode.or(live.default_mode);
    }
    if let (Some(source), Some(live)) = (volume.secret.as_mut(), live.secret.as_ref()) {
        source.default_mode = source.default_mode.or(live.default_mode);
    }
}

fn secret_env(name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Scheduling hints are only copied when set, so cluster defaults stay in effect
fn apply_scheduling(pod_spec: &mut PodSpec, db: &MongoDB) {
    let spec = &db.spec;
    if !spec.node_selector.is_empty() {
        pod_spec.node_selector = Some(spec.node_selector.clone());
    }
    if spec.affinity.is_some() {
        pod_spec.affinity = spec.affinity.clone();
    }
    if !spec.tolerations.is_empty() {
        pod_spec.tolerations = Some(spec.tolerations.clone());
    }
    if !spec.image_pull_secrets.is_empty() {
        pod_spec.image_pull_secrets = Some(spec.image_pull_secrets.clone());
    }
    if spec.scheduler_name.is_some() {
        pod_spec.scheduler_name = spec.scheduler_name.clone();
    }
}

/// Decide how the data directory is backed
///
/// Claim templates cannot change after creation, and a StatefulSet created
/// with an emptyDir keeps it even if storage is declared later.
fn apply_storage(
    volumes: &mut NamedList<Volume>,
    claims: &mut NamedList<PersistentVolumeClaim>,
    storage: Option<&StorageSpec>,
) {
    if claims.contains(DATA_VOLUME) {
        return;
    }
    match storage {
        Some(_) if volumes.contains(DATA_VOLUME) => {}
        Some(storage) => claims.upsert(data_claim_template(storage)),
        None => volumes.upsert(Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }),
    }
}

fn data_claim_template(storage: &StorageSpec) -> PersistentVolumeClaim {
    let access_modes = if storage.access_modes.is_empty() {
        vec![DEFAULT_ACCESS_MODE.to_string()]
    } else {
        storage.access_modes.clone()
    };

    let annotations = storage.storage_class_name.as_ref().map(|class| {
        BTreeMap::from([(STORAGE_CLASS_ANNOTATION.to_string(), class.clone())])
    });

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            annotations,
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
