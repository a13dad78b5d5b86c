//! Unit tests for events and metrics emitted by `ensure_workload`

use std::sync::Arc;
use std::time::Duration;

use mongodb_operator::config::{OperatorConfig, ReadinessConfig};
use mongodb_operator::controller::{Context, Error, VerbOutcome, ensure_workload};
use mongodb_operator::health::{DatabaseLabels, HealthState, VerbLabels};

use crate::common::*;

fn config(timeout_secs: u64) -> OperatorConfig {
    OperatorConfig {
        readiness: ReadinessConfig {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(500),
        },
        ..Default::default()
    }
}

fn context(
    client: Arc<FakeKubeClient>,
    events: Arc<RecordingEventPublisher>,
    timeout_secs: u64,
) -> Context {
    Context::from_parts(client, events, config(timeout_secs))
}

#[tokio::test(start_paused = true)]
async fn test_created_publishes_successful() {
    let client = Arc::new(FakeKubeClient::new().with_running_pods());
    let events = Arc::new(RecordingEventPublisher::new());
    let ctx = context(client, events.clone(), 60);

    let outcome = ensure_workload(&ctx, &create_test_mongodb("e1", "ns"))
        .await
        .unwrap();
    assert_eq!(outcome, VerbOutcome::Created);

    let recorded = events.events();
    assert_eq!(recorded.len(), 1);
    let event = &recorded[0];
    assert!(!event.is_warning());
    assert_eq!(event.reason, "Successful");
    assert_eq!(event.action, "CreateOrPatch");
    assert_eq!(event.note.as_deref(), Some("Successfully created StatefulSet"));
    assert_eq!(event.resource.kind, "MongoDB");
    assert_eq!(event.resource.namespace, "ns");
    assert_eq!(event.resource.name, "e1");
    assert_eq!(event.resource.uid.as_deref(), Some("uid-e1"));
}

#[tokio::test(start_paused = true)]
async fn test_patched_publishes_successful() {
    let client = Arc::new(FakeKubeClient::new().with_running_pods());
    let events = Arc::new(RecordingEventPublisher::new());
    let ctx = context(client, events.clone(), 60);

    ensure_workload(&ctx, &create_test_mongodb("e1", "ns"))
        .await
        .unwrap();
    let upgraded = MongoDBBuilder::new("e1", "ns").with_version("7.0").build();
    let outcome = ensure_workload(&ctx, &upgraded).await.unwrap();
    assert_eq!(outcome, VerbOutcome::Patched);

    let recorded = events.events();
    assert_eq!(recorded.len(), 2);
    assert_eq!(
        recorded[1].note.as_deref(),
        Some("Successfully patched StatefulSet")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_is_silent() {
    let client = Arc::new(FakeKubeClient::new().with_running_pods());
    let events = Arc::new(RecordingEventPublisher::new());
    let ctx = context(client.clone(), events.clone(), 60);
    let db = create_test_mongodb("e1", "ns");

    ensure_workload(&ctx, &db).await.unwrap();
    let pod_listings = client.calls().list_pods;

    let outcome = ensure_workload(&ctx, &db).await.unwrap();
    assert_eq!(outcome, VerbOutcome::Unchanged);
    assert_eq!(events.events().len(), 1);
    assert_eq!(client.calls().list_pods, pod_listings);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_publishes_failed_to_start() {
    let client = Arc::new(FakeKubeClient::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let ctx = context(client.clone(), events.clone(), 5);

    let err = ensure_workload(&ctx, &create_test_mongodb("e1", "ns"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadinessTimeout { .. }));

    // The object was still created
    assert!(client.statefulset("ns", "e1").is_some());

    let recorded = events.events();
    assert_eq!(recorded.len(), 1);
    let event = &recorded[0];
    assert!(event.is_warning());
    assert_eq!(event.reason, "FailedToStart");
    let note = event.note.clone().unwrap();
    assert!(note.starts_with("Failed to CreateOrPatch StatefulSet. Reason: "));
    assert!(note.contains("0/1 pods running after 5s"));
}

#[tokio::test(start_paused = true)]
async fn test_guard_failure_publishes_nothing() {
    let client = Arc::new(FakeKubeClient::new());
    client.insert_statefulset(k8s_openapi::api::apps::v1::StatefulSet {
        metadata: kube::core::ObjectMeta {
            name: Some("e1".to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        },
        ..Default::default()
    });
    let events = Arc::new(RecordingEventPublisher::new());
    let ctx = context(client, events.clone(), 60);

    let err = ensure_workload(&ctx, &create_test_mongodb("e1", "ns"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NamingConflict(_)));
    assert!(events.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_verbs_are_counted() {
    let client = Arc::new(FakeKubeClient::new().with_running_pods());
    let health = Arc::new(HealthState::new());
    let mut ctx = Context::from_parts(
        client,
        Arc::new(RecordingEventPublisher::new()),
        config(60),
    );
    ctx.health_state = Some(health.clone());
    let db = create_test_mongodb("e1", "ns");

    ensure_workload(&ctx, &db).await.unwrap();
    ensure_workload(&ctx, &db).await.unwrap();
    ensure_workload(&ctx, &db).await.unwrap();

    let count = |verb: VerbOutcome| {
        health
            .metrics
            .workload_operations_total
            .get_or_create(&VerbLabels { verb })
            .get()
    };
    assert_eq!(count(VerbOutcome::Created), 1);
    assert_eq!(count(VerbOutcome::Unchanged), 2);
    assert_eq!(count(VerbOutcome::Patched), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_a_failed_start() {
    let health = Arc::new(HealthState::new());
    let mut ctx = context(
        Arc::new(FakeKubeClient::new()),
        Arc::new(RecordingEventPublisher::new()),
        5,
    );
    ctx.health_state = Some(health.clone());

    ensure_workload(&ctx, &create_test_mongodb("e1", "ns"))
        .await
        .unwrap_err();

    let failed = health
        .metrics
        .failed_starts_total
        .get_or_create(&DatabaseLabels::new("ns", "e1"))
        .get();
    assert_eq!(failed, 1);
}
