//! Probe and metrics endpoints
//!
//! `/healthz` answers as long as the process runs, `/readyz` once the
//! controller owns the lease and is watching, and `/metrics` serves the
//! registry below in OpenMetrics text format.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;

use crate::controller::VerbOutcome;

const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Identifies one MongoDB resource in metric labels
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DatabaseLabels {
    pub namespace: String,
    pub name: String,
}

impl DatabaseLabels {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl EncodeLabelSet for DatabaseLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())
    }
}

/// How a reconcile ended
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ReconcileResult {
    Success,
    Error,
}

impl ReconcileResult {
    fn as_str(self) -> &'static str {
        match self {
            ReconcileResult::Success => "success",
            ReconcileResult::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub database: DatabaseLabels,
    pub result: ReconcileResult,
}

impl EncodeLabelSet for ReconcileLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.database.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.database.name.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())
    }
}

/// StatefulSet create-or-patch outcome
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct VerbLabels {
    pub verb: VerbOutcome,
}

impl EncodeLabelSet for VerbLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("verb", self.verb.to_string().as_str()).encode(encoder.encode_label())
    }
}

pub struct Metrics {
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    pub reconcile_duration_seconds: Family<DatabaseLabels, Histogram>,
    pub workload_operations_total: Family<VerbLabels, Counter>,
    /// StatefulSets whose pods did not come up after a write
    pub failed_starts_total: Family<DatabaseLabels, Counter>,
    /// Unix time of the last reconcile that converged without error
    pub last_success_timestamp_seconds: Gauge,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("mongodb_operator");

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "MongoDB reconciliations by result",
            reconciliations_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<DatabaseLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.005, 2.0, 14))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Time spent converging a MongoDB, readiness wait included",
            reconcile_duration_seconds.clone(),
        );

        let workload_operations_total = Family::<VerbLabels, Counter>::default();
        registry.register(
            "workload_operations",
            "StatefulSet create-or-patch operations by outcome",
            workload_operations_total.clone(),
        );

        let failed_starts_total = Family::<DatabaseLabels, Counter>::default();
        registry.register(
            "failed_starts",
            "Writes after which the StatefulSet pods did not become ready",
            failed_starts_total.clone(),
        );

        let last_success_timestamp_seconds = Gauge::default();
        registry.register(
            "last_success_timestamp_seconds",
            "Unix time of the last successful reconcile",
            last_success_timestamp_seconds.clone(),
        );

        Self {
            reconciliations_total,
            reconcile_duration_seconds,
            workload_operations_total,
            failed_starts_total,
            last_success_timestamp_seconds,
            registry,
        }
    }

    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let database = DatabaseLabels::new(namespace, name);
        self.reconcile_duration_seconds
            .get_or_create(&database)
            .observe(duration_secs);
        self.reconciliations_total
            .get_or_create(&ReconcileLabels {
                database,
                result: ReconcileResult::Success,
            })
            .inc();
        self.last_success_timestamp_seconds
            .set(chrono::Utc::now().timestamp());
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliations_total
            .get_or_create(&ReconcileLabels {
                database: DatabaseLabels::new(namespace, name),
                result: ReconcileResult::Error,
            })
            .inc();
    }

    pub fn record_workload_operation(&self, verb: VerbOutcome) {
        self.workload_operations_total
            .get_or_create(&VerbLabels { verb })
            .inc();
    }

    pub fn record_failed_start(&self, namespace: &str, name: &str) {
        self.failed_starts_total
            .get_or_create(&DatabaseLabels::new(namespace, name))
            .inc();
    }

    fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

/// State shared between the controller and the health server
#[derive(Default)]
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Metrics,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the health and metrics endpoints on `addr` until the process exits
pub async fn run_health_server(state: Arc<HealthState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Health server listening");
    axum::serve(listener, create_router(state)).await
}
