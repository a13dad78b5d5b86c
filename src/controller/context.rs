use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::controller::client::{KubeClient, KubeClientImpl};
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::health::HealthState;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes API access
    pub client: Arc<dyn KubeClient>,
    /// Event sink for MongoDB resources
    pub events: Arc<dyn EventPublisher>,
    pub config: Arc<OperatorConfig>,
    /// Health state for metrics, absent in tests
    pub health_state: Option<Arc<HealthState>>,
    /// Cancelled on shutdown; aborts readiness waits
    pub shutdown: CancellationToken,
}

impl Context {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client: Arc::new(KubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client)),
            config: Arc::new(config),
            health_state,
            shutdown,
        }
    }

    /// Build a context from explicit collaborators, without metrics
    pub fn from_parts(
        client: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            client,
            events,
            config: Arc::new(config),
            health_state: None,
            shutdown: CancellationToken::new(),
        }
    }
}
