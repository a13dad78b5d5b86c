//! Operator spawning utilities for integration tests
//!
//! Each test gets its own controller scoped to its namespace, so tests do not
//! see each other's resources. The controller runs in the test's runtime.

use kube::Client;
use mongodb_operator::{OperatorConfig, run_controller_scoped};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A namespace-scoped controller that stops when dropped
pub struct ScopedOperator {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl ScopedOperator {
    pub async fn start(client: Client, namespace: &str, config: OperatorConfig) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let namespace = namespace.to_string();

        tracing::info!("Starting scoped operator controller in {}", namespace);

        let handle = tokio::spawn(async move {
            run_controller_scoped(client, config, None, token, Some(&namespace)).await;
            tracing::debug!("Operator exited");
        });

        // Give the controller a moment to start watching
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self { handle, shutdown }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}
