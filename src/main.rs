use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mongodb_operator::OperatorConfig;
use mongodb_operator::health::{HealthState, run_health_server};
use mongodb_operator::run_controller;

/// Lease configuration
const LEASE_NAME: &str = "mongodb-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mongodb_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting mongodb-operator");

    let config = OperatorConfig::from_env()?;
    info!(
        governing_service = %config.governing_service,
        docker_registry = %config.docker_registry,
        readiness_timeout_secs = config.readiness.timeout.as_secs(),
        "Loaded operator configuration"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let health_state = Arc::new(HealthState::new());
    let shutdown = CancellationToken::new();

    // Probes must answer even while this instance is not the leader
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease_params = || LeaseLockParams {
        holder_id: pod_name.clone(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
    };
    let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params());

    info!("Waiting to acquire leadership...");
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                break;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    let lease_renewal_handle = {
        let lease_lock = LeaseLock::new(client.clone(), &namespace, lease_params());

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {}
                    Ok(_) => {
                        error!("Lost leadership! Shutting down...");
                        // Exit so Kubernetes restarts us and we re-enter election
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    info!("Watching MongoDB resources (apiVersion: kubedb.com/v1alpha1)");

    let controller_handle = {
        let health_state = health_state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            run_controller(client, config, Some(health_state), shutdown).await;
        })
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Only reached if the renewal task panics
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false);
            info!("Marked operator as not ready");

            // Readiness waits return Cancelled and the controller drains
            shutdown.cancel();

            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
