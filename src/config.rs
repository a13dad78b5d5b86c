//! Operator configuration
//!
//! Everything the convergence core needs beyond the MongoDB resource itself
//! lives here and is handed to every component through the controller
//! `Context`. Values are read from the environment once at startup.

use std::net::SocketAddr;
use std::time::Duration;

use crate::controller::error::{Error, Result};

/// Default headless service governing the database StatefulSets
pub const DEFAULT_GOVERNING_SERVICE: &str = "kubedb";

/// Default image registry for database and exporter images
pub const DEFAULT_DOCKER_REGISTRY: &str = "kubedb";

/// Image repository for the database container
pub const DATABASE_IMAGE: &str = "mongo";

/// Image repository for the exporter sidecar
pub const OPERATOR_IMAGE: &str = "operator";

/// Where the health and metrics server listens
pub const DEFAULT_HEALTH_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);

/// Timing of the post-mutation readiness wait
#[derive(Clone, Debug, PartialEq)]
pub struct ReadinessConfig {
    /// Overall deadline for the replicas to come up
    pub timeout: Duration,
    /// Delay between pod listings
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Headless service set as `serviceName` on every StatefulSet
    pub governing_service: String,
    /// Registry prefix for all images
    pub docker_registry: String,
    /// Tag of the operator image, used by the exporter sidecar
    pub operator_tag: String,
    /// Passed through to the exporter as `--enable-analytics`
    pub enable_analytics: bool,
    /// Log verbosity forwarded to the exporter as `--v`
    pub exporter_log_verbosity: u8,
    pub readiness: ReadinessConfig,
    pub health_addr: SocketAddr,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            governing_service: DEFAULT_GOVERNING_SERVICE.to_string(),
            docker_registry: DEFAULT_DOCKER_REGISTRY.to_string(),
            operator_tag: env!("CARGO_PKG_VERSION").to_string(),
            enable_analytics: true,
            exporter_log_verbosity: 3,
            readiness: ReadinessConfig::default(),
            health_addr: DEFAULT_HEALTH_ADDR,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let readiness = ReadinessConfig {
            timeout: match lookup("READINESS_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_var("READINESS_TIMEOUT_SECS", &v)?),
                None => defaults.readiness.timeout,
            },
            poll_interval: match lookup("READINESS_POLL_INTERVAL_MS") {
                Some(v) => Duration::from_millis(parse_var("READINESS_POLL_INTERVAL_MS", &v)?),
                None => defaults.readiness.poll_interval,
            },
        };

        if readiness.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "READINESS_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            governing_service: lookup("GOVERNING_SERVICE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.governing_service),
            docker_registry: lookup("DOCKER_REGISTRY")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.docker_registry),
            operator_tag: lookup("OPERATOR_TAG")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.operator_tag),
            enable_analytics: match lookup("ENABLE_ANALYTICS") {
                Some(v) => parse_var("ENABLE_ANALYTICS", &v)?,
                None => defaults.enable_analytics,
            },
            exporter_log_verbosity: match lookup("EXPORTER_LOG_VERBOSITY") {
                Some(v) => parse_var("EXPORTER_LOG_VERBOSITY", &v)?,
                None => defaults.exporter_log_verbosity,
            },
            readiness,
            health_addr: match lookup("HEALTH_ADDR") {
                Some(v) => parse_var("HEALTH_ADDR", &v)?,
                None => defaults.health_addr,
            },
        })
    }

    /// Database image for a given version
    pub fn database_image(&self, version: &str) -> String {
        format!("{}/{}:{}", self.docker_registry, DATABASE_IMAGE, version)
    }

    /// Exporter sidecar image
    pub fn exporter_image(&self) -> String {
        format!(
            "{}/{}:{}",
            self.docker_registry, OPERATOR_IMAGE, self.operator_tag
        )
    }

    /// Logging flags appended to the exporter arguments
    pub fn exporter_log_flags(&self) -> Vec<String> {
        vec![
            "--logtostderr=true".to_string(),
            format!("--v={}", self.exporter_log_verbosity),
        ]
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}
