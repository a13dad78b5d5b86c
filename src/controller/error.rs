//! Error types for the MongoDB controller

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix where they wrap a foreign error
/// (e.g., `KubeError`, `SerializationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A StatefulSet with the intended name exists but belongs to someone else
    #[error("intended StatefulSet \"{0}\" already exists")]
    NamingConflict(String),

    #[error(
        "StatefulSet {name}: {running}/{expected} pods running after {}s",
        .timeout.as_secs()
    )]
    ReadinessTimeout {
        name: String,
        expected: i32,
        running: i32,
        timeout: Duration,
    },

    #[error("Cancelled while waiting for StatefulSet {0}")]
    Cancelled(String),
}

impl Error {
    fn api_response(&self) -> Option<&kube::error::ErrorResponse> {
        match self {
            Error::KubeError(kube::Error::Api(api_err)) => Some(api_err),
            _ => None,
        }
    }

    fn api_code(&self) -> Option<u16> {
        self.api_response().map(|r| r.code)
    }

    /// The object changed since it was read
    ///
    /// Either a 409, or a 422 from a JSON Patch whose resourceVersion `test`
    /// operation no longer holds.
    pub fn is_conflict(&self) -> bool {
        match self.api_response() {
            Some(r) if r.code == 409 => true,
            Some(r) if r.code == 422 => r.message.contains(FAILED_TEST_MESSAGE),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        if self.is_conflict() {
            return true;
        }
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            // Pods may still come up, and a shutdown hands the object to the next leader
            Error::ReadinessTimeout { .. } => true,
            Error::Cancelled(_) => true,
            // Needs a human to rename or delete the foreign object
            Error::NamingConflict(_) => false,
            Error::InvalidConfig(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }
}

/// What the API server reports when a JSON Patch `test` operation fails
pub const FAILED_TEST_MESSAGE: &str = "test failed";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.min(32) as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error; permanent errors wait the maximum delay
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            self.max_delay
        }
    }
}
