pub mod client;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod patch;
pub mod readiness;
pub mod reconciler;
pub mod status;
pub mod workload;

pub use client::{KubeClient, KubeClientImpl};
pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher, ResourceIdentity};
pub use guard::check_statefulset;
pub use readiness::wait_until_running;
pub use reconciler::{error_policy, reconcile};
pub use status::{ConditionBuilder, StatusManager};
pub use workload::{VerbOutcome, create_or_patch_statefulset, ensure_workload};
