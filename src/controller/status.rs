//! Status and conditions management for MongoDB resources
//!
//! This module provides utilities for managing Kubernetes-style conditions
//! and updating the status subresource.

use chrono::Utc;
use kube::ResourceExt;

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{Condition, DatabasePhase, MongoDB, MongoDBStatus};

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Database pods are running
    pub const READY: &str = "Ready";
    /// The StatefulSet is being created or rolled out
    pub const PROGRESSING: &str = "Progressing";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    ///
    /// `lastTransitionTime` only moves when the status flips.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_condition(condition_types::READY, bool_status(is_ready), reason, message)
    }

    pub fn progressing(self, is_progressing: bool, reason: &str, message: &str) -> Self {
        self.set_condition(
            condition_types::PROGRESSING,
            bool_status(is_progressing),
            reason,
            message,
        )
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

fn bool_status(value: bool) -> &'static str {
    if value {
        condition_status::TRUE
    } else {
        condition_status::FALSE
    }
}

/// Status manager for MongoDB resources
pub struct StatusManager<'a> {
    db: &'a MongoDB,
    ctx: &'a Context,
}

impl<'a> StatusManager<'a> {
    pub fn new(db: &'a MongoDB, ctx: &'a Context) -> Self {
        Self { db, ctx }
    }

    fn conditions(&self) -> ConditionBuilder {
        let existing = self
            .db
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();
        ConditionBuilder::from_existing(existing, self.db.metadata.generation)
    }

    /// Write the status subresource, skipping the call if nothing changed
    pub async fn update(&self, status: MongoDBStatus) -> Result<()> {
        if self.db.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let namespace = self
            .db
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        self.ctx
            .client
            .patch_mongodb_status(&namespace, &self.db.name_any(), &status)
            .await
    }

    pub async fn set_creating(&self) -> Result<()> {
        let conditions = self
            .conditions()
            .ready(false, "Creating", "StatefulSet is being created")
            .progressing(true, "CreatingStatefulSet", "Waiting for database pods")
            .build();

        self.update(MongoDBStatus {
            phase: DatabasePhase::Creating,
            observed_generation: self.db.metadata.generation,
            reason: None,
            conditions,
        })
        .await
    }

    pub async fn set_running(&self) -> Result<()> {
        let conditions = self
            .conditions()
            .ready(true, "PodsRunning", "Database pods are running")
            .progressing(false, "Stable", "StatefulSet is up to date")
            .build();

        self.update(MongoDBStatus {
            phase: DatabasePhase::Running,
            observed_generation: self.db.metadata.generation,
            reason: None,
            conditions,
        })
        .await
    }

    pub async fn set_failed(&self, reason: &str, message: &str) -> Result<()> {
        let conditions = self
            .conditions()
            .ready(false, reason, message)
            .progressing(false, "Failed", message)
            .build();

        self.update(MongoDBStatus {
            phase: DatabasePhase::Failed,
            observed_generation: self.db.metadata.generation,
            reason: Some(message.to_string()),
            conditions,
        })
        .await
    }
}
