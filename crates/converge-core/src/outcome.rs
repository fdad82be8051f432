//! Reported results of a component run
//!
//! Components never return `Err` to the orchestrator. Each step they take is
//! recorded here and logged as it happens; the orchestrator only looks at the
//! aggregate [`Status`].

use crate::Error;
use serde::Serialize;
use std::fmt;

/// The reconciler components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    ReplicaSet,
    Shards,
    Sharding,
    Indexes,
    Users,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReplicaSet => "replica set",
            Self::Shards => "shards",
            Self::Sharding => "sharding",
            Self::Indexes => "indexes",
            Self::Users => "users",
        };
        f.write_str(name)
    }
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A command changed the cluster
    Applied,
    /// The cluster already matched
    Unchanged,
    /// Nothing was attempted
    Skipped,
    /// The step did not reach its goal
    Failed,
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// What the step acted on (set name, shard string, collection, user)
    pub target: String,
    pub status: Status,
    pub message: String,
}

/// Everything a component did in one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub component: Component,
    pub steps: Vec<Step>,
}

impl Outcome {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, target: impl Into<String>, status: Status, message: impl Into<String>) {
        let target = target.into();
        let message = message.into();
        match status {
            Status::Applied | Status::Unchanged => {
                tracing::info!(component = %self.component, target = %target, "{}", message)
            }
            Status::Skipped => {
                tracing::warn!(component = %self.component, target = %target, "{}", message)
            }
            Status::Failed => {
                tracing::error!(component = %self.component, target = %target, "{}", message)
            }
        }
        self.steps.push(Step {
            target,
            status,
            message,
        });
    }

    pub fn applied(&mut self, target: impl Into<String>, message: impl Into<String>) {
        self.record(target, Status::Applied, message);
    }

    pub fn unchanged(&mut self, target: impl Into<String>, message: impl Into<String>) {
        self.record(target, Status::Unchanged, message);
    }

    pub fn skipped(&mut self, target: impl Into<String>, message: impl Into<String>) {
        self.record(target, Status::Skipped, message);
    }

    pub fn failed(&mut self, target: impl Into<String>, message: impl Into<String>) {
        self.record(target, Status::Failed, message);
    }

    /// Record a component-level error: an unreachable cluster is a warning
    /// and skips the component, anything else fails it
    pub fn error(&mut self, target: impl Into<String>, error: &Error) {
        if error.is_connection() {
            self.skipped(target, format!("could not connect to database: {}", error));
        } else {
            self.failed(target, error.to_string());
        }
    }

    /// Aggregate status over all steps
    pub fn status(&self) -> Status {
        let has = |s: Status| self.steps.iter().any(|step| step.status == s);
        if has(Status::Failed) {
            Status::Failed
        } else if has(Status::Applied) {
            Status::Applied
        } else if self.steps.is_empty() || self.steps.iter().all(|s| s.status == Status::Skipped) {
            Status::Skipped
        } else {
            Status::Unchanged
        }
    }

    /// True unless a step failed
    pub fn is_success(&self) -> bool {
        self.status() != Status::Failed
    }

    /// Steps with the given status
    pub fn steps_with(&self, status: Status) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.status == status)
    }
}
