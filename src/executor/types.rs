use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// Generates a new random UUID v4-based JobId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of work addressed to a registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Name of the registered handler to invoke (e.g., "compact_partition").
    pub handler: String,
    /// Affinity key. Keyed jobs run on the primary owner of `partition(key)`.
    pub key: Option<String>,
    /// Executor to run on; the scheduler's default when `None`.
    pub executor: Option<String>,
    /// Arbitrary JSON payload passed to the handler.
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            handler: handler.into(),
            key: None,
            executor: None,
            payload,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = Some(executor.into());
        self
    }
}

/// Where a submitted job went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRoute {
    /// Queued on a local executor.
    Local { executor: String },
    /// Sent to the primary owner of the job's key.
    Forwarded(NodeId),
}
