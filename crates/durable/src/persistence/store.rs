//! HistoryStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{HistoryEvent, OrchestrationError};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Instance not found
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Concurrency conflict (optimistic append failed)
    #[error("concurrency conflict: expected sequence {expected}, got {actual}")]
    ConcurrencyConflict { expected: usize, actual: usize },

    /// Instance is terminal; its history and registry entry are frozen
    #[error("instance is terminal: {0}")]
    InstanceTerminal(String),

    /// Bounded wait elapsed before the instance reached a terminal status
    #[error("timed out waiting for instance: {0}")]
    WaitTimedOut(String),

    /// I/O error from a durable backend
    #[error("io error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Lifecycle status of an orchestration instance
///
/// Set only by the engine; orchestration code publishes progress through the
/// independent custom status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance created but its first pass has not run
    Pending,

    /// Instance is running (possibly suspended on a durable call)
    Running,

    /// Instance completed successfully
    Completed,

    /// Instance failed
    Failed,

    /// Instance was terminated externally
    Terminated,
}

impl InstanceStatus {
    /// Terminal statuses freeze the instance: no appends, no status changes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Terminated)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Registry view of an orchestration instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Externally chosen identifier; the idempotency key for starts
    pub id: String,

    /// Orchestration type registered for this instance
    pub orchestration: String,

    /// Identity of this logical run
    ///
    /// A superseding start mints a fresh run id; completions carrying a
    /// stale run id are dropped instead of landing in the successor's
    /// history.
    pub run_id: Uuid,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Application-defined progress marker, independent of `status`
    pub custom_status: Option<String>,

    /// Immutable input captured at start time
    pub input: serde_json::Value,

    /// Result, set exactly once at the terminal transition
    pub output: Option<serde_json::Value>,

    /// Failure, set exactly once at the terminal transition
    pub error: Option<OrchestrationError>,

    /// Creation time of this run
    pub created_at: DateTime<Utc>,
}

/// Outcome of a create call
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// A fresh instance (possibly superseding a terminal predecessor)
    Created(InstanceInfo),

    /// An instance with this id is already Pending/Running; starting again
    /// is an idempotent no-op that returns the existing instance
    AlreadyRunning(InstanceInfo),
}

/// Store for instance registry entries and per-instance history logs
///
/// This trait is the single durable seam of the engine: it is both the
/// append-only history log and the externally queryable instance registry.
/// Implementations must be thread-safe; readers may run concurrently with a
/// replay pass, writes to one instance are serialized by the executor.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Create an instance, superseding a terminal predecessor
    ///
    /// Returns [`CreateOutcome::AlreadyRunning`] without touching anything
    /// when a non-terminal instance already holds the id.
    async fn create_instance(
        &self,
        instance_id: &str,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<CreateOutcome, StoreError>;

    /// Get the registry entry for an instance
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceInfo, StoreError>;

    /// List all known instance ids
    async fn list_instances(&self) -> Result<Vec<String>, StoreError>;

    /// Load the full history for replay
    async fn load_history(&self, instance_id: &str) -> Result<Vec<HistoryEvent>, StoreError>;

    /// Append events with optimistic concurrency
    ///
    /// `expected_sequence` must equal the current history length. Appending
    /// to a terminal instance is rejected. Returns the new length.
    async fn append_events(
        &self,
        instance_id: &str,
        expected_sequence: usize,
        events: Vec<HistoryEvent>,
    ) -> Result<usize, StoreError>;

    /// Publish a custom status value, visible to readers immediately
    async fn set_custom_status(&self, instance_id: &str, value: &str) -> Result<(), StoreError>;

    /// Update the lifecycle status, recording output/error on terminal
    /// transitions and waking completion waiters
    async fn update_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        output: Option<serde_json::Value>,
        error: Option<OrchestrationError>,
    ) -> Result<(), StoreError>;

    /// Block the caller until the instance is terminal or `timeout` elapses
    ///
    /// Never busy-polls and never blocks the instance's own execution; only
    /// the calling task waits, on a status notification plus a deadline.
    async fn wait_for_completion(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<InstanceInfo, StoreError>;
}
