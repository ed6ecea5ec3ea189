//! Built-in async-job orchestrations
//!
//! The job orchestration models a third-party job that moves through
//! Queued → InProgress → Completed, each phase lasting a caller-supplied
//! duration enforced by a durable timer. Reading a job's progress is itself
//! an orchestration + activity pair running through the same engine
//! machinery; querying is not a special code path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::activity::{Activity, ActivityContext, ActivityError};
use crate::engine::{ActivityRegistry, ExecutorError, OrchestrationRegistry, ReplayExecutor};
use crate::persistence::{HistoryStore, StoreError};
use crate::workflow::{Orchestration, OrchestrationContext, OrchestrationError};

/// Orchestration name for the async job state machine
pub const ASYNC_JOB_ORCHESTRATION: &str = "async-job";

/// Orchestration name for the status query
pub const STATUS_QUERY_ORCHESTRATION: &str = "status-query";

/// Activity that reads another instance's custom status
pub const GET_JOB_STATUS_ACTIVITY: &str = "GetJobStatus";

/// Status reported for a job that was never started
pub const NOT_FOUND_STATUS: &str = "NotFound";

/// Status reported for a job that has not yet published a custom status
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Status reported when the bounded query wait elapses
pub const QUERY_TIMEOUT_STATUS: &str = "Timeout while retrieving job status";

/// Phases a job advances through, in order
///
/// The wire/custom-status representation is the string projection; keeping
/// the set closed here is what prevents unknown-status-string bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Queued,
    InProgress,
    Completed,
}

impl JobPhase {
    /// The custom-status string published for this phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters captured at the boundary and passed as immutable input
///
/// The orchestration must not read configuration or generate ids itself;
/// everything ambient is resolved by the caller before the run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobParams {
    /// Correlation id minted for this run
    pub correlation_id: Uuid,

    /// Seconds the job stays Queued
    pub queued_duration_secs: f64,

    /// Seconds the job stays InProgress
    pub in_progress_duration_secs: f64,
}

impl JobParams {
    /// Create job parameters
    pub fn new(correlation_id: Uuid, queued_duration_secs: f64, in_progress_duration_secs: f64) -> Self {
        Self {
            correlation_id,
            queued_duration_secs,
            in_progress_duration_secs,
        }
    }
}

fn phase_duration(secs: f64, field: &str) -> Result<Duration, OrchestrationError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| OrchestrationError::new(format!("invalid {field}: {secs}")).with_code("BAD_INPUT"))
}

/// The async job state machine
///
/// Publishes each phase the moment it is entered, then holds it for the
/// configured duration with a durable timer, so the progression survives
/// restarts and replays identically.
pub struct AsyncJobOrchestration;

#[async_trait(?Send)]
impl Orchestration for AsyncJobOrchestration {
    async fn run(
        &self,
        ctx: OrchestrationContext,
        input: Value,
    ) -> Result<Value, OrchestrationError> {
        let params: JobParams = serde_json::from_value(input)
            .map_err(|e| OrchestrationError::new(format!("invalid job parameters: {e}")).with_code("BAD_INPUT"))?;

        ctx.set_custom_status(JobPhase::Queued.as_str());
        ctx.schedule_timer(phase_duration(params.queued_duration_secs, "queued duration")?)
            .await;

        ctx.set_custom_status(JobPhase::InProgress.as_str());
        ctx.schedule_timer(phase_duration(
            params.in_progress_duration_secs,
            "in-progress duration",
        )?)
        .await;

        ctx.set_custom_status(JobPhase::Completed.as_str());

        Ok(json!([]))
    }
}

/// Degenerate orchestration whose single durable call reads another
/// instance's custom status
pub struct StatusQueryOrchestration;

#[async_trait(?Send)]
impl Orchestration for StatusQueryOrchestration {
    async fn run(
        &self,
        ctx: OrchestrationContext,
        input: Value,
    ) -> Result<Value, OrchestrationError> {
        ctx.call_activity(GET_JOB_STATUS_ACTIVITY, input)
            .await
            .map_err(|e| OrchestrationError::new(e.message).with_code("STATUS_READ_FAILED"))
    }
}

/// Activity backing the status query
///
/// Holds only a store handle; it reads the target's registry entry and
/// never touches its history.
pub struct GetJobStatusActivity {
    store: Arc<dyn HistoryStore>,
}

impl GetJobStatusActivity {
    /// Create the activity over a store
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Activity for GetJobStatusActivity {
    async fn execute(&self, _ctx: ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let target = input
            .as_str()
            .ok_or_else(|| ActivityError::non_retryable("target instance id must be a string"))?;

        match self.store.get_instance(target).await {
            Ok(info) => Ok(json!(info
                .custom_status
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string()))),
            Err(StoreError::InstanceNotFound(_)) => Ok(json!(NOT_FOUND_STATUS)),
            Err(e) => Err(ActivityError::retryable(e.to_string())),
        }
    }
}

/// Register the job orchestrations and their activity
pub fn register_jobs(
    orchestrations: &mut OrchestrationRegistry,
    activities: &mut ActivityRegistry,
    store: Arc<dyn HistoryStore>,
) {
    orchestrations.register(ASYNC_JOB_ORCHESTRATION, Arc::new(AsyncJobOrchestration));
    orchestrations.register(STATUS_QUERY_ORCHESTRATION, Arc::new(StatusQueryOrchestration));
    activities.register(GET_JOB_STATUS_ACTIVITY, Arc::new(GetJobStatusActivity::new(store)));
}

/// Derive the instance id owning a job name
pub fn job_instance_id(job_name: &str) -> String {
    format!("job-{job_name}")
}

/// Start (or idempotently re-join) the job for a name
pub async fn start_job(
    executor: &ReplayExecutor,
    job_name: &str,
    params: JobParams,
) -> Result<String, ExecutorError> {
    let instance_id = job_instance_id(job_name);
    let input = serde_json::to_value(&params)?;
    executor.start(&instance_id, ASYNC_JOB_ORCHESTRATION, input).await?;
    Ok(instance_id)
}

/// Query a job's status through a fresh status-query orchestration
///
/// Waits up to `wait` for the query instance to finish; on expiry the
/// sentinel timeout status is returned and the target job keeps running
/// untouched.
pub async fn query_job_status(
    executor: &ReplayExecutor,
    job_name: &str,
    wait: Duration,
) -> Result<String, ExecutorError> {
    let target = job_instance_id(job_name);
    let query_id = format!("status-query-{}", Uuid::now_v7());

    executor
        .start(&query_id, STATUS_QUERY_ORCHESTRATION, json!(target))
        .await?;

    match executor.store().wait_for_completion(&query_id, wait).await {
        Ok(info) => Ok(info
            .output
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_STATUS)
            .to_string()),
        Err(StoreError::WaitTimedOut(_)) => Ok(QUERY_TIMEOUT_STATUS.to_string()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryHistoryStore;

    fn job_runtime() -> ReplayExecutor {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let mut orchestrations = OrchestrationRegistry::new();
        let mut activities = ActivityRegistry::new();
        register_jobs(&mut orchestrations, &mut activities, store.clone());
        ReplayExecutor::new(store, orchestrations, activities)
    }

    #[test]
    fn test_job_phase_projection() {
        assert_eq!(JobPhase::Queued.as_str(), "Queued");
        assert_eq!(JobPhase::InProgress.to_string(), "InProgress");
        assert_eq!(JobPhase::Completed.as_str(), "Completed");
    }

    #[test]
    fn test_job_params_serialization() {
        let params = JobParams::new(Uuid::now_v7(), 0.5, 1.5);
        let json = serde_json::to_value(&params).unwrap();
        let parsed: JobParams = serde_json::from_value(json).unwrap();
        assert_eq!(params, parsed);
    }

    #[test]
    fn test_job_instance_id() {
        assert_eq!(job_instance_id("42"), "job-42");
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let executor = job_runtime();

        let instance_id = start_job(
            &executor,
            "42",
            JobParams::new(Uuid::now_v7(), 0.05, 0.05),
        )
        .await
        .unwrap();
        assert_eq!(instance_id, "job-42");

        let info = executor
            .store()
            .wait_for_completion(&instance_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(info.custom_status.as_deref(), Some("Completed"));
        assert_eq!(info.output, Some(json!([])));
    }

    #[tokio::test]
    async fn test_query_unknown_job() {
        let executor = job_runtime();

        let status = query_job_status(&executor, "nope", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status, NOT_FOUND_STATUS);
    }

    #[tokio::test]
    async fn test_invalid_params_fail_the_instance() {
        let executor = job_runtime();

        executor
            .start("job-bad", ASYNC_JOB_ORCHESTRATION, json!({"not": "params"}))
            .await
            .unwrap();

        let info = executor.store().get_instance("job-bad").await.unwrap();
        assert_eq!(
            info.error.as_ref().and_then(|e| e.code.as_deref()),
            Some("BAD_INPUT")
        );
    }
}
