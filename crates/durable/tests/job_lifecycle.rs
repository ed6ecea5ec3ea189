//! End-to-end scenarios for the async-job orchestrations: phase
//! progression, status queries, idempotent starts, terminal freeze,
//! supersede, and restart recovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use jobflow_durable::jobs::{
    self, JobParams, ASYNC_JOB_ORCHESTRATION, NOT_FOUND_STATUS, QUERY_TIMEOUT_STATUS,
    UNKNOWN_STATUS,
};
use jobflow_durable::prelude::*;

/// Parks on a distant timer and never publishes a custom status
struct SilentOrchestration;

#[async_trait(?Send)]
impl Orchestration for SilentOrchestration {
    async fn run(
        &self,
        ctx: OrchestrationContext,
        input: Value,
    ) -> Result<Value, OrchestrationError> {
        ctx.schedule_timer(Duration::from_secs(3600)).await;
        Ok(input)
    }
}

fn runtime(store: Arc<dyn HistoryStore>) -> ReplayExecutor {
    let mut orchestrations = OrchestrationRegistry::new();
    let mut activities = ActivityRegistry::new();
    jobs::register_jobs(&mut orchestrations, &mut activities, store.clone());
    orchestrations.register("silent", Arc::new(SilentOrchestration));
    ReplayExecutor::new(store, orchestrations, activities)
}

fn memory_runtime() -> (Arc<dyn HistoryStore>, ReplayExecutor) {
    let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let executor = runtime(store.clone());
    (store, executor)
}

fn params(queued: f64, in_progress: f64) -> JobParams {
    JobParams::new(Uuid::now_v7(), queued, in_progress)
}

#[tokio::test]
async fn fast_job_phases_are_observable() {
    let (store, executor) = memory_runtime();

    jobs::start_job(&executor, "42", params(0.1, 0.1))
        .await
        .unwrap();

    // Right after start the job is in an early phase
    let status = jobs::query_job_status(&executor, "42", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(
        status == "Queued" || status == "InProgress",
        "unexpected early status {status:?}"
    );

    // After both phases elapse it reports Completed
    store
        .wait_for_completion("job-42", Duration::from_secs(5))
        .await
        .unwrap();
    let status = jobs::query_job_status(&executor, "42", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(status, "Completed");
}

#[tokio::test]
async fn custom_status_is_monotonic() {
    let (store, executor) = memory_runtime();

    jobs::start_job(&executor, "mono", params(0.15, 0.15))
        .await
        .unwrap();

    let mut seen: Vec<String> = Vec::new();
    loop {
        let info = store.get_instance("job-mono").await.unwrap();
        if let Some(status) = info.custom_status {
            if seen.last() != Some(&status) {
                seen.push(status);
            }
        }
        if info.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(seen, ["Queued", "InProgress", "Completed"]);
}

#[tokio::test]
async fn query_for_job_never_started() {
    let (_store, executor) = memory_runtime();

    let status = jobs::query_job_status(&executor, "missing", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(status, NOT_FOUND_STATUS);
}

#[tokio::test]
async fn query_before_any_custom_status() {
    let (_store, executor) = memory_runtime();

    // An instance that exists but never published a custom status
    executor
        .start("job-silent", "silent", json!({}))
        .await
        .unwrap();

    let status = jobs::query_job_status(&executor, "silent", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(status, UNKNOWN_STATUS);
}

#[tokio::test]
async fn query_wait_expiry_returns_sentinel() {
    let (_store, executor) = memory_runtime();

    jobs::start_job(&executor, "slow", params(30.0, 30.0))
        .await
        .unwrap();

    // A zero wait cannot observe the query instance completing
    let status = jobs::query_job_status(&executor, "slow", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(status, QUERY_TIMEOUT_STATUS);
}

#[tokio::test]
async fn repeated_start_joins_the_running_job() {
    let (store, executor) = memory_runtime();

    jobs::start_job(&executor, "42", params(0.2, 0.2))
        .await
        .unwrap();
    let before = store.load_history("job-42").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = jobs::start_job(&executor, "42", params(9.0, 9.0))
        .await
        .unwrap();
    assert_eq!(second, "job-42");

    // Same run: no new start event, no reset timers
    let after = store.load_history("job-42").await.unwrap();
    let starts = |events: &[HistoryEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, HistoryEvent::OrchestrationStarted { .. }))
            .count()
    };
    let timers = |events: &[HistoryEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, HistoryEvent::TimerScheduled { .. }))
            .count()
    };
    assert_eq!(starts(&after), 1);
    assert_eq!(timers(&after), timers(&before));

    // And the original (fast) durations still complete the job
    let info = store
        .wait_for_completion("job-42", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(info.status, InstanceStatus::Completed);
}

#[tokio::test]
async fn terminal_instance_is_frozen_then_superseded() {
    let (store, executor) = memory_runtime();

    jobs::start_job(&executor, "42", params(0.05, 0.05))
        .await
        .unwrap();
    let done = store
        .wait_for_completion("job-42", Duration::from_secs(5))
        .await
        .unwrap();
    let first_run = done.run_id;

    // Frozen: no appends, custom status pinned
    let append = store
        .append_events(
            "job-42",
            store.load_history("job-42").await.unwrap().len(),
            vec![HistoryEvent::TimerFired { timer_id: 99 }],
        )
        .await;
    assert!(matches!(append, Err(StoreError::InstanceTerminal(_))));
    assert_eq!(done.custom_status.as_deref(), Some("Completed"));

    // A new start supersedes the terminal run with a fresh history
    jobs::start_job(&executor, "42", params(0.05, 0.05))
        .await
        .unwrap();
    let info = store.get_instance("job-42").await.unwrap();
    assert_ne!(info.run_id, first_run);
    assert_ne!(info.status, InstanceStatus::Completed);

    let info = store
        .wait_for_completion("job-42", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(info.custom_status.as_deref(), Some("Completed"));
}

#[tokio::test]
async fn resume_rearms_persisted_timers() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn HistoryStore> = Arc::new(FsHistoryStore::new(dir.path()).unwrap());

    // State a crashed process would have left behind: the job entered
    // Queued, its first timer was persisted, and the deadline has passed
    let input = serde_json::to_value(params(0.05, 0.05)).unwrap();
    store
        .create_instance("job-42", ASYNC_JOB_ORCHESTRATION, input.clone())
        .await
        .unwrap();
    store
        .append_events(
            "job-42",
            0,
            vec![
                HistoryEvent::OrchestrationStarted { input },
                HistoryEvent::CustomStatusSet {
                    value: "Queued".to_string(),
                },
                HistoryEvent::TimerScheduled {
                    timer_id: 0,
                    fire_at: Utc::now() - chrono::Duration::seconds(1),
                    delay_ms: 50,
                },
            ],
        )
        .await
        .unwrap();
    store.set_custom_status("job-42", "Queued").await.unwrap();
    store
        .update_status("job-42", InstanceStatus::Running, None, None)
        .await
        .unwrap();

    // A fresh executor over the same files picks the job back up
    let executor = runtime(store.clone());
    let rearmed = executor.resume().await.unwrap();
    assert_eq!(rearmed, 1);

    let info = store
        .wait_for_completion("job-42", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(info.status, InstanceStatus::Completed);
    assert_eq!(info.custom_status.as_deref(), Some("Completed"));
}
