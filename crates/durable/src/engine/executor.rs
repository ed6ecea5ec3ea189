//! Replay executor
//!
//! The `ReplayExecutor` drives orchestration instances: it starts them
//! (idempotently), re-runs their procedure against recorded history on every
//! wake-up, persists the events each pass produces, and hands new timers and
//! activity calls to their dispatchers. A single instance's passes are
//! strictly serialized on a per-instance lock; completions arriving from
//! timer and activity tasks funnel through the same lock, so the history log
//! only ever has one writer at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::activity::{Activity, ActivityContext, ActivityError};
use crate::persistence::{CreateOutcome, HistoryStore, InstanceStatus, StoreError};
use crate::workflow::{
    Dispatch, HistoryEvent, Orchestration, OrchestrationContext, OrchestrationError, PassEffects,
};

use super::registry::{ActivityRegistry, OrchestrationRegistry, RegistryError};

/// Configuration for the replay executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum events per instance (runaway-history guard)
    pub max_events_per_instance: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_events_per_instance: 10000,
        }
    }
}

/// Errors from executor operations
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// History is not replayable (missing or malformed start event)
    #[error("corrupt history for {0}: {1}")]
    CorruptHistory(String, String),

    /// Too many events
    #[error("instance {instance_id} has too many events ({actual} > {max})")]
    TooManyEvents {
        instance_id: String,
        actual: usize,
        max: usize,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of starting an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A fresh run was created and its first pass has executed
    Started,

    /// A run with this id is already in flight; nothing was changed
    AlreadyRunning,
}

/// Result of one replay pass
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Whether the instance is now terminal
    pub completed: bool,

    /// Number of new events written
    pub events_written: usize,

    /// Number of timers armed
    pub timers_armed: usize,

    /// Number of activities dispatched
    pub activities_dispatched: usize,
}

impl PassOutcome {
    fn terminal() -> Self {
        Self {
            completed: true,
            ..Self::default()
        }
    }
}

struct ExecutorInner {
    store: Arc<dyn HistoryStore>,
    orchestrations: OrchestrationRegistry,
    activities: ActivityRegistry,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    config: ExecutorConfig,
}

/// Replay executor
///
/// Cheap to clone; clones share the same store, registries and locks, which
/// is how spawned timer/activity tasks call back into the engine.
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
/// let executor = ReplayExecutor::new(store.clone(), orchestrations, activities);
///
/// executor.start("job-42", "async-job", input).await?;
/// let info = store.wait_for_completion("job-42", Duration::from_secs(30)).await?;
/// ```
#[derive(Clone)]
pub struct ReplayExecutor {
    inner: Arc<ExecutorInner>,
}

impl ReplayExecutor {
    /// Create a new executor over a store and registered handlers
    pub fn new(
        store: Arc<dyn HistoryStore>,
        orchestrations: OrchestrationRegistry,
        activities: ActivityRegistry,
    ) -> Self {
        Self::with_config(store, orchestrations, activities, ExecutorConfig::default())
    }

    /// Create a new executor with custom config
    pub fn with_config(
        store: Arc<dyn HistoryStore>,
        orchestrations: OrchestrationRegistry,
        activities: ActivityRegistry,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                orchestrations,
                activities,
                locks: DashMap::new(),
                config,
            }),
        }
    }

    /// Get the store this executor runs against
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.inner.store
    }

    /// Start an orchestration instance
    ///
    /// Idempotent: starting an id that is already Pending/Running changes
    /// nothing and reports [`StartOutcome::AlreadyRunning`]; a terminal
    /// predecessor is superseded by a fresh run.
    #[instrument(skip(self, input))]
    pub async fn start(
        &self,
        instance_id: &str,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<StartOutcome, ExecutorError> {
        if !self.inner.orchestrations.contains(orchestration) {
            return Err(RegistryError::UnknownOrchestration(orchestration.to_string()).into());
        }

        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        match self
            .inner
            .store
            .create_instance(instance_id, orchestration, input.clone())
            .await?
        {
            CreateOutcome::AlreadyRunning(info) => {
                info!(%instance_id, status = %info.status, "instance already in flight");
                Ok(StartOutcome::AlreadyRunning)
            }
            CreateOutcome::Created(_) => {
                self.inner
                    .store
                    .append_events(
                        instance_id,
                        0,
                        vec![HistoryEvent::OrchestrationStarted { input }],
                    )
                    .await?;
                self.inner
                    .store
                    .update_status(instance_id, InstanceStatus::Running, None, None)
                    .await?;
                info!(%instance_id, orchestration, "started instance");

                self.run_pass_locked(instance_id).await?;
                Ok(StartOutcome::Started)
            }
        }
    }

    /// Run one replay pass for an instance
    ///
    /// Normally the engine triggers passes itself when completions arrive;
    /// this entry point exists for recovery and tests.
    pub async fn run_pass(&self, instance_id: &str) -> Result<PassOutcome, ExecutorError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;
        self.run_pass_locked(instance_id).await
    }

    /// Handle a timer deadline being reached
    ///
    /// Firings for a terminal or superseded run are dropped; duplicates are
    /// absorbed so each timer fires at most once into history.
    #[instrument(skip(self))]
    pub async fn on_timer_fired(
        &self,
        instance_id: &str,
        run_id: Uuid,
        timer_id: u64,
    ) -> Result<PassOutcome, ExecutorError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        let Some(history) = self.completion_target(instance_id, run_id).await? else {
            return Ok(PassOutcome::default());
        };

        let already_fired = history
            .iter()
            .any(|e| matches!(e, HistoryEvent::TimerFired { timer_id: id } if *id == timer_id));
        if already_fired {
            debug!(%instance_id, timer_id, "duplicate timer firing dropped");
            return Ok(PassOutcome::default());
        }

        self.inner
            .store
            .append_events(
                instance_id,
                history.len(),
                vec![HistoryEvent::TimerFired { timer_id }],
            )
            .await?;
        debug!(%instance_id, timer_id, "timer fired");

        self.run_pass_locked(instance_id).await
    }

    /// Handle an activity completing successfully
    #[instrument(skip(self, result))]
    pub async fn on_activity_completed(
        &self,
        instance_id: &str,
        run_id: Uuid,
        call_id: u64,
        result: serde_json::Value,
    ) -> Result<PassOutcome, ExecutorError> {
        self.record_activity_outcome(instance_id, run_id, call_id, Ok(result))
            .await
    }

    /// Handle an activity failing
    ///
    /// The failure is recorded as history and surfaced to the orchestration
    /// as a value; it does not fail the instance by itself.
    #[instrument(skip(self, error))]
    pub async fn on_activity_failed(
        &self,
        instance_id: &str,
        run_id: Uuid,
        call_id: u64,
        error: ActivityError,
    ) -> Result<PassOutcome, ExecutorError> {
        self.record_activity_outcome(instance_id, run_id, call_id, Err(error))
            .await
    }

    /// Re-arm persisted timers and nudge non-terminal instances after a
    /// process restart
    ///
    /// Activities whose scheduled event has no completion are left pending:
    /// re-dispatching could execute a side effect a second time. Returns the
    /// number of timers re-armed.
    pub async fn resume(&self) -> Result<usize, ExecutorError> {
        let mut rearmed = 0;
        for instance_id in self.inner.store.list_instances().await? {
            let info = match self.inner.store.get_instance(&instance_id).await {
                Ok(info) => info,
                Err(StoreError::InstanceNotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if info.status.is_terminal() {
                continue;
            }

            let history = self.inner.store.load_history(&instance_id).await?;
            for event in &history {
                if let HistoryEvent::TimerScheduled {
                    timer_id, fire_at, ..
                } = event
                {
                    let fired = history.iter().any(
                        |e| matches!(e, HistoryEvent::TimerFired { timer_id: id } if id == timer_id),
                    );
                    if !fired {
                        self.arm_timer(instance_id.clone(), info.run_id, *timer_id, *fire_at);
                        rearmed += 1;
                    }
                }
            }

            // Pick up completions that were persisted but never processed
            self.run_pass(&instance_id).await?;
        }
        if rearmed > 0 {
            info!(rearmed, "re-armed persisted timers");
        }
        Ok(rearmed)
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn instance_lock(&self, instance_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .locks
            .entry(instance_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Validate that a completion still has a live target
    ///
    /// Returns the current history when the instance exists, is not
    /// terminal, and the run id matches; `None` means the completion is a
    /// no-op (superseded and terminal instances absorb late completions).
    async fn completion_target(
        &self,
        instance_id: &str,
        run_id: Uuid,
    ) -> Result<Option<Vec<HistoryEvent>>, ExecutorError> {
        let info = match self.inner.store.get_instance(instance_id).await {
            Ok(info) => info,
            Err(StoreError::InstanceNotFound(_)) => {
                debug!(%instance_id, "completion for unknown instance dropped");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if info.status.is_terminal() {
            debug!(%instance_id, status = %info.status, "completion for terminal instance dropped");
            return Ok(None);
        }
        if info.run_id != run_id {
            debug!(%instance_id, "completion for superseded run dropped");
            return Ok(None);
        }

        Ok(Some(self.inner.store.load_history(instance_id).await?))
    }

    async fn record_activity_outcome(
        &self,
        instance_id: &str,
        run_id: Uuid,
        call_id: u64,
        outcome: Result<serde_json::Value, ActivityError>,
    ) -> Result<PassOutcome, ExecutorError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        let Some(history) = self.completion_target(instance_id, run_id).await? else {
            return Ok(PassOutcome::default());
        };

        let already_done = history.iter().any(|e| {
            matches!(
                e,
                HistoryEvent::ActivityCompleted { call_id: id, .. }
                | HistoryEvent::ActivityFailed { call_id: id, .. } if *id == call_id
            )
        });
        if already_done {
            debug!(%instance_id, call_id, "duplicate activity completion dropped");
            return Ok(PassOutcome::default());
        }

        let event = match outcome {
            Ok(result) => HistoryEvent::ActivityCompleted { call_id, result },
            Err(error) => {
                warn!(%instance_id, call_id, %error, "activity failed");
                HistoryEvent::ActivityFailed { call_id, error }
            }
        };
        self.inner
            .store
            .append_events(instance_id, history.len(), vec![event])
            .await?;

        self.run_pass_locked(instance_id).await
    }

    /// One replay pass; the caller must hold the instance lock
    async fn run_pass_locked(&self, instance_id: &str) -> Result<PassOutcome, ExecutorError> {
        let info = self.inner.store.get_instance(instance_id).await?;
        if info.status.is_terminal() {
            debug!(%instance_id, status = %info.status, "instance already terminal");
            return Ok(PassOutcome::terminal());
        }

        let history = self.inner.store.load_history(instance_id).await?;
        if !matches!(
            history.first(),
            Some(HistoryEvent::OrchestrationStarted { .. })
        ) {
            return Err(ExecutorError::CorruptHistory(
                instance_id.to_string(),
                "first event must be orchestration_started".to_string(),
            ));
        }
        if history.len() > self.inner.config.max_events_per_instance {
            return Err(ExecutorError::TooManyEvents {
                instance_id: instance_id.to_string(),
                actual: history.len(),
                max: self.inner.config.max_events_per_instance,
            });
        }

        let baseline = history.len();
        let handler = self.inner.orchestrations.get(&info.orchestration)?;
        let ctx = OrchestrationContext::new(history, Utc::now());

        // The procedure future is created, polled once, and dropped without
        // ever crossing an await point; a pending poll means the procedure
        // is parked on an unresolved durable call.
        let (polled, effects): (
            Poll<Result<serde_json::Value, OrchestrationError>>,
            PassEffects,
        ) = {
            let mut fut = handler.run(ctx.clone(), info.input.clone());
            let polled = poll_once(fut.as_mut());
            drop(fut);
            (polled, ctx.take_effects())
        };

        if let Some(reason) = effects.nondeterminism {
            warn!(%instance_id, %reason, "replay diverged from history");
            let error = OrchestrationError::new(reason).with_code("NONDETERMINISM");
            self.inner
                .store
                .append_events(
                    instance_id,
                    baseline,
                    vec![HistoryEvent::OrchestrationFailed {
                        error: error.clone(),
                    }],
                )
                .await?;
            self.inner
                .store
                .update_status(instance_id, InstanceStatus::Failed, None, Some(error))
                .await?;
            return Ok(PassOutcome::terminal());
        }

        if let Some(value) = &effects.custom_status {
            self.inner
                .store
                .set_custom_status(instance_id, value)
                .await?;
        }

        let mut sequence = baseline;
        let mut events_written = 0;
        if !effects.new_events.is_empty() {
            events_written = effects.new_events.len();
            sequence = self
                .inner
                .store
                .append_events(instance_id, sequence, effects.new_events)
                .await?;
        }

        match polled {
            Poll::Ready(Ok(output)) => {
                info!(%instance_id, "instance completed");
                self.inner
                    .store
                    .append_events(
                        instance_id,
                        sequence,
                        vec![HistoryEvent::OrchestrationCompleted {
                            output: output.clone(),
                        }],
                    )
                    .await?;
                self.inner
                    .store
                    .update_status(instance_id, InstanceStatus::Completed, Some(output), None)
                    .await?;
                Ok(PassOutcome {
                    completed: true,
                    events_written: events_written + 1,
                    ..PassOutcome::default()
                })
            }
            Poll::Ready(Err(error)) => {
                error!(%instance_id, %error, "instance failed");
                self.inner
                    .store
                    .append_events(
                        instance_id,
                        sequence,
                        vec![HistoryEvent::OrchestrationFailed {
                            error: error.clone(),
                        }],
                    )
                    .await?;
                self.inner
                    .store
                    .update_status(instance_id, InstanceStatus::Failed, None, Some(error))
                    .await?;
                Ok(PassOutcome {
                    completed: true,
                    events_written: events_written + 1,
                    ..PassOutcome::default()
                })
            }
            Poll::Pending => {
                let mut outcome = PassOutcome {
                    events_written,
                    ..PassOutcome::default()
                };
                for dispatch in effects.dispatches {
                    match dispatch {
                        Dispatch::Timer { timer_id, fire_at } => {
                            debug!(%instance_id, timer_id, %fire_at, "arming timer");
                            self.arm_timer(
                                instance_id.to_string(),
                                info.run_id,
                                timer_id,
                                fire_at,
                            );
                            outcome.timers_armed += 1;
                        }
                        Dispatch::Activity {
                            call_id,
                            activity_type,
                            input,
                        } => {
                            debug!(%instance_id, call_id, %activity_type, "dispatching activity");
                            self.spawn_activity(
                                instance_id.to_string(),
                                info.run_id,
                                call_id,
                                activity_type,
                                input,
                            );
                            outcome.activities_dispatched += 1;
                        }
                    }
                }
                Ok(outcome)
            }
        }
    }

    /// Arm a timer task that reports back through `on_timer_fired`
    fn arm_timer(
        &self,
        instance_id: String,
        run_id: Uuid,
        timer_id: u64,
        fire_at: chrono::DateTime<chrono::Utc>,
    ) {
        let executor = self.clone();
        tokio::spawn(async move {
            // Past-due deadlines (e.g. re-armed after a restart) fire now
            if let Ok(delay) = (fire_at - Utc::now()).to_std() {
                tokio::time::sleep(delay).await;
            }
            if let Err(error) = executor.on_timer_fired(&instance_id, run_id, timer_id).await {
                error!(%instance_id, timer_id, %error, "failed to record timer firing");
            }
        });
    }

    /// Execute an activity handler once and report its outcome
    fn spawn_activity(
        &self,
        instance_id: String,
        run_id: Uuid,
        call_id: u64,
        activity_type: String,
        input: serde_json::Value,
    ) {
        let executor = self.clone();
        tokio::spawn(async move {
            let outcome = match executor.inner.activities.get(&activity_type) {
                Ok(handler) => {
                    let ctx = ActivityContext::new(instance_id.clone(), call_id, &activity_type);
                    handler.execute(ctx, input).await
                }
                Err(_) => Err(ActivityError::non_retryable(format!(
                    "no activity registered for type {activity_type}"
                ))
                .with_type("UNKNOWN_ACTIVITY")),
            };

            let report = match outcome {
                Ok(result) => {
                    executor
                        .on_activity_completed(&instance_id, run_id, call_id, result)
                        .await
                }
                Err(error) => {
                    executor
                        .on_activity_failed(&instance_id, run_id, call_id, error)
                        .await
                }
            };
            if let Err(error) = report {
                error!(%instance_id, call_id, %error, "failed to record activity outcome");
            }
        });
    }
}

/// Poll a procedure future exactly once with a no-wake waker
///
/// Durable futures resolve synchronously from history, so a single poll
/// either finishes the procedure or parks it at the first unresolved call.
fn poll_once<F>(fut: Pin<&mut F>) -> Poll<F::Output>
where
    F: Future + ?Sized,
{
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    fut.poll(&mut cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::persistence::InMemoryHistoryStore;
    use crate::workflow::Orchestration;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct DoubleActivity;

    #[async_trait]
    impl Activity for DoubleActivity {
        async fn execute(
            &self,
            _ctx: ActivityContext,
            input: Value,
        ) -> Result<Value, ActivityError> {
            let n = input.as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        }
    }

    struct DoubleOrchestration;

    #[async_trait(?Send)]
    impl Orchestration for DoubleOrchestration {
        async fn run(
            &self,
            ctx: OrchestrationContext,
            input: Value,
        ) -> Result<Value, OrchestrationError> {
            ctx.call_activity("double", input)
                .await
                .map_err(|e| OrchestrationError::new(e.message))
        }
    }

    struct TimerOrchestration;

    #[async_trait(?Send)]
    impl Orchestration for TimerOrchestration {
        async fn run(
            &self,
            ctx: OrchestrationContext,
            input: Value,
        ) -> Result<Value, OrchestrationError> {
            ctx.schedule_timer(Duration::from_millis(50)).await;
            Ok(input)
        }
    }

    struct ImmediateOrchestration;

    #[async_trait(?Send)]
    impl Orchestration for ImmediateOrchestration {
        async fn run(
            &self,
            _ctx: OrchestrationContext,
            input: Value,
        ) -> Result<Value, OrchestrationError> {
            Ok(input)
        }
    }

    struct FaultyOrchestration;

    #[async_trait(?Send)]
    impl Orchestration for FaultyOrchestration {
        async fn run(
            &self,
            _ctx: OrchestrationContext,
            _input: Value,
        ) -> Result<Value, OrchestrationError> {
            Err(OrchestrationError::new("bad branch").with_code("FAULT"))
        }
    }

    struct FallbackOrchestration;

    #[async_trait(?Send)]
    impl Orchestration for FallbackOrchestration {
        async fn run(
            &self,
            ctx: OrchestrationContext,
            _input: Value,
        ) -> Result<Value, OrchestrationError> {
            // Activity failures arrive as values and can be handled
            match ctx.call_activity("missing-activity", json!(null)).await {
                Ok(v) => Ok(v),
                Err(_) => Ok(json!("fallback")),
            }
        }
    }

    fn executor(store: Arc<dyn HistoryStore>) -> ReplayExecutor {
        let mut orchestrations = OrchestrationRegistry::new();
        orchestrations.register("double", Arc::new(DoubleOrchestration));
        orchestrations.register("timer", Arc::new(TimerOrchestration));
        orchestrations.register("immediate", Arc::new(ImmediateOrchestration));
        orchestrations.register("faulty", Arc::new(FaultyOrchestration));
        orchestrations.register("fallback", Arc::new(FallbackOrchestration));

        let mut activities = ActivityRegistry::new();
        activities.register("double", Arc::new(DoubleActivity));

        ReplayExecutor::new(store, orchestrations, activities)
    }

    #[tokio::test]
    async fn test_immediate_completion() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        let outcome = executor.start("inst", "immediate", json!(41)).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);

        let info = store.get_instance("inst").await.unwrap();
        assert_eq!(info.status, InstanceStatus::Completed);
        assert_eq!(info.output, Some(json!(41)));

        let history = store.load_history("inst").await.unwrap();
        assert!(matches!(
            history.last(),
            Some(HistoryEvent::OrchestrationCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_activity_roundtrip() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        executor.start("inst", "double", json!(21)).await.unwrap();
        let info = store
            .wait_for_completion("inst", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(info.status, InstanceStatus::Completed);
        assert_eq!(info.output, Some(json!(42)));

        let history = store.load_history("inst").await.unwrap();
        let kinds: Vec<_> = history.iter().map(std::mem::discriminant).collect();
        let expected = [
            std::mem::discriminant(&HistoryEvent::OrchestrationStarted { input: json!(0) }),
            std::mem::discriminant(&HistoryEvent::ActivityScheduled {
                call_id: 0,
                activity_type: String::new(),
                input: json!(0),
            }),
            std::mem::discriminant(&HistoryEvent::ActivityCompleted {
                call_id: 0,
                result: json!(0),
            }),
            std::mem::discriminant(&HistoryEvent::OrchestrationCompleted { output: json!(0) }),
        ];
        assert_eq!(kinds, expected);
    }

    #[tokio::test]
    async fn test_timer_completion() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        executor.start("inst", "timer", json!("done")).await.unwrap();

        // Still suspended on the timer immediately after start
        let info = store.get_instance("inst").await.unwrap();
        assert_eq!(info.status, InstanceStatus::Running);

        let info = store
            .wait_for_completion("inst", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(info.output, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_idempotent_start() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        let first = executor.start("inst", "timer", json!(1)).await.unwrap();
        let second = executor.start("inst", "timer", json!(2)).await.unwrap();

        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::AlreadyRunning);

        // Original input preserved; only one start event in the log
        let info = store.get_instance("inst").await.unwrap();
        assert_eq!(info.input, json!(1));
        let history = store.load_history("inst").await.unwrap();
        let starts = history
            .iter()
            .filter(|e| matches!(e, HistoryEvent::OrchestrationStarted { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn test_orchestration_fault_marks_failed() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        executor.start("inst", "faulty", json!({})).await.unwrap();

        let info = store.get_instance("inst").await.unwrap();
        assert_eq!(info.status, InstanceStatus::Failed);
        assert_eq!(info.error.as_ref().unwrap().code.as_deref(), Some("FAULT"));
    }

    #[tokio::test]
    async fn test_unknown_activity_failure_is_recoverable() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        executor.start("inst", "fallback", json!({})).await.unwrap();
        let info = store
            .wait_for_completion("inst", Duration::from_secs(5))
            .await
            .unwrap();

        // The handler is missing, but the orchestration chose a fallback
        assert_eq!(info.status, InstanceStatus::Completed);
        assert_eq!(info.output, Some(json!("fallback")));
    }

    #[tokio::test]
    async fn test_unknown_orchestration_rejected() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        let result = executor.start("inst", "ghost", json!({})).await;
        assert!(matches!(
            result,
            Err(ExecutorError::Registry(RegistryError::UnknownOrchestration(_)))
        ));
    }

    #[tokio::test]
    async fn test_stale_run_completion_dropped() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let executor = executor(store.clone());

        executor.start("inst", "timer", json!(1)).await.unwrap();

        // A completion carrying the wrong run id must be a no-op
        let outcome = executor
            .on_timer_fired("inst", Uuid::now_v7(), 0)
            .await
            .unwrap();
        assert_eq!(outcome.events_written, 0);

        let history = store.load_history("inst").await.unwrap();
        assert!(!history
            .iter()
            .any(|e| matches!(e, HistoryEvent::TimerFired { .. })));
    }
}
