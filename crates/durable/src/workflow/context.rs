//! Replay context for orchestration procedures
//!
//! The [`OrchestrationContext`] is the only interface an orchestration
//! procedure has to the outside world. Every durable primitive it exposes is
//! keyed by a call-site ordinal (a single counter across timers and
//! activities, incremented in program order), which is what makes re-running
//! the procedure from its first line safe: the Nth durable call always
//! matches the Nth scheduled event in history, regardless of wall-clock time
//! or payload contents.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::HistoryEvent;
use crate::activity::ActivityError;

/// A durable operation the executor must hand off after the pass
///
/// Dispatches are produced only for scheduled events created by the current
/// pass, never for replayed ones: that is the at-most-once dispatch rule.
#[derive(Debug, Clone)]
pub(crate) enum Dispatch {
    /// Arm a timer that fires at the given deadline
    Timer {
        timer_id: u64,
        fire_at: DateTime<Utc>,
    },

    /// Execute an activity handler
    Activity {
        call_id: u64,
        activity_type: String,
        input: Value,
    },
}

/// Everything a pass produced, drained by the executor after the poll
pub(crate) struct PassEffects {
    /// Events appended by this pass (history beyond the loaded baseline)
    pub new_events: Vec<HistoryEvent>,

    /// Side effects to hand to the timer service / activity invoker
    pub dispatches: Vec<Dispatch>,

    /// Latest custom status value seen this pass, for the registry
    pub custom_status: Option<String>,

    /// Set when replay diverged from recorded history
    pub nondeterminism: Option<String>,
}

struct CtxInner {
    /// Recorded history plus events appended during this pass
    history: Vec<HistoryEvent>,

    /// Number of events loaded from the store; `history[baseline..]` are new
    baseline: usize,

    /// Call-site ordinal counter shared by timers and activities
    next_ordinal: u64,

    /// Ordinal counter for custom-status call sites
    status_ordinal: usize,

    dispatches: Vec<Dispatch>,
    custom_status: Option<String>,
    nondeterminism: Option<String>,

    /// Pass start time, used only to stamp deadlines on newly created timers
    now: DateTime<Utc>,
}

impl CtxInner {
    fn nth_scheduled(&self, n: u64) -> Option<&HistoryEvent> {
        self.history
            .iter()
            .filter(|e| e.is_scheduled())
            .nth(n as usize)
    }

    fn flag_nondeterminism(&mut self, reason: String) {
        // Keep the first divergence; later ones are downstream noise
        if self.nondeterminism.is_none() {
            self.nondeterminism = Some(reason);
        }
    }
}

/// Replay-safe handle passed to orchestration procedures
///
/// Cloneable; all clones share the same pass state. Created fresh by the
/// executor for every replay pass.
#[derive(Clone)]
pub struct OrchestrationContext {
    inner: Arc<Mutex<CtxInner>>,
}

impl OrchestrationContext {
    /// Construct a context over the recorded history for one replay pass
    ///
    /// `now` stamps deadlines on timers created during this pass; replayed
    /// timers keep the deadline recorded when they were first scheduled.
    pub fn new(history: Vec<HistoryEvent>, now: DateTime<Utc>) -> Self {
        let baseline = history.len();
        Self {
            inner: Arc::new(Mutex::new(CtxInner {
                history,
                baseline,
                next_ordinal: 0,
                status_ordinal: 0,
                dispatches: Vec::new(),
                custom_status: None,
                nondeterminism: None,
                now,
            })),
        }
    }

    /// Schedule a durable timer for `delay` from the original schedule time
    ///
    /// On the pass that first reaches this call site the deadline is
    /// computed and persisted; every later pass resolves instantly once the
    /// matching [`HistoryEvent::TimerFired`] is in history.
    pub fn schedule_timer(&self, delay: Duration) -> TimerFuture {
        let mut inner = self.inner.lock();
        if inner.nondeterminism.is_some() {
            return TimerFuture { fired: false };
        }

        let ordinal = inner.next_ordinal;
        inner.next_ordinal += 1;
        let delay_ms = delay.as_millis() as u64;

        match inner.nth_scheduled(ordinal).cloned() {
            None => {
                // Brand-new call site: record and dispatch
                let timer_id = ordinal;
                let fire_at = inner.now + chrono::Duration::milliseconds(delay_ms as i64);
                inner.history.push(HistoryEvent::TimerScheduled {
                    timer_id,
                    fire_at,
                    delay_ms,
                });
                inner.dispatches.push(Dispatch::Timer { timer_id, fire_at });
                TimerFuture { fired: false }
            }
            Some(HistoryEvent::TimerScheduled {
                timer_id,
                delay_ms: recorded,
                ..
            }) => {
                if recorded != delay_ms {
                    inner.flag_nondeterminism(format!(
                        "timer delay changed at call {ordinal}: history recorded {recorded}ms, code requested {delay_ms}ms"
                    ));
                    return TimerFuture { fired: false };
                }
                let fired = inner
                    .history
                    .iter()
                    .any(|e| matches!(e, HistoryEvent::TimerFired { timer_id: id } if *id == timer_id));
                TimerFuture { fired }
            }
            Some(other) => {
                inner.flag_nondeterminism(format!(
                    "call {ordinal} is a timer in code but history recorded {other:?}"
                ));
                TimerFuture { fired: false }
            }
        }
    }

    /// Call an activity and await its recorded result
    ///
    /// The activity handler runs at most once per call site; replay returns
    /// the recorded result (or failure, as a value the procedure may handle)
    /// without re-executing it.
    pub fn call_activity(&self, activity_type: impl Into<String>, input: Value) -> ActivityFuture {
        let activity_type: String = activity_type.into();
        let mut inner = self.inner.lock();
        if inner.nondeterminism.is_some() {
            return ActivityFuture { outcome: None };
        }

        let ordinal = inner.next_ordinal;
        inner.next_ordinal += 1;

        match inner.nth_scheduled(ordinal).cloned() {
            None => {
                let call_id = ordinal;
                inner.history.push(HistoryEvent::ActivityScheduled {
                    call_id,
                    activity_type: activity_type.clone(),
                    input: input.clone(),
                });
                inner.dispatches.push(Dispatch::Activity {
                    call_id,
                    activity_type,
                    input,
                });
                ActivityFuture { outcome: None }
            }
            Some(HistoryEvent::ActivityScheduled {
                call_id,
                activity_type: recorded_type,
                input: recorded_input,
            }) => {
                if recorded_type != activity_type || recorded_input != input {
                    inner.flag_nondeterminism(format!(
                        "activity call {ordinal} changed: history recorded {recorded_type}, code requested {activity_type}"
                    ));
                    return ActivityFuture { outcome: None };
                }
                let outcome = inner.history.iter().find_map(|e| match e {
                    HistoryEvent::ActivityCompleted { call_id: id, result } if *id == call_id => {
                        Some(Ok(result.clone()))
                    }
                    HistoryEvent::ActivityFailed { call_id: id, error } if *id == call_id => {
                        Some(Err(error.clone()))
                    }
                    _ => None,
                });
                ActivityFuture { outcome }
            }
            Some(other) => {
                inner.flag_nondeterminism(format!(
                    "call {ordinal} is an activity in code but history recorded {other:?}"
                ));
                ActivityFuture { outcome: None }
            }
        }
    }

    /// Publish a custom status value, visible to external readers
    ///
    /// Independent of the lifecycle status and last-write-wins. Replayed
    /// calls are deduplicated against history so repeated passes do not grow
    /// the log; a different value at the same call site is a determinism
    /// violation.
    pub fn set_custom_status(&self, value: impl Into<String>) {
        let value: String = value.into();
        let mut inner = self.inner.lock();
        if inner.nondeterminism.is_some() {
            return;
        }

        let ordinal = inner.status_ordinal;
        inner.status_ordinal += 1;

        let recorded = inner
            .history
            .iter()
            .filter_map(|e| match e {
                HistoryEvent::CustomStatusSet { value } => Some(value.clone()),
                _ => None,
            })
            .nth(ordinal);

        match recorded {
            Some(recorded) if recorded == value => {
                inner.custom_status = Some(value);
            }
            Some(recorded) => {
                inner.flag_nondeterminism(format!(
                    "custom status {ordinal} changed: history recorded {recorded:?}, code set {value:?}"
                ));
            }
            None => {
                inner.history.push(HistoryEvent::CustomStatusSet {
                    value: value.clone(),
                });
                inner.custom_status = Some(value);
            }
        }
    }

    /// Drain everything the pass produced (executor-side)
    pub(crate) fn take_effects(&self) -> PassEffects {
        let mut inner = self.inner.lock();
        let baseline = inner.baseline;
        let new_events = inner.history.split_off(baseline);
        PassEffects {
            new_events,
            dispatches: std::mem::take(&mut inner.dispatches),
            custom_status: inner.custom_status.take(),
            nondeterminism: inner.nondeterminism.take(),
        }
    }
}

/// Future returned by [`OrchestrationContext::schedule_timer`]
///
/// Resolves immediately when the timer's firing is already in history;
/// otherwise stays pending for the rest of the pass (the executor polls the
/// procedure exactly once per pass, so pending means "suspend here").
pub struct TimerFuture {
    fired: bool,
}

impl Future for TimerFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.fired {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Future returned by [`OrchestrationContext::call_activity`]
///
/// An activity failure resolves as `Err(ActivityError)`: a value the
/// procedure may handle or propagate, not an engine fault.
pub struct ActivityFuture {
    outcome: Option<Result<Value, ActivityError>>,
}

impl Future for ActivityFuture {
    type Output = Result<Value, ActivityError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}
