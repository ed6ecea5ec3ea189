//! History events for persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrchestrationError;
use crate::activity::ActivityError;

/// Events stored in an instance's history log
///
/// These events form the append-only log for an orchestration instance.
/// They are used for:
/// - Persisting orchestration progress
/// - Replaying orchestrations after suspension or recovery
/// - Auditing and debugging
///
/// Events are immutable once written. Replay consumes them in append order:
/// each durable call site matches the scheduled event at its ordinal
/// position, and a completion never appears before its matching scheduled
/// event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    // =========================================================================
    // Orchestration Lifecycle Events
    // =========================================================================
    /// Orchestration was started with the given input
    OrchestrationStarted {
        /// The input captured when the instance was started
        input: serde_json::Value,
    },

    /// Orchestration completed successfully
    OrchestrationCompleted {
        /// The result value
        output: serde_json::Value,
    },

    /// Orchestration failed with an error
    OrchestrationFailed {
        /// Error details
        error: OrchestrationError,
    },

    // =========================================================================
    // Timer Events
    // =========================================================================
    /// Timer was created and will fire at the recorded deadline
    TimerScheduled {
        /// Call-site ordinal of the timer within the orchestration
        timer_id: u64,

        /// Absolute deadline computed when the timer was first scheduled
        fire_at: DateTime<Utc>,

        /// Requested delay in milliseconds
        ///
        /// Recorded separately from `fire_at` so replay can verify the call
        /// site still requests the same delay; the absolute deadline cannot
        /// be recomputed from a later pass.
        delay_ms: u64,
    },

    /// Timer fired (deadline reached)
    TimerFired {
        /// Timer identifier
        timer_id: u64,
    },

    // =========================================================================
    // Activity Events
    // =========================================================================
    /// Activity was scheduled for execution
    ActivityScheduled {
        /// Call-site ordinal of the activity within the orchestration
        call_id: u64,

        /// Type of activity to execute (used to look up in the registry)
        activity_type: String,

        /// Input for the activity
        input: serde_json::Value,
    },

    /// Activity completed successfully
    ActivityCompleted {
        /// Activity call identifier
        call_id: u64,

        /// Result returned by the activity
        result: serde_json::Value,
    },

    /// Activity failed; the error is surfaced to the orchestration as a value
    ActivityFailed {
        /// Activity call identifier
        call_id: u64,

        /// Error details
        error: ActivityError,
    },

    // =========================================================================
    // Status Events
    // =========================================================================
    /// Orchestration published a new custom status value
    CustomStatusSet {
        /// The opaque status value
        value: String,
    },
}

impl HistoryEvent {
    /// Get the call_id/timer_id if this is a scheduled or completion event
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            Self::TimerScheduled { timer_id, .. } | Self::TimerFired { timer_id } => {
                Some(*timer_id)
            }
            Self::ActivityScheduled { call_id, .. }
            | Self::ActivityCompleted { call_id, .. }
            | Self::ActivityFailed { call_id, .. } => Some(*call_id),
            _ => None,
        }
    }

    /// Check if this event schedules a durable operation
    ///
    /// Scheduled events are what replay matches against by call-site ordinal.
    pub fn is_scheduled(&self) -> bool {
        matches!(
            self,
            Self::TimerScheduled { .. } | Self::ActivityScheduled { .. }
        )
    }

    /// Check if this is a terminal orchestration event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::OrchestrationCompleted { .. } | Self::OrchestrationFailed { .. }
        )
    }
}
