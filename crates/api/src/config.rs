//! Environment configuration, read at the request boundary
//!
//! Orchestration code must never read the environment itself; every tunable
//! is resolved here and passed in as immutable input.

/// Phase durations for a new job run
#[derive(Debug, Clone, Copy)]
pub struct JobDurations {
    /// Seconds the job stays Queued
    pub queued_secs: f64,

    /// Seconds the job stays InProgress
    pub in_progress_secs: f64,
}

impl JobDurations {
    /// Read the phase durations from the environment
    ///
    /// Absent or unparseable values fall back to 1.0 seconds each.
    pub fn from_env() -> Self {
        Self {
            queued_secs: duration_var("ASYNC_JOB_QUEUED_DURATION_SEC"),
            in_progress_secs: duration_var("ASYNC_JOB_INPROGRESS_DURATION_SEC"),
        }
    }
}

/// Seconds the plain delay endpoint sleeps (`DELAY_SEC`, default 1.0)
pub fn delay_secs() -> f64 {
    duration_var("DELAY_SEC")
}

/// Listen address (`JOBFLOW_BIND`, default 0.0.0.0:8080)
pub fn bind_addr() -> String {
    std::env::var("JOBFLOW_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

fn duration_var(name: &str) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(1.0)
}
