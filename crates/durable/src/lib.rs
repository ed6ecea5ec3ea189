//! # Durable Orchestration Engine
//!
//! A replay-based workflow orchestration engine for durable, crash-tolerant
//! execution of long-lived procedures.
//!
//! ## Features
//!
//! - **Event-sourced instances**: every decision is persisted as a history
//!   event, so an instance can be reconstructed from its log alone
//! - **Deterministic replay**: on every wake-up the procedure re-runs from
//!   its first line; recorded durable calls resolve inline and execution
//!   continues to the next undecided point
//! - **Durable timers**: scheduled deadlines survive restarts and replay as
//!   instantaneous results once fired
//! - **At-most-once activities**: side effects dispatch only when their
//!   scheduled event is first created, keyed by call-site ordinal
//! - **Queryable registry**: lifecycle status plus an application-defined
//!   custom status, readable at all times and frozen once terminal
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ReplayExecutor                         │
//! │  (re-runs procedures against history, persists decisions)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HistoryStore                          │
//! │  (append-only event log + instance registry, per instance)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Timer / Activity dispatchers                │
//! │  (arm deadlines, run side effects, report completions)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use jobflow_durable::prelude::*;
//!
//! struct HelloOrchestration;
//!
//! #[async_trait(?Send)]
//! impl Orchestration for HelloOrchestration {
//!     async fn run(
//!         &self,
//!         ctx: OrchestrationContext,
//!         input: Value,
//!     ) -> Result<Value, OrchestrationError> {
//!         ctx.set_custom_status("Working");
//!         ctx.schedule_timer(Duration::from_secs(1)).await;
//!         Ok(input)
//!     }
//! }
//! ```

pub mod activity;
pub mod engine;
pub mod jobs;
pub mod persistence;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{Activity, ActivityContext, ActivityError};
    pub use crate::engine::{
        ActivityRegistry, ExecutorConfig, ExecutorError, OrchestrationRegistry, ReplayExecutor,
        StartOutcome,
    };
    pub use crate::persistence::{
        CreateOutcome, FsHistoryStore, HistoryStore, InMemoryHistoryStore, InstanceInfo,
        InstanceStatus, StoreError,
    };
    pub use crate::workflow::{
        HistoryEvent, Orchestration, OrchestrationContext, OrchestrationError,
    };
}

// Re-export key types at crate root
pub use activity::{Activity, ActivityContext, ActivityError};
pub use engine::{
    ActivityRegistry, ExecutorConfig, ExecutorError, OrchestrationRegistry, PassOutcome,
    RegistryError, ReplayExecutor, StartOutcome,
};
pub use persistence::{
    CreateOutcome, FsHistoryStore, HistoryStore, InMemoryHistoryStore, InstanceInfo,
    InstanceStatus, StoreError,
};
pub use workflow::{HistoryEvent, Orchestration, OrchestrationContext, OrchestrationError};
