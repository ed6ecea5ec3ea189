//! Orchestration abstractions and types
//!
//! This module contains the core replay primitives:
//! - [`Orchestration`] trait for defining replayable procedures
//! - [`OrchestrationContext`] with the durable call surface
//! - [`HistoryEvent`] enum for persisted events
//! - [`OrchestrationError`] for terminal failures

mod context;
mod definition;
mod event;

pub use context::{ActivityFuture, OrchestrationContext, TimerFuture};
pub use definition::{Orchestration, OrchestrationError};
pub use event::HistoryEvent;

pub(crate) use context::{Dispatch, PassEffects};
