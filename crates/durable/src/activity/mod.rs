//! Activity abstractions
//!
//! Activities are the side-effecting units of work an orchestration invokes.
//! They may perform arbitrary non-deterministic work; their recorded
//! results, not their re-execution, are what replay consumes.

mod context;
mod definition;

pub use context::ActivityContext;
pub use definition::{Activity, ActivityError};
