//! Execution engine
//!
//! - [`ReplayExecutor`] drives replay passes and dispatches durable work
//! - [`OrchestrationRegistry`] / [`ActivityRegistry`] map names to handlers

mod executor;
mod registry;

pub use executor::{ExecutorConfig, ExecutorError, PassOutcome, ReplayExecutor, StartOutcome};
pub use registry::{ActivityRegistry, OrchestrationRegistry, RegistryError};
