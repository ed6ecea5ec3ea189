//! Orchestration trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::OrchestrationContext;

/// Error type for orchestration failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,
}

impl OrchestrationError {
    /// Create a new orchestration error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OrchestrationError {}

/// An orchestration is a deterministic, replayable procedure
///
/// Orchestrations are the core abstraction for durable execution. On every
/// wake-up the engine re-runs the procedure from its first line against the
/// recorded history; durable calls that already completed resolve inline
/// with their recorded result, and execution continues until the first
/// unresolved call (where the procedure suspends) or until it returns.
///
/// # Determinism
///
/// The procedure must be a pure function of its input and the results of
/// prior durable calls. It must not read the wall clock, generate
/// randomness, or read the environment directly; such values belong in the
/// input, captured once at start time by the caller. The engine detects
/// drift at durable call sites (a changed activity type, input, or timer
/// delay) and fails the instance rather than resolving it silently.
///
/// # Example
///
/// ```ignore
/// struct GreetOrchestration;
///
/// #[async_trait(?Send)]
/// impl Orchestration for GreetOrchestration {
///     async fn run(
///         &self,
///         ctx: OrchestrationContext,
///         input: Value,
///     ) -> Result<Value, OrchestrationError> {
///         ctx.set_custom_status("Greeting");
///         let name = ctx
///             .call_activity("LookupName", input)
///             .await
///             .map_err(|e| OrchestrationError::new(e.message))?;
///         Ok(json!(format!("hello, {name}")))
///     }
/// }
/// ```
#[async_trait(?Send)]
pub trait Orchestration: Send + Sync + 'static {
    /// Execute the orchestration procedure
    ///
    /// Called once per replay pass. The future is polled exactly once; it
    /// either finishes (terminal result) or parks on an unresolved durable
    /// call. The future never runs across threads, which is why it does not
    /// need to be `Send`.
    async fn run(
        &self,
        ctx: OrchestrationContext,
        input: Value,
    ) -> Result<Value, OrchestrationError>;
}
