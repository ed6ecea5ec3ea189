//! Activity execution context

/// Context provided to activities during execution
///
/// Identifies the logical call on whose behalf the handler runs. Activities
/// hold only the owning instance's id, never the instance itself; results
/// flow back as history events, not direct mutation.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// Orchestration instance that scheduled this call
    pub instance_id: String,

    /// Call-site ordinal within the owning orchestration
    pub call_id: u64,

    /// Activity type being executed
    pub activity_type: String,
}

impl ActivityContext {
    /// Create a new activity context
    pub fn new(instance_id: impl Into<String>, call_id: u64, activity_type: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            call_id,
            activity_type: activity_type.into(),
        }
    }
}
