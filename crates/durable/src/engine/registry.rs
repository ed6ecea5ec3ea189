//! Handler registries
//!
//! Orchestrations and activities are registered by name; the executor looks
//! handlers up during replay (orchestrations) and dispatch (activities).
//! Registries are populated at startup and immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::activity::Activity;
use crate::workflow::Orchestration;

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Orchestration type not registered
    #[error("unknown orchestration: {0}")]
    UnknownOrchestration(String),

    /// Activity type not registered
    #[error("unknown activity: {0}")]
    UnknownActivity(String),
}

/// Registry of orchestration handlers
pub struct OrchestrationRegistry {
    handlers: HashMap<String, Arc<dyn Orchestration>>,
}

impl Default for OrchestrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an orchestration handler under a name
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Orchestration>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Check if an orchestration is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Look up an orchestration handler
    pub fn get(&self, name: &str) -> Result<Arc<dyn Orchestration>, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownOrchestration(name.to_string()))
    }

    /// Get the number of registered orchestrations
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Get all registered orchestration names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for OrchestrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationRegistry")
            .field("orchestrations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry of activity handlers
pub struct ActivityRegistry {
    handlers: HashMap<String, Arc<dyn Activity>>,
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an activity handler under a type name
    pub fn register(&mut self, activity_type: impl Into<String>, handler: Arc<dyn Activity>) {
        self.handlers.insert(activity_type.into(), handler);
    }

    /// Check if an activity type is registered
    pub fn contains(&self, activity_type: &str) -> bool {
        self.handlers.contains_key(activity_type)
    }

    /// Look up an activity handler
    pub fn get(&self, activity_type: &str) -> Result<Arc<dyn Activity>, RegistryError> {
        self.handlers
            .get(activity_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownActivity(activity_type.to_string()))
    }

    /// Get the number of registered activities
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
