//! In-memory implementation of HistoryStore

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::notify::CompletionWaiters;
use super::store::*;
use crate::workflow::{HistoryEvent, OrchestrationError};

/// Internal instance state
struct InstanceState {
    orchestration: String,
    run_id: Uuid,
    status: InstanceStatus,
    custom_status: Option<String>,
    input: serde_json::Value,
    output: Option<serde_json::Value>,
    error: Option<OrchestrationError>,
    created_at: chrono::DateTime<chrono::Utc>,
    events: Vec<HistoryEvent>,
}

impl InstanceState {
    fn info(&self, id: &str) -> InstanceInfo {
        InstanceInfo {
            id: id.to_string(),
            orchestration: self.orchestration.clone(),
            run_id: self.run_id,
            status: self.status,
            custom_status: self.custom_status.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
        }
    }
}

/// In-memory implementation of HistoryStore
///
/// The default store for tests and for deployments that do not need to
/// survive a process restart. Provides the same semantics as the
/// filesystem implementation.
///
/// # Example
///
/// ```
/// use jobflow_durable::InMemoryHistoryStore;
///
/// let store = InMemoryHistoryStore::new();
/// ```
pub struct InMemoryHistoryStore {
    instances: RwLock<HashMap<String, InstanceState>>,
    waiters: CompletionWaiters,
}

impl InMemoryHistoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            waiters: CompletionWaiters::new(),
        }
    }

    /// Get the number of instances
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.instances.write().clear();
    }

    fn fresh_state(orchestration: &str, input: serde_json::Value) -> InstanceState {
        InstanceState {
            orchestration: orchestration.to_string(),
            run_id: Uuid::now_v7(),
            status: InstanceStatus::Pending,
            custom_status: None,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_instance(
        &self,
        instance_id: &str,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<CreateOutcome, StoreError> {
        let mut instances = self.instances.write();

        if let Some(existing) = instances.get(instance_id) {
            if !existing.status.is_terminal() {
                return Ok(CreateOutcome::AlreadyRunning(existing.info(instance_id)));
            }
            // Terminal predecessor is superseded by a fresh run
        }

        let state = Self::fresh_state(orchestration, input);
        let info = state.info(instance_id);
        instances.insert(instance_id.to_string(), state);
        self.waiters.reset(instance_id, InstanceStatus::Pending);
        Ok(CreateOutcome::Created(info))
    }

    async fn get_instance(&self, instance_id: &str) -> Result<InstanceInfo, StoreError> {
        let instances = self.instances.read();
        instances
            .get(instance_id)
            .map(|s| s.info(instance_id))
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.instances.read().keys().cloned().collect())
    }

    async fn load_history(&self, instance_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let instances = self.instances.read();
        instances
            .get(instance_id)
            .map(|s| s.events.clone())
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    async fn append_events(
        &self,
        instance_id: &str,
        expected_sequence: usize,
        events: Vec<HistoryEvent>,
    ) -> Result<usize, StoreError> {
        let mut instances = self.instances.write();
        let state = instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;

        if state.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }

        let actual = state.events.len();
        if actual != expected_sequence {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_sequence,
                actual,
            });
        }

        state.events.extend(events);
        Ok(state.events.len())
    }

    async fn set_custom_status(&self, instance_id: &str, value: &str) -> Result<(), StoreError> {
        let mut instances = self.instances.write();
        let state = instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;

        if state.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }

        state.custom_status = Some(value.to_string());
        Ok(())
    }

    async fn update_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        output: Option<serde_json::Value>,
        error: Option<OrchestrationError>,
    ) -> Result<(), StoreError> {
        let mut instances = self.instances.write();
        let state = instances
            .get_mut(instance_id)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?;

        if state.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }

        state.status = status;
        if let Some(output) = output {
            state.output = Some(output);
        }
        if let Some(error) = error {
            state.error = Some(error);
        }
        drop(instances);

        self.waiters.publish(instance_id, status);
        Ok(())
    }

    async fn wait_for_completion(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<InstanceInfo, StoreError> {
        let info = self.get_instance(instance_id).await?;
        if info.status.is_terminal() {
            return Ok(info);
        }

        if self.waiters.wait_terminal(instance_id, timeout).await {
            self.get_instance(instance_id).await
        } else {
            Err(StoreError::WaitTimedOut(instance_id.to_string()))
        }
    }
}
