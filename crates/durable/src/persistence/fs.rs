//! Filesystem implementation of HistoryStore
//!
//! One directory per instance under a root: `history.jsonl` holds the
//! append-only event log (one JSON event per line) and `meta.json` holds the
//! registry entry. Metadata writes go through a temp file + rename so a
//! crash never leaves a half-written registry entry. This is what makes
//! "survive a process restart" concrete: on startup the executor replays
//! whatever these files contain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::notify::CompletionWaiters;
use super::store::*;
use crate::workflow::{HistoryEvent, OrchestrationError};

/// Filesystem-backed implementation of HistoryStore
///
/// # Example
///
/// ```ignore
/// let store = FsHistoryStore::new("/var/lib/jobflow")?;
/// ```
pub struct FsHistoryStore {
    root: PathBuf,
    waiters: CompletionWaiters,
}

impl FsHistoryStore {
    /// Create a store rooted at the given directory, creating it if absent
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            waiters: CompletionWaiters::new(),
        })
    }

    fn instance_dir(&self, instance_id: &str) -> PathBuf {
        self.root.join(instance_id)
    }

    fn meta_path(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("meta.json")
    }

    fn history_path(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("history.jsonl")
    }

    async fn read_meta(&self, instance_id: &str) -> Result<InstanceInfo, StoreError> {
        let data = match fs::read_to_string(self.meta_path(instance_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::InstanceNotFound(instance_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Write metadata atomically (temp file + rename)
    async fn write_meta(&self, info: &InstanceInfo) -> Result<(), StoreError> {
        let path = self.meta_path(&info.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(info)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_events(&self, instance_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let data = fs::read_to_string(self.history_path(instance_id))
            .await
            .unwrap_or_default();
        let mut events = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

#[async_trait]
impl HistoryStore for FsHistoryStore {
    async fn create_instance(
        &self,
        instance_id: &str,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<CreateOutcome, StoreError> {
        match self.read_meta(instance_id).await {
            Ok(existing) if !existing.status.is_terminal() => {
                return Ok(CreateOutcome::AlreadyRunning(existing));
            }
            Ok(_) | Err(StoreError::InstanceNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        fs::create_dir_all(self.instance_dir(instance_id)).await?;
        let info = InstanceInfo {
            id: instance_id.to_string(),
            orchestration: orchestration.to_string(),
            run_id: Uuid::now_v7(),
            status: InstanceStatus::Pending,
            custom_status: None,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
        };
        self.write_meta(&info).await?;
        // Truncate any predecessor history
        fs::write(self.history_path(instance_id), b"").await?;
        self.waiters.reset(instance_id, InstanceStatus::Pending);
        Ok(CreateOutcome::Created(info))
    }

    async fn get_instance(&self, instance_id: &str) -> Result<InstanceInfo, StoreError> {
        self.read_meta(instance_id).await
    }

    async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    async fn load_history(&self, instance_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        // Ensure the instance exists before treating a missing file as empty
        self.read_meta(instance_id).await?;
        self.read_events(instance_id).await
    }

    async fn append_events(
        &self,
        instance_id: &str,
        expected_sequence: usize,
        events: Vec<HistoryEvent>,
    ) -> Result<usize, StoreError> {
        let info = self.read_meta(instance_id).await?;
        if info.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }

        let existing = self.read_events(instance_id).await?;
        if existing.len() != expected_sequence {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_sequence,
                actual: existing.len(),
            });
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(instance_id))
            .await?;
        let count = events.len();
        for event in events {
            let line = serde_json::to_string(&event)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(expected_sequence + count)
    }

    async fn set_custom_status(&self, instance_id: &str, value: &str) -> Result<(), StoreError> {
        let mut info = self.read_meta(instance_id).await?;
        if info.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }
        info.custom_status = Some(value.to_string());
        self.write_meta(&info).await
    }

    async fn update_status(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        output: Option<serde_json::Value>,
        error: Option<OrchestrationError>,
    ) -> Result<(), StoreError> {
        let mut info = self.read_meta(instance_id).await?;
        if info.status.is_terminal() {
            return Err(StoreError::InstanceTerminal(instance_id.to_string()));
        }

        info.status = status;
        if let Some(output) = output {
            info.output = Some(output);
        }
        if let Some(error) = error {
            info.error = Some(error);
        }
        self.write_meta(&info).await?;

        self.waiters.publish(instance_id, status);
        Ok(())
    }

    async fn wait_for_completion(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<InstanceInfo, StoreError> {
        let info = self.read_meta(instance_id).await?;
        if info.status.is_terminal() {
            return Ok(info);
        }

        // Channels are in-memory only; make sure one exists before parking,
        // then re-read to close the gap against a racing terminal write
        self.waiters.ensure(instance_id, info.status);
        let info = self.read_meta(instance_id).await?;
        if info.status.is_terminal() {
            return Ok(info);
        }

        if self.waiters.wait_terminal(instance_id, timeout).await {
            self.read_meta(instance_id).await
        } else {
            Err(StoreError::WaitTimedOut(instance_id.to_string()))
        }
    }
}
