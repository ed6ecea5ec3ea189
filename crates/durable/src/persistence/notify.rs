//! Terminal-transition notification shared by store implementations

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::InstanceStatus;

/// Watch channels that wake `wait_for_completion` callers
///
/// One channel per instance id. Superseding a run replaces the channel, so
/// waiters parked on the predecessor observe the drop and re-subscribe to
/// the fresh run.
pub(crate) struct CompletionWaiters {
    senders: Mutex<HashMap<String, watch::Sender<InstanceStatus>>>,
}

impl CompletionWaiters {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Install a fresh channel for a new run
    pub(crate) fn reset(&self, instance_id: &str, status: InstanceStatus) {
        let (tx, _rx) = watch::channel(status);
        self.senders.lock().insert(instance_id.to_string(), tx);
    }

    /// Install a channel only if none exists (lazy subscription path)
    pub(crate) fn ensure(&self, instance_id: &str, status: InstanceStatus) {
        let mut senders = self.senders.lock();
        senders
            .entry(instance_id.to_string())
            .or_insert_with(|| watch::channel(status).0);
    }

    /// Publish a status change to any parked waiters
    pub(crate) fn publish(&self, instance_id: &str, status: InstanceStatus) {
        if let Some(tx) = self.senders.lock().get(instance_id) {
            let _ = tx.send(status);
        }
    }

    /// Wait until a terminal status is observed, up to `timeout`
    ///
    /// Returns false on deadline expiry or when the instance has no channel
    /// (unknown id); the caller re-reads the registry either way.
    pub(crate) async fn wait_terminal(&self, instance_id: &str, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let mut rx = match self.senders.lock().get(instance_id) {
                    Some(tx) => tx.subscribe(),
                    None => return false,
                };
                loop {
                    let status = *rx.borrow();
                    if status.is_terminal() {
                        return true;
                    }
                    if rx.changed().await.is_err() {
                        // Sender replaced (superseded run); re-subscribe
                        break;
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }
}
