//! Task supervisor
//!
//! Every long-lived loop (campaign dispatch per instance, warmup per
//! instance) runs as a named task with its own cancellation token. Stopping
//! one campaign never touches another's loops, and shutdown cancels and
//! awaits everything that is still running.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of one supervised task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// One campaign's loop on one instance
    CampaignInstance { campaign_id: Uuid, instance_name: String },
    /// One instance's warmup loop
    Warmup { instance_name: String },
}

impl TaskKey {
    /// Whether this key belongs to the given campaign
    pub fn is_campaign(&self, id: Uuid) -> bool {
        matches!(self, TaskKey::CampaignInstance { campaign_id, .. } if *campaign_id == id)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::CampaignInstance {
                campaign_id,
                instance_name,
            } => write!(f, "campaign:{}:{}", campaign_id, instance_name),
            TaskKey::Warmup { instance_name } => write!(f, "warmup:{}", instance_name),
        }
    }
}

struct TaskEntry {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of supervised background tasks
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tasks: Arc<Mutex<HashMap<TaskKey, TaskEntry>>>,
}

impl TaskSupervisor {
    /// Create a new supervisor
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task under `key`. A live task already registered under the
    /// same key is cancelled and awaited first, so at most one task per key
    /// ever runs.
    pub async fn spawn<F, Fut>(&self, key: TaskKey, f: F) -> CancellationToken
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let future = f(token.clone());

        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.remove(&key) {
            if !previous.handle.is_finished() {
                warn!(task = %key, "replacing a still-running task");
                previous.token.cancel();
                let _ = previous.handle.await;
            }
        }

        debug!(task = %key, "spawning supervised task");
        let handle = tokio::spawn(future);
        tasks.insert(
            key,
            TaskEntry {
                token: token.clone(),
                handle,
            },
        );
        token
    }

    /// Whether a task under `key` is currently running
    pub async fn is_running(&self, key: &TaskKey) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(key).is_some_and(|e| !e.handle.is_finished())
    }

    /// Cancel one task and wait for it to finish. Returns false when no
    /// such task was registered.
    pub async fn cancel(&self, key: &TaskKey) -> bool {
        let entry = self.tasks.lock().await.remove(key);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                let _ = entry.handle.await;
                info!(task = %key, "task cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every task belonging to one campaign and wait for them all.
    /// Returns how many were cancelled.
    pub async fn cancel_campaign(&self, campaign_id: Uuid) -> usize {
        let entries: Vec<(TaskKey, TaskEntry)> = {
            let mut tasks = self.tasks.lock().await;
            let keys: Vec<TaskKey> = tasks
                .keys()
                .filter(|k| k.is_campaign(campaign_id))
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| tasks.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = entries.len();
        for (key, entry) in entries {
            entry.token.cancel();
            let _ = entry.handle.await;
            debug!(task = %key, "campaign task cancelled");
        }
        count
    }

    /// Drop entries whose task already finished on its own
    pub async fn reap_finished(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, entry| !entry.handle.is_finished());
    }

    /// Cancel everything and wait. Used during shutdown.
    pub async fn shutdown(&self) {
        let entries: Vec<(TaskKey, TaskEntry)> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain().collect()
        };

        if entries.is_empty() {
            return;
        }

        info!(count = entries.len(), "shutting down supervised tasks");
        for (_, entry) in &entries {
            entry.token.cancel();
        }
        for (key, entry) in entries {
            let _ = entry.handle.await;
            debug!(task = %key, "task drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn warmup_key(name: &str) -> TaskKey {
        TaskKey::Warmup {
            instance_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_only_the_named_task() {
        let supervisor = TaskSupervisor::new();

        for name in ["a", "b"] {
            supervisor
                .spawn(warmup_key(name), |token| async move {
                    token.cancelled().await;
                })
                .await;
        }

        assert!(supervisor.cancel(&warmup_key("a")).await);
        assert!(!supervisor.is_running(&warmup_key("a")).await);
        assert!(supervisor.is_running(&warmup_key("b")).await);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_campaign_scopes_to_one_campaign() {
        let supervisor = TaskSupervisor::new();
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();

        for (campaign_id, instance) in [(c1, "a"), (c1, "b"), (c2, "a")] {
            let key = TaskKey::CampaignInstance {
                campaign_id,
                instance_name: instance.to_string(),
            };
            supervisor
                .spawn(key, |token| async move {
                    token.cancelled().await;
                })
                .await;
        }

        assert_eq!(supervisor.cancel_campaign(c1).await, 2);
        assert!(
            supervisor
                .is_running(&TaskKey::CampaignInstance {
                    campaign_id: c2,
                    instance_name: "a".to_string(),
                })
                .await
        );

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_respawn_replaces_previous_task() {
        let supervisor = TaskSupervisor::new();
        let key = warmup_key("a");

        supervisor
            .spawn(key.clone(), |token| async move {
                token.cancelled().await;
            })
            .await;
        supervisor
            .spawn(key.clone(), |token| async move {
                token.cancelled().await;
            })
            .await;

        assert!(supervisor.is_running(&key).await);
        assert!(supervisor.cancel(&key).await);
        assert!(!supervisor.cancel(&key).await);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(warmup_key("a"), |_| async {}).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        supervisor.reap_finished().await;
        assert!(!supervisor.is_running(&warmup_key("a")).await);
    }
}
