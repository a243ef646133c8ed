//! Background pipeline supervision
//!
//! Owns the detached task for every in-flight menu together with its
//! cancellation token. The HTTP path spawns and returns; tests and shutdown
//! use `join`/`shutdown` as deterministic join points.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct SupervisedTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Registry of running menu pipelines
#[derive(Clone, Default)]
pub struct PipelineSupervisor {
    tasks: Arc<Mutex<HashMap<Uuid, SupervisedTask>>>,
}

impl PipelineSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the pipeline built by `make` for `menu_id`
    ///
    /// `make` receives the task's cancellation token. Returns false (and
    /// spawns nothing) if a pipeline for this menu is already running. The
    /// entry removes itself when the task ends.
    pub async fn spawn<F, Fut>(&self, menu_id: Uuid, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&menu_id) {
            tracing::warn!(menu_id = %menu_id, "Pipeline already running, not spawning another");
            return false;
        }

        let cancel = CancellationToken::new();
        let pipeline = make(cancel.clone());
        let registry = self.tasks.clone();

        let handle = tokio::spawn(async move {
            pipeline.await;
            registry.lock().await.remove(&menu_id);
        });

        tasks.insert(
            menu_id,
            SupervisedTask {
                cancel,
                handle: Some(handle),
            },
        );
        tracing::debug!(menu_id = %menu_id, running = tasks.len(), "Pipeline task spawned");
        true
    }

    /// Request cancellation of a running pipeline
    ///
    /// Returns false if no pipeline is running for `menu_id`.
    pub async fn abort(&self, menu_id: Uuid) -> bool {
        match self.tasks.lock().await.get(&menu_id) {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!(menu_id = %menu_id, "Pipeline abort requested");
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, menu_id: Uuid) -> bool {
        self.tasks.lock().await.contains_key(&menu_id)
    }

    pub async fn running_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for the pipeline of `menu_id` to finish (no-op if none)
    pub async fn join(&self, menu_id: Uuid) {
        let handle = self
            .tasks
            .lock()
            .await
            .get_mut(&menu_id)
            .and_then(|task| task.handle.take());

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(menu_id = %menu_id, error = %e, "Pipeline task panicked");
            }
        }
    }

    /// Cancel every running pipeline and wait for all of them
    pub async fn shutdown(&self) {
        let handles: Vec<(Uuid, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().await;
            tasks
                .iter_mut()
                .filter_map(|(menu_id, task)| {
                    task.cancel.cancel();
                    task.handle.take().map(|handle| (*menu_id, handle))
                })
                .collect()
        };

        if !handles.is_empty() {
            tracing::info!(pipelines = handles.len(), "Waiting for pipelines to stop");
        }

        for (menu_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(menu_id = %menu_id, error = %e, "Pipeline task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_waits_and_entry_is_removed() {
        let supervisor = PipelineSupervisor::new();
        let menu_id = Uuid::new_v4();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        assert!(
            supervisor
                .spawn(menu_id, |_cancel| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    flag.store(true, Ordering::SeqCst);
                })
                .await
        );

        supervisor.join(menu_id).await;
        assert!(done.load(Ordering::SeqCst));

        // The handle resolves only after the entry removed itself
        assert!(!supervisor.is_running(menu_id).await);
    }

    #[tokio::test]
    async fn test_duplicate_spawn_refused() {
        let supervisor = PipelineSupervisor::new();
        let menu_id = Uuid::new_v4();

        assert!(
            supervisor
                .spawn(menu_id, |cancel| async move { cancel.cancelled().await })
                .await
        );
        assert!(!supervisor.spawn(menu_id, |_| async {}).await);
        assert_eq!(supervisor.running_count().await, 1);

        assert!(supervisor.abort(menu_id).await);
        supervisor.join(menu_id).await;
    }

    #[tokio::test]
    async fn test_abort_unknown_menu() {
        let supervisor = PipelineSupervisor::new();
        assert!(!supervisor.abort(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let supervisor = PipelineSupervisor::new();
        for _ in 0..3 {
            supervisor
                .spawn(Uuid::new_v4(), |cancel| async move { cancel.cancelled().await })
                .await;
        }

        tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
            .await
            .expect("shutdown should cancel all pipelines");

        assert_eq!(supervisor.running_count().await, 0);
    }
}
