//! Work that outlives the request that started it.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::error::ApiHubError;

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Tracks spawned request flows and publishes failures that happen after a
/// caller already received its outcome.
#[derive(Clone)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
    errors: broadcast::Sender<ApiHubError>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            errors,
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished flows so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Receive errors of secondary writes.
    pub fn subscribe(&self) -> broadcast::Receiver<ApiHubError> {
        self.errors.subscribe()
    }

    pub(crate) fn publish(&self, error: ApiHubError) {
        // No receivers is fine; the error has been logged already.
        let _ = self.errors.send(error);
    }

    /// Wait until every flow spawned so far, including its trailing writes,
    /// has finished.
    pub async fn settle(&self) {
        loop {
            let mut pending = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(error) = result {
                    tracing::error!(%error, "background task failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataStructure;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn settle_waits_for_spawned_work() {
        let background = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            background.spawn(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        background.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn published_errors_reach_subscribers() {
        let background = BackgroundTasks::new();
        let mut errors = background.subscribe();

        background.publish(ApiHubError::persistence(DataStructure::Json, "write failed"));

        let error = errors.recv().await.expect("error");
        assert_eq!(error.msg_info(), Some("write failed"));
    }
}
