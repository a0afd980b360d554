use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Detached delayed actions (batch flushes, confirmation cleanup).
///
/// Tasks always run to completion unless [`BackgroundTasks::abort_all`] is
/// called during shutdown.
#[derive(Default)]
pub struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once `delay` has elapsed.
    pub fn spawn_after<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(finished) = set.try_join_next() {
            log_join_result(finished);
        }
        set.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Number of tasks not yet reaped.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Wait until every spawned task (including ones spawned while
    /// draining) has finished.
    pub async fn drain(&self) {
        loop {
            let mut batch = {
                let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *set)
            };
            if batch.is_empty() {
                return;
            }
            debug!("Draining {} background task(s)", batch.len());
            while let Some(finished) = batch.join_next().await {
                log_join_result(finished);
            }
        }
    }

    pub fn abort_all(&self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        if !set.is_empty() {
            warn!("Aborting {} background task(s)", set.len());
        }
        set.abort_all();
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!("Background task panicked");
        }
    }
}
