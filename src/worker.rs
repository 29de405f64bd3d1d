use std::sync::Arc;

use futures::lock::Mutex;
use log::{debug, error};

use crate::volume::VolumeError;

/// Runs volume jobs one at a time on tokio's blocking thread pool.
///
/// Jobs posted while another is running wait for it to finish, so a
/// long-running resample or smoothing never competes with a second one.
/// The gate is held by the job itself: dropping a `post` future does not
/// let the next job start before the abandoned one has returned.
/// Share a worker between tasks with an `Arc`.
#[derive(Debug, Default)]
pub struct Worker {
    gate: Arc<Mutex<()>>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` once all previously posted jobs are done and returns its
    /// result. A job that panics fails with [`VolumeError::Worker`].
    pub async fn post<F, T>(&self, job: F) -> Result<T, VolumeError>
    where
        F: FnOnce() -> Result<T, VolumeError> + Send + 'static,
        T: Send + 'static,
    {
        let running = self.gate.clone().lock_owned().await;
        debug!("Worker starting job");
        let handle = tokio::task::spawn_blocking(move || {
            let _running = running;
            job()
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Worker job failed: {e}");
                Err(VolumeError::Worker(e.to_string()))
            }
        }
    }
}
