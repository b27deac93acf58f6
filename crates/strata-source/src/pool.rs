use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bounded pool for fire-and-forget prefetch jobs.
///
/// Jobs run as supervised tokio tasks gated by a semaphore; the cancellation
/// token is tied to the owning component's lifetime, so no background work
/// outlives its source. Cancelled jobs may leave `.part` files behind, which
/// the store never reads.
#[derive(Clone)]
pub struct PrefetchPool {
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl PrefetchPool {
    /// Pool running at most `max_concurrent` jobs at a time.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a job. Waits for a slot in the background; abandoned without
    /// running if the pool shuts down first.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let permit = tokio::select! {
                () = cancel.cancelled() => {
                    trace!("prefetch pool cancelled before job start");
                    return;
                }
                permit = semaphore.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else {
                return;
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    trace!("prefetch job cancelled");
                }
                () = job => {}
            }
        });
    }

    /// Cancel all queued and running jobs.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
