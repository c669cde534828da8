//! Cooperative scheduling as an explicit job handoff.
//!
//! Synchronous serving threads cannot resume coroutine-based applications, so
//! the bootstrap provisions a channel instead: request handling enqueues work
//! through a clonable [`SchedulerHandle`] and exactly one consumer drives the
//! jobs. In event-loop mode that consumer is a task on the serving runtime;
//! in threaded mode it is the single detached [`SCHEDULER_THREAD_NAME`]
//! thread. Either way, cooperative apps always resume in one place.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Name of the background scheduler thread in threaded mode.
pub const SCHEDULER_THREAD_NAME: &str = "gantry-scheduler";

/// A unit of cooperative work: one boxed future driven by the scheduler.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors from the scheduling layer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The consumer is gone; no job can run anymore.
    #[error("scheduler is no longer running")]
    Closed,

    /// The scheduler thread could not be started.
    #[error("failed to start scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Clonable enqueue side of the scheduler channel.
///
/// Handed to the session handler through its configuration; never blocks.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl SchedulerHandle {
    /// Enqueues a job for the scheduler to drive.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Closed`] when the consuming task or thread has shut
    /// down.
    pub fn spawn<F>(&self, job: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(Box::pin(job))
            .map_err(|_| SchedulerError::Closed)
    }
}

/// Consuming side of the scheduler channel. Exactly one exists per bootstrap.
#[derive(Debug)]
pub struct JobQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl JobQueue {
    /// Runs jobs until every [`SchedulerHandle`] is dropped.
    ///
    /// Each job is spawned as its own task so a long-lived session cannot
    /// starve the queue. Must run inside a tokio runtime.
    pub async fn drive(mut self) {
        while let Some(job) = self.rx.recv().await {
            tokio::spawn(job);
        }
        debug!("scheduler queue drained and closed");
    }
}

/// Creates the scheduler channel.
pub fn channel() -> (SchedulerHandle, JobQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SchedulerHandle { tx }, JobQueue { rx })
}

/// Starts the single scheduler thread for threaded serving.
///
/// The thread runs a current-thread runtime, so every job resumes on this one
/// thread for the life of the process. Its join handle is dropped: the thread
/// is never joined and never blocks process exit.
///
/// # Errors
///
/// [`SchedulerError::Spawn`] when the OS refuses the thread.
pub fn spawn_background(queue: JobQueue) -> Result<(), SchedulerError> {
    std::thread::Builder::new()
        .name(SCHEDULER_THREAD_NAME.to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "scheduler runtime failed to start");
                    return;
                }
            };
            runtime.block_on(queue.drive());
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drive_runs_enqueued_jobs() {
        let (handle, queue) = channel();
        let driver = tokio::spawn(queue.drive());

        let (tx, rx) = tokio::sync::oneshot::channel();
        handle
            .spawn(async move {
                let _ = tx.send(42u8);
            })
            .unwrap();
        assert_eq!(rx.await.unwrap(), 42);

        // Dropping the last handle lets the driver finish.
        drop(handle);
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn spawn_after_consumer_gone_is_closed() {
        let (handle, queue) = channel();
        drop(queue);
        let err = handle.spawn(async {}).unwrap_err();
        assert!(matches!(err, SchedulerError::Closed));
    }

    #[tokio::test]
    async fn jobs_sent_before_drive_are_not_lost() {
        let (handle, queue) = channel();
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle
            .spawn(async move {
                let _ = tx.send(());
            })
            .unwrap();

        tokio::spawn(queue.drive());
        rx.await.unwrap();
    }

    #[test]
    fn background_thread_carries_the_scheduler_name() {
        let (handle, queue) = channel();
        spawn_background(queue).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        handle
            .spawn(async move {
                let name = std::thread::current().name().map(str::to_owned);
                let _ = tx.send(name);
            })
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(SCHEDULER_THREAD_NAME));
    }
}
