/// Detection worker thread
///
/// Pulls frames from the queue, runs the detector and writes the cache.
/// Exits when cancelled or after too many consecutive failures.
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::async_detector::Shared;
use crate::messaging::{FallbackReason, PipelineEvent};

const WORKER_THREAD_NAME: &str = "detection-worker";

/// Cooperative stop signal shared between the detector and its worker
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct WorkerHandle {
    handle: JoinHandle<()>,
    /// Disconnects when the worker thread drops its sender on exit
    exited: Receiver<()>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker exits or `timeout` passes; true if it exited
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            error!("Detection worker terminated abnormally");
        }
    }
}

pub(crate) fn spawn_worker<T>(shared: Arc<Shared<T>>) -> io::Result<WorkerHandle>
where
    T: Clone + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let (exit_tx, exit_rx) = bounded::<()>(0);

    let handle = thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || {
            let _exit_guard = exit_tx;
            run_worker_loop(&shared, &token);
        })?;

    Ok(WorkerHandle {
        handle,
        exited: exit_rx,
        cancel,
    })
}

fn run_worker_loop<T>(shared: &Shared<T>, cancel: &CancellationToken)
where
    T: Clone + Send + Sync + 'static,
{
    let dequeue_timeout = shared.config.dequeue_timeout();
    let ceiling = shared.config.max_consecutive_errors;
    info!("Detection worker started");

    while !cancel.is_cancelled() {
        let Some(task) = shared.queue.dequeue(dequeue_timeout) else {
            continue;
        };

        if cancel.is_cancelled() {
            debug!(frame_number = task.frame_number, "Discarding frame dequeued during shutdown");
            break;
        }

        match shared.detect(&task.image) {
            Ok(results) => {
                shared.consecutive_errors.store(0, Ordering::SeqCst);
                debug!(
                    frame_number = task.frame_number,
                    detections = results.len(),
                    queued_ms = task.submitted_at.elapsed().as_millis() as u64,
                    "Frame processed"
                );
                shared.cache.update(results, task.frame_number);
            }
            Err(err) => {
                let consecutive_errors = shared.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    frame_number = task.frame_number,
                    consecutive_errors, "Detection failed: {err}"
                );
                shared.events.publish(PipelineEvent::DetectionFailed {
                    frame_number: task.frame_number,
                    consecutive_errors,
                    message: err.to_string(),
                });

                if consecutive_errors >= ceiling {
                    warn!(
                        consecutive_errors,
                        "Too many consecutive detection errors, switching to synchronous fallback"
                    );
                    match shared.transition(|sm| sm.enter_fallback()) {
                        Ok(_) => shared.events.publish(PipelineEvent::FallbackEngaged {
                            reason: FallbackReason::SustainedFailures { consecutive_errors },
                        }),
                        Err(err) => debug!("Fallback skipped: {err}"),
                    }
                    break;
                }
            }
        }
    }

    info!("Detection worker stopped");
}
