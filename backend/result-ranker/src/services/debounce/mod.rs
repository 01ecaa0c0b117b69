// ============================================
// Debouncer (防抖執行器)
// ============================================
//
// Coalesces bursts of submissions into at most one execution per interval.
//
// A single worker task owns the pending operation:
//
//   submit() ──mpsc──▶ worker ──(sleep_until)──▶ execute ──▶ responder(true)
//                         │
//                         └─ newer submission while waiting ──▶ responder(false)
//
// State machine per worker: Idle → Scheduled → Executing → Idle.
// - Idle: nothing pending, waiting on the channel
// - Scheduled: one pending operation, timer armed for `last_execution + interval`
// - Executing: operation running, new submissions queue in the channel
//
// Superseded operations are dropped without ever being polled, so their side
// effects never run.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Deferred unit of work accepted by [`Debouncer::submit`]
pub type Operation = BoxFuture<'static, ()>;

struct Submission {
    operation: Operation,
    responder: oneshot::Sender<bool>,
}

impl Submission {
    /// Resolve as obsoleted and drop the operation unpolled
    fn supersede(self) {
        let _ = self.responder.send(false);
    }
}

/// Outcome of a submission.
///
/// Resolves to `true` once the operation ran to completion, `false` when a later
/// submission replaced it before it started, when it panicked, or when the
/// debouncer was already shut down. Awaiting it is optional.
#[derive(Debug)]
pub struct DebounceHandle {
    rx: oneshot::Receiver<bool>,
}

impl Future for DebounceHandle {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(executed)) => Poll::Ready(executed),
            // Worker dropped the responder without answering (aborted)
            Poll::Ready(Err(_)) => Poll::Ready(false),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Rate-limiting executor with latest-wins semantics
pub struct Debouncer {
    tx: Mutex<Option<mpsc::UnboundedSender<Submission>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer whose worker runs on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside of a tokio runtime, like `tokio::spawn`.
    pub fn new(interval: Duration) -> Self {
        Self::spawn_on(&Handle::current(), interval)
    }

    /// Create a debouncer whose worker runs on the given runtime
    pub fn spawn_on(runtime: &Handle, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(rx, interval));

        debug!(interval_ms = interval.as_millis() as u64, "Debouncer started");

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit an operation, replacing any operation still waiting for its turn.
    ///
    /// Never blocks; the operation runs later on the worker task.
    pub fn submit<F>(&self, operation: F) -> DebounceHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (responder, rx) = oneshot::channel();
        let submission = Submission {
            operation: operation.boxed(),
            responder,
        };

        match self.tx.lock().as_ref() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(rejected)) = tx.send(submission) {
                    error!("Debounce worker is gone, dropping submitted operation");
                    rejected.supersede();
                }
            }
            None => {
                warn!("Debouncer already shut down, dropping submitted operation");
                submission.supersede();
            }
        }

        DebounceHandle { rx }
    }

    /// Stop accepting submissions and drain.
    ///
    /// A pending operation is flushed immediately instead of waiting for its
    /// timer. If the worker does not finish within `timeout` it is aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        // Dropping the sender closes the channel; the worker flushes and exits
        drop(self.tx.lock().take());

        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => info!("Debouncer drained"),
            Ok(Err(e)) => error!(error = %e, "Debounce worker terminated abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Debouncer did not drain in time, aborting worker"
                );
                worker.abort();
            }
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        // Closing the channel lets a still-running worker flush and exit on its own
        drop(self.tx.get_mut().take());
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Submission>, interval: Duration) {
    let mut last_execution: Option<Instant> = None;

    while let Some(mut pending) = rx.recv().await {
        let deadline = last_execution
            .map(|at| at + interval)
            .filter(|deadline| *deadline > Instant::now());

        if let Some(deadline) = deadline {
            debug!(
                wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Debounced execution scheduled"
            );

            let timer = tokio::time::sleep_until(deadline);
            tokio::pin!(timer);

            loop {
                tokio::select! {
                    _ = &mut timer => break,
                    next = rx.recv() => match next {
                        Some(newer) => {
                            debug!("Pending operation superseded");
                            pending.supersede();
                            pending = newer;
                        }
                        None => {
                            debug!("Debouncer closing, flushing pending operation");
                            break;
                        }
                    },
                }
            }
        }

        let Submission {
            operation,
            responder,
        } = pending;

        let outcome = AssertUnwindSafe(operation).catch_unwind().await;
        last_execution = Some(Instant::now());

        match outcome {
            Ok(()) => {
                let _ = responder.send(true);
            }
            Err(_) => {
                error!("Debounced operation panicked");
                let _ = responder.send(false);
            }
        }
    }

    debug!("Debounce worker stopped");
}
