//! Shared I/O worker pool and cooperative cancellation.
//!
//! The scan planner fans manifest reads out over an [`IoPool`]: a fixed
//! set of worker threads consuming jobs from a crossbeam channel.  The
//! pool is shared and effectively immutable after construction; there is
//! no unbounded queueing on the result side — callers submit a batch and
//! perform a single join.
//!
//! Cancellation is cooperative.  A [`CancellationToken`] is checked at
//! suspension points (before a queued job starts, between record batches
//! in the merge reader); in-flight work may complete before observing the
//! flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, unbounded};
use thiserror::Error;
use tracing::trace;

// ------------------------------------------------------------------------------------------------
// CancellationToken
// ------------------------------------------------------------------------------------------------

/// Shared flag for cooperative cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ------------------------------------------------------------------------------------------------
// IoPool
// ------------------------------------------------------------------------------------------------

/// Errors returned by pool joins.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker died (panicked job) before delivering every result.
    #[error("worker pool lost {missing} result(s)")]
    Lost {
        /// Number of submitted tasks that never reported back.
        missing: usize,
    },
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size worker pool for blocking I/O jobs.
///
/// Dropping the pool closes the job channel and joins all workers;
/// already-queued jobs still run to completion.
#[derive(Debug)]
pub struct IoPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl IoPool {
    /// Spawns a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();

        let workers = (0..threads)
            .map(|idx| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("io-pool-{idx}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                        trace!(worker = idx, "io pool worker exiting");
                    })
                    .expect("failed to spawn io pool worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Runs every task on the pool and returns their results **in task
    /// order**, regardless of completion order.
    ///
    /// The calling thread blocks in a single join until all results have
    /// arrived.
    pub fn run_ordered<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, PoolError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let total = tasks.len();
        let (result_tx, result_rx) = unbounded::<(usize, T)>();

        for (idx, task) in tasks.into_iter().enumerate() {
            let result_tx = result_tx.clone();
            self.submit(Box::new(move || {
                let result = task();
                // The receiver only disappears if the caller was dropped
                // mid-join; the result is moot then.
                let _ = result_tx.send((idx, result));
            }));
        }
        drop(result_tx);

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut received = 0;
        while received < total {
            match result_rx.recv() {
                Ok((idx, result)) => {
                    slots[idx] = Some(result);
                    received += 1;
                }
                Err(_) => break,
            }
        }

        let results: Vec<T> = slots.into_iter().flatten().collect();
        if results.len() != total {
            return Err(PoolError::Lost {
                missing: total - results.len(),
            });
        }
        Ok(results)
    }

    fn submit(&self, job: Job) {
        if let Some(sender) = &self.sender {
            // Workers only exit once the sender is dropped, so the channel
            // cannot be disconnected here.
            let _ = sender.send(job);
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
