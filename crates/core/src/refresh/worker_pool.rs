//! Bounded FIFO worker pool.
//!
//! Jobs go through an unbounded channel to a single dispatcher task that
//! takes a semaphore permit per job, in submission order, before spawning
//! it. At most `max_concurrency` jobs run at once and a job never starts
//! before an earlier one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use tokio::sync::{mpsc, oneshot, Semaphore};

use super::refresh_model::QueueStats;
use crate::errors::SchedulerError;

type Job = BoxFuture<'static, ()>;

#[derive(Default)]
struct PoolCounters {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Decrements `running` when a job ends, including by panic.
struct RunningGuard(Arc<PoolCounters>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Job>,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    closed: AtomicBool,
    max_concurrency: usize,
}

impl WorkerPool {
    /// Starts the dispatcher. Must be called from within a tokio runtime.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let counters = Arc::new(PoolCounters::default());

        tokio::spawn(dispatch(receiver, semaphore.clone(), counters.clone()));

        Self {
            sender,
            semaphore,
            counters,
            closed: AtomicBool::new(false),
            max_concurrency,
        }
    }

    /// Queues `work` and returns a receiver for its output.
    ///
    /// The receiver errors if the job panics or the pool shuts down before
    /// the job starts.
    pub fn submit<F, T>(&self, work: F) -> Result<oneshot::Receiver<T>, SchedulerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::PoolClosed);
        }

        let (tx, rx) = oneshot::channel();
        let job = async move {
            // The caller may have stopped listening; the work still counts.
            let _ = tx.send(work.await);
        }
        .boxed();

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::PoolClosed);
        }
        Ok(rx)
    }

    pub fn stats(&self) -> QueueStats {
        let queued = self.counters.queued.load(Ordering::SeqCst);
        let running = self.counters.running.load(Ordering::SeqCst);
        QueueStats {
            pending: queued + running,
            queued,
            running,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting work and drops jobs that have not started.
    /// Running jobs finish normally.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Shutting down refresh worker pool");
            self.semaphore.close();
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
) {
    debug!("Refresh worker pool dispatcher started");

    while let Some(job) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Closed while waiting; this job never runs.
                counters.queued.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.running.fetch_add(1, Ordering::SeqCst);
        let guard = RunningGuard(counters.clone());

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            job.await;
        });
    }

    receiver.close();
    let mut dropped = 0usize;
    while let Ok(job) = receiver.try_recv() {
        drop(job);
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Dropped {} queued refresh job(s) on shutdown", dropped);
    }
    debug!("Refresh worker pool dispatcher stopped");
}
