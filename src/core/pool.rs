//! Bounded worker pools
//!
//! A [`WorkerPool`] runs a batch of tasks with at most `size` of them in flight.
//! Scheduling stops as soon as the shutdown signal is raised; tasks already
//! running are left to finish. A panicking task is reported as
//! [`TaskOutcome::Panicked`] and never takes its siblings down.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Live and peak concurrency counters
#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl PoolStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of one scheduled task
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The task panicked; carries the panic message
    Panicked(String),
    /// Shutdown was requested before the task started
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

/// Semaphore-bounded task runner
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks at once (minimum 1)
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            stats: PoolStats::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> &Arc<PoolStats> {
        &self.stats
    }

    /// Runs `task` for every item and returns the outcomes in input order
    ///
    /// Items that were not started before shutdown was signalled come back as
    /// [`TaskOutcome::Cancelled`].
    pub async fn run_all<I, F, Fut, T>(
        &self,
        items: Vec<I>,
        shutdown: &watch::Receiver<bool>,
        task: F,
    ) -> Vec<TaskOutcome<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let mut shutdown = shutdown.clone();
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            if *shutdown.borrow() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let stats = self.stats.clone();
            let fut = task(item);
            set.spawn(async move {
                stats.enter();
                let result = AssertUnwindSafe(fut).catch_unwind().await;
                stats.exit();
                drop(permit);
                (index, result)
            });
        }

        let mut outcomes: Vec<TaskOutcome<T>> = (0..total).map(|_| TaskOutcome::Cancelled).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(value))) => outcomes[index] = TaskOutcome::Completed(value),
                Ok((index, Err(panic))) => {
                    let message = panic_message(panic);
                    tracing::error!(pool = self.name, task = index, panic = %message, "Task panicked");
                    outcomes[index] = TaskOutcome::Panicked(message);
                }
                Err(e) => {
                    tracing::error!(pool = self.name, error = %e, "Task aborted");
                }
            }
        }

        let cancelled = outcomes.iter().filter(|o| o.is_cancelled()).count();
        if cancelled > 0 {
            tracing::warn!(pool = self.name, cancelled, "Shutdown requested, tasks not started");
        }
        outcomes
    }
}

/// Resolves once the shutdown flag is set; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
