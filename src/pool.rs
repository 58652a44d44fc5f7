//! Worker pool
//!
//! A fixed set of workers, each owning a FIFO task queue. Tasks are submitted
//! by atomic round-robin, so load spreads evenly without work-stealing:
//! connections are long-lived and roughly uniform, and the simpler scheme
//! keeps per-worker ordering trivially true.
//!
//! A worker runs one task at a time in enqueue order. Task panics are caught
//! and logged; they never take the worker down.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A queued unit of work (one connection's full pipeline)
type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Default number of workers
pub const DEFAULT_POOL_SIZE: usize = 4;

struct Worker {
    queue: mpsc::UnboundedSender<Task>,
    handle: JoinHandle<()>,
}

/// Fixed-size worker pool with round-robin submission
pub struct WorkerPool {
    workers: Vec<Worker>,
    next_worker: AtomicUsize,
}

impl WorkerPool {
    /// Create a pool with `size` workers (clamped to at least 1)
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let workers = (0..size)
            .map(|id| {
                let (queue, rx) = mpsc::unbounded_channel();
                let handle = tokio::spawn(worker_loop(id, rx));
                Worker { queue, handle }
            })
            .collect();

        debug!(workers = size, "Worker pool started");

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
        }
    }

    /// Number of workers in the pool
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Submit a task to the pool
    ///
    /// The worker is selected by a monotonically increasing counter modulo
    /// the pool size. Tasks submitted to the same worker run in submission
    /// order.
    ///
    /// Returns `false` if the pool has been stopped.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index].queue.send(Box::pin(task)).is_ok()
    }

    /// Stop the pool and join every worker
    ///
    /// Queues are closed; workers finish the tasks already enqueued (in-flight
    /// bridges run to their natural EOF) and then exit.
    pub async fn stop(self) {
        let mut handles = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            drop(worker.queue);
            handles.push(worker.handle);
        }
        for handle in handles {
            let _ = handle.await;
        }
        debug!("Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

async fn worker_loop(id: usize, mut queue: mpsc::UnboundedReceiver<Task>) {
    debug!(worker = id, "Worker started");

    while let Some(task) = queue.recv().await {
        // Run each task in its own spawn so a panic is contained in the
        // JoinError instead of unwinding through the worker loop
        if let Err(e) = tokio::spawn(task).await {
            if e.is_panic() {
                error!(worker = id, "Task panicked: {e}");
            }
        }
    }

    debug!(worker = id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_pool_runs_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_pool_size_clamped() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_pool_fifo_per_worker() {
        // One worker: strict FIFO across all submissions
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            pool.submit(async move {
                order.lock().await.push(i);
            });
        }

        pool.stop().await;
        assert_eq!(*order.lock().await, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pool_survives_panicking_task() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(async {
            panic!("task blew up");
        });

        // The worker must keep running and execute the next task
        let after = Arc::clone(&counter);
        pool.submit(async move {
            after.fetch_add(1, Ordering::SeqCst);
        });

        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pool_round_robin_distribution() {
        // Two workers, two long tasks: round-robin means they run on
        // different workers and overlap instead of serializing
        let pool = WorkerPool::new(2);
        let started = Arc::new(AtomicUsize::new(0));
        let peak_overlap = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let started = Arc::clone(&started);
            let peak = Arc::clone(&peak_overlap);
            pool.submit(async move {
                let running = started.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(running, Ordering::SeqCst);
                sleep(Duration::from_millis(100)).await;
                started.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.stop().await;
        assert_eq!(peak_overlap.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pool_stop_drains_queued_tasks() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // stop() closes the queues but lets enqueued tasks finish
        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
