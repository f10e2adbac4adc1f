//! Background job queue and its single worker thread.
//!
//! Expensive scene work (image decoding, octree rebuilds) is moved off the
//! interactive thread by wrapping it in a [`Job`] and handing it to a
//! [`Worker`]. The worker drains its [`JobQueue`] in FIFO order until it
//! dequeues [`Job::Shutdown`].
//!
//! Jobs never talk back to the interactive thread directly; they publish
//! their results through the hand-off slots in
//! [`ImageSlot`](crate::ImageSlot) and [`IndexSlot`](crate::IndexSlot).
//!
//! # Example
//!
//! ```
//! use cf_scene_select::Worker;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let mut worker = Worker::spawn("example").unwrap();
//! for _ in 0..3 {
//!     let counter = Arc::clone(&counter);
//!     worker
//!         .submit("count", move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             true
//!         })
//!         .unwrap();
//! }
//! worker.shutdown();
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::error::{SceneError, SceneResult};

/// Closure run by a [`Job::Work`]. Returns `false` on failure.
pub type JobFn = Box<dyn FnOnce() -> bool + Send + 'static>;

/// Kind tag of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Run a closure.
    Work,
    /// Stop the worker.
    Shutdown,
}

/// A unit of deferred work.
pub enum Job {
    /// Run `run`; a `false` result is logged as a failure.
    Work {
        /// Short name used in logs.
        label: String,
        /// The work itself.
        run: JobFn,
    },
    /// Make the worker loop return.
    Shutdown,
}

impl Job {
    /// Creates a work job.
    pub fn work<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        Self::Work {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// Returns the kind tag.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Work { .. } => JobKind::Work,
            Self::Shutdown => JobKind::Shutdown,
        }
    }

    /// Returns the job label (`"shutdown"` for the shutdown job).
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Work { label, .. } => label,
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("kind", &self.kind())
            .field("label", &self.label())
            .finish()
    }
}

/// Unbounded multi-producer FIFO of jobs.
///
/// `enqueue` never blocks; `dequeue` blocks until a job is available.
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Appends a job at the tail and wakes a waiting consumer.
    pub fn enqueue(&self, job: Job) {
        // The queue holds its own receiver, so the channel cannot be disconnected
        let _ = self.tx.send(job);
    }

    /// Removes the head job, blocking while the queue is empty.
    ///
    /// Returns `None` only if the channel was torn down, which cannot happen
    /// while this queue is alive.
    #[must_use]
    pub fn dequeue(&self) -> Option<Job> {
        self.rx.recv().ok()
    }

    /// Removes the head job if one is available, without blocking.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Counters published by the worker thread.
#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Snapshot of the worker's job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs that returned `true`.
    pub succeeded: usize,
    /// Jobs that returned `false` or panicked.
    pub failed: usize,
}

/// Owner of the background thread that drains a [`JobQueue`].
///
/// Dropping the worker shuts it down, running every job queued before the
/// shutdown request.
#[derive(Debug)]
pub struct Worker {
    queue: JobQueue,
    handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    shutdown_requested: bool,
}

impl Worker {
    /// Spawns a worker thread named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Spawn`] if the OS refuses to create the thread.
    pub fn spawn(name: &str) -> SceneResult<Self> {
        let queue = JobQueue::new();
        let counters = Arc::new(Counters::default());

        let thread_queue = queue.clone();
        let thread_counters = Arc::clone(&counters);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || worker_loop(&thread_queue, &thread_counters))?;

        info!(worker = name, "Worker thread started");
        Ok(Self {
            queue,
            handle: Some(handle),
            counters,
            shutdown_requested: false,
        })
    }

    /// Queues a closure for execution on the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] once [`Worker::shutdown`] has
    /// been called. This is a caller bug and trips a debug assertion.
    pub fn submit<F>(&self, label: impl Into<String>, run: F) -> SceneResult<()>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        self.enqueue(Job::work(label, run))
    }

    /// Queues a prepared job.
    ///
    /// A [`Job::Shutdown`] passed here is rejected; use [`Worker::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] after shutdown was requested.
    pub fn enqueue(&self, job: Job) -> SceneResult<()> {
        debug_assert!(!self.shutdown_requested, "job enqueued after worker shutdown");
        if self.shutdown_requested || job.kind() == JobKind::Shutdown {
            warn!(job = job.label(), "Rejected job: worker is shut down or job is a shutdown");
            return Err(SceneError::QueueShutDown);
        }
        debug!(job = job.label(), queued = self.queue.len(), "Job enqueued");
        self.queue.enqueue(job);
        Ok(())
    }

    /// Blocks until every job queued before this call has run.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] after shutdown was requested.
    pub fn flush(&self) -> SceneResult<()> {
        let (done_tx, done_rx) = bounded(1);
        self.submit("flush", move || done_tx.send(()).is_ok())?;
        done_rx
            .recv()
            .map_err(|_| SceneError::JobFailed("flush".to_owned()))
    }

    /// Requests shutdown and joins the thread.
    ///
    /// Jobs queued before this call still run. Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.shutdown_requested {
            return;
        }
        self.shutdown_requested = true;
        self.queue.enqueue(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }
        let stats = self.stats();
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Worker thread stopped"
        );
    }

    /// Whether the worker still accepts jobs.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        !self.shutdown_requested
    }

    /// Number of jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Current job counters.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            succeeded: self.counters.succeeded.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: &JobQueue, counters: &Counters) {
    while let Some(job) = queue.dequeue() {
        match job {
            Job::Work { label, run } => match panic::catch_unwind(AssertUnwindSafe(run)) {
                Ok(true) => {
                    counters.succeeded.fetch_add(1, Ordering::AcqRel);
                    debug!(job = %label, "Job finished");
                }
                Ok(false) => {
                    counters.failed.fetch_add(1, Ordering::AcqRel);
                    warn!(job = %label, "{}", SceneError::JobFailed(label.clone()));
                }
                Err(payload) => {
                    counters.failed.fetch_add(1, Ordering::AcqRel);
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_owned());
                    warn!(job = %label, "{}", SceneError::JobPanicked(message));
                }
            },
            Job::Shutdown => return,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_queue_fifo_single_producer() {
        let queue = JobQueue::new();
        for i in 0..5 {
            queue.enqueue(Job::work(format!("job-{i}"), || true));
        }
        queue.enqueue(Job::Shutdown);
        assert_eq!(queue.len(), 6);

        for i in 0..5 {
            let job = queue.dequeue().unwrap();
            assert_eq!(job.kind(), JobKind::Work);
            assert_eq!(job.label(), format!("job-{i}"));
        }
        assert_eq!(queue.dequeue().unwrap().kind(), JobKind::Shutdown);
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_fifo_per_producer() {
        let queue = JobQueue::new();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.enqueue(Job::work(format!("{p}:{i}"), || true));
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        let mut next = [0usize; 4];
        while let Some(job) = queue.try_dequeue() {
            let (p, i) = job.label().split_once(':').unwrap();
            let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
            assert_eq!(i, next[p], "producer {p} out of order");
            next[p] += 1;
        }
        assert_eq!(next, [100; 4]);
    }

    #[test]
    fn test_dequeue_blocks_until_enqueue() {
        let queue = JobQueue::new();
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue().map(|job| job.label().to_owned()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.enqueue(Job::work("late", || true));
        assert_eq!(consumer.join().unwrap().as_deref(), Some("late"));
    }

    #[test]
    fn test_worker_runs_jobs_in_order_before_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut worker = Worker::spawn("test-order").unwrap();
        for i in 0..20 {
            let log = Arc::clone(&log);
            worker
                .submit("record", move || {
                    log.lock().unwrap().push(i);
                    true
                })
                .unwrap();
        }
        worker.shutdown();

        assert!(!worker.is_running());
        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(worker.stats().succeeded, 20);
    }

    #[test]
    fn test_worker_survives_failures_and_panics() {
        let (tx, rx) = mpsc::channel();
        let mut worker = Worker::spawn("test-failures").unwrap();
        worker.submit("fails", || false).unwrap();
        worker.submit("panics", || panic!("boom")).unwrap();
        worker
            .submit("after", move || {
                tx.send(()).unwrap();
                true
            })
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).expect("worker stopped after failure");
        worker.shutdown();
        assert_eq!(
            worker.stats(),
            WorkerStats {
                succeeded: 1,
                failed: 2
            }
        );
    }

    #[test]
    fn test_flush_waits_for_prior_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = Worker::spawn("test-flush").unwrap();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            worker
                .submit("slow", move || {
                    thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .unwrap();
        }
        worker.flush().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut worker = Worker::spawn("test-idempotent").unwrap();
        worker.shutdown();
        worker.shutdown();
        assert_eq!(worker.pending(), 0);
    }

    #[test]
    fn test_enqueue_shutdown_job_rejected() {
        let worker = Worker::spawn("test-reject").unwrap();
        assert!(matches!(
            worker.enqueue(Job::Shutdown),
            Err(SceneError::QueueShutDown)
        ));
    }
}
