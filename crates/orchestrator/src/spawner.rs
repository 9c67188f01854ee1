//! Task spawning contract for concurrently executed stages.
//!
//! Every stage after shipping is fire-and-forget: the caller hands a job to a
//! [`TaskSpawner`] and returns. [`ThreadSpawner`] starts one OS thread per job.
//! [`WorkerPool`] runs jobs on a fixed set of threads fed by a channel and can
//! report when it has gone quiet, which is what tests and the demo wait on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

/// Unit of work handed to a spawner.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs concurrently with the caller.
pub trait TaskSpawner: Send + Sync {
    /// Schedule `job`. Must not block on the job itself. `name` is used for
    /// thread names and logs.
    fn spawn(&self, name: &'static str, job: Job);
}

/// One detached OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, name: &'static str, job: Job) {
        if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(job) {
            error!(task = name, error = %e, "failed to spawn task thread");
        }
    }
}

/// Runs the job on the calling thread before returning.
///
/// Only for single-threaded tools and deterministic tests: a stage that
/// re-spawns itself (the drain loop) recurses instead of looping.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSpawner;

impl TaskSpawner for InlineSpawner {
    fn spawn(&self, name: &'static str, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(task = name, "inline task panicked");
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Thread name prefix, also used in logs
    pub name: String,
    /// Number of worker threads
    pub workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "commander-worker".to_string(),
            workers: 8,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Worker pool runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerPoolStats {
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    pub tasks_panicked: u64,
    pub tasks_rejected: u64,
    pub pending: usize,
}

struct Envelope {
    name: &'static str,
    job: Job,
}

#[derive(Default)]
struct PoolState {
    stats: Mutex<WorkerPoolStats>,
    idle: Condvar,
}

impl PoolState {
    fn stats(&self) -> MutexGuard<'_, WorkerPoolStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size pool of worker threads.
///
/// Jobs queue up in an unbounded channel when all workers are busy. Jobs may
/// spawn further jobs onto the same pool.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    state: Arc<PoolState>,
}

impl WorkerPool {
    /// Start the worker threads.
    pub fn start(config: WorkerPoolConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Envelope>();
        let rx = Arc::new(Mutex::new(rx));
        let state = Arc::new(PoolState::default());

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers.max(1) {
            let rx = rx.clone();
            let state = state.clone();
            let pool = config.name.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.name))
                .spawn(move || worker_loop(&pool, &rx, &state))?;
            workers.push(handle);
        }

        info!(pool = %config.name, workers = workers.len(), "worker pool started");

        Ok(Self {
            name: config.name,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            state,
        })
    }

    /// Current statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        self.state.stats().clone()
    }

    /// Block until no job is queued or running, or `timeout` elapses.
    /// Returns `true` if the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stats = self.state.stats();
        while stats.pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stats = match self.state.idle.wait_timeout(stats, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }

    /// Stop accepting jobs, let queued jobs finish, and join the workers.
    ///
    /// Must not be called from inside a job running on this pool.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!(pool = %self.name, "worker thread exited abnormally");
            }
        }
        info!(pool = %self.name, "worker pool stopped");
    }
}

impl TaskSpawner for WorkerPool {
    fn spawn(&self, name: &'static str, job: Job) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = sender.as_ref() else {
            self.state.stats().tasks_rejected += 1;
            warn!(pool = %self.name, task = name, "worker pool shut down, dropping task");
            return;
        };

        {
            let mut stats = self.state.stats();
            stats.tasks_spawned += 1;
            stats.pending += 1;
        }

        if tx.send(Envelope { name, job }).is_err() {
            let mut stats = self.state.stats();
            stats.pending = stats.pending.saturating_sub(1);
            stats.tasks_rejected += 1;
            drop(stats);
            self.state.idle.notify_all();
            warn!(pool = %self.name, task = name, "no worker left to run task");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers exit once the channel closes; they are not joined here since
        // the last reference may be dropped on a worker thread.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(pool: &str, rx: &Mutex<mpsc::Receiver<Envelope>>, state: &PoolState) {
    loop {
        let next = {
            let rx = rx.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv()
        };
        let Ok(Envelope { name, job }) = next else {
            break;
        };

        debug!(pool, task = name, "running task");
        let panicked = panic::catch_unwind(AssertUnwindSafe(job)).is_err();
        if panicked {
            error!(pool, task = name, "task panicked");
        }

        let mut stats = state.stats();
        stats.pending = stats.pending.saturating_sub(1);
        if panicked {
            stats.tasks_panicked += 1;
        } else {
            stats.tasks_completed += 1;
        }
        let idle = stats.pending == 0;
        drop(stats);
        if idle {
            state.idle.notify_all();
        }
    }
}
