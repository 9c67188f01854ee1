//! Order orchestration over unreliable collaborators.
//!
//! - `retry`: backoff-with-jitter retry primitive and retry predicates
//! - `spawner`: how stages run concurrently (threads, worker pool)
//! - `config`: retry parameters, time budgets, consistency mode
//! - `commander`: the per-order stage machine
//! - `queue`: deferred re-attempts and the drain loop

pub mod commander;
pub mod config;
pub mod queue;
pub mod retry;
pub mod spawner;

pub use commander::{Collaborators, Commander, CommanderBuilder};
pub use config::{CommanderConfig, ConfigError, ConsistencyMode, RetryParams, TimeLimits};
pub use retry::{backoff_delay, predicates, Retry, RetryPredicate, Sleeper, ThreadSleeper};
pub use spawner::{
    InlineSpawner, Job, TaskSpawner, ThreadSpawner, WorkerPool, WorkerPoolConfig, WorkerPoolStats,
};
