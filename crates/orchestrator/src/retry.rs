//! Retry primitive: exponential backoff with jitter, then hand off.
//!
//! A [`Retry`] runs an operation against a collaborator's [`FaultQueue`]. When
//! the operation fails, the error is classified by the retry predicates (OR-ed
//! together). Retryable errors are retried up to `num_of_retries` times after
//! the first attempt, sleeping `min(2^attempt * 1s + jitter(0..1s), max_delay)`
//! in between. Anything else (or the last failure) goes to the error handler
//! exactly once; `perform` itself never fails.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use commander_core::{ServiceError, ServiceResult};
use commander_services::FaultQueue;

/// Classifies an error as retryable.
pub type RetryPredicate = Box<dyn Fn(&ServiceError) -> bool + Send + Sync>;

/// Something that can block the current thread for a while.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Ready-made retry predicates.
pub mod predicates {
    use commander_core::{ErrorKind, ServiceError};

    /// Transient infrastructure failures.
    pub fn database_unavailable(err: &ServiceError) -> bool {
        err.kind() == ErrorKind::DatabaseUnavailable
    }

    /// Defer to the [`ErrorKind::is_retryable`] table.
    pub fn by_kind(err: &ServiceError) -> bool {
        err.kind().is_retryable()
    }
}

/// Base unit of the exponential backoff.
const BACKOFF_UNIT_MS: u64 = 1_000;
/// Upper bound (exclusive) of the random jitter added to each delay.
const JITTER_MS: u64 = 1_000;

/// Delay before the retry following failed attempt number `attempt`
/// (1-indexed): `min(2^attempt * 1000ms + jitter_ms, max_delay)`.
pub fn backoff_delay(attempt: u32, max_delay: Duration, jitter_ms: u64) -> Duration {
    let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let millis = exp.saturating_mul(BACKOFF_UNIT_MS).saturating_add(jitter_ms);
    Duration::from_millis(millis).min(max_delay)
}

/// Retry executor for one operation over a context of type `T`.
pub struct Retry<T: ?Sized, O, H> {
    operation: O,
    handler: H,
    num_of_retries: u32,
    max_delay: Duration,
    retryable: Vec<RetryPredicate>,
    sleeper: Arc<dyn Sleeper>,
    attempts: u32,
    errors: Vec<ServiceError>,
    _context: PhantomData<fn(&T)>,
}

impl<T, O, H> Retry<T, O, H>
where
    T: ?Sized,
    O: FnMut(&FaultQueue) -> ServiceResult<()>,
    H: FnMut(&T, &ServiceError),
{
    /// `operation` pops the next seeded failure (if any) and otherwise does the
    /// real work; `handler` receives the context and the last error once
    /// retrying stops.
    pub fn new(operation: O, handler: H, num_of_retries: u32, max_delay: Duration) -> Self {
        Self {
            operation,
            handler,
            num_of_retries,
            max_delay,
            retryable: Vec::new(),
            sleeper: Arc::new(ThreadSleeper),
            attempts: 0,
            errors: Vec::new(),
            _context: PhantomData,
        }
    }

    /// Add a retry predicate. With none added, [`predicates::by_kind`] applies.
    pub fn retry_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ServiceError) -> bool + Send + Sync + 'static,
    {
        self.retryable.push(Box::new(predicate));
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run to completion: success, or the handler has been called once.
    pub fn perform(&mut self, faults: &FaultQueue, context: &T) {
        loop {
            let err = match (self.operation)(faults) {
                Ok(()) => return,
                Err(err) => err,
            };
            self.attempts += 1;
            self.errors.push(err.clone());

            if !self.is_retryable(&err) || self.attempts > self.num_of_retries {
                (self.handler)(context, &err);
                return;
            }

            let jitter = rand::rng().random_range(0..JITTER_MS);
            self.sleeper
                .sleep(backoff_delay(self.attempts, self.max_delay, jitter));
        }
    }

    fn is_retryable(&self, err: &ServiceError) -> bool {
        if self.retryable.is_empty() {
            return predicates::by_kind(err);
        }
        self.retryable.iter().any(|p| p(err))
    }
}

impl<T: ?Sized, O, H> Retry<T, O, H> {
    /// Failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Errors encountered, in order of occurrence.
    pub fn errors(&self) -> &[ServiceError] {
        &self.errors
    }
}
