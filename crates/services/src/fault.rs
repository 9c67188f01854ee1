//! Pre-seeded failure list shared by a collaborator and its callers.

use std::collections::VecDeque;
use std::sync::Mutex;

use commander_core::ServiceError;

/// Ordered failures to raise on successive calls.
///
/// The caller's operation pops the head and fails with it if one is queued,
/// otherwise it performs the real request. Several threads may pop from the
/// same queue; each failure is handed out exactly once.
#[derive(Debug, Default)]
pub struct FaultQueue {
    faults: Mutex<VecDeque<ServiceError>>,
}

impl FaultQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            faults: Mutex::new(faults.into_iter().collect()),
        }
    }

    /// `count` copies of `fault`.
    pub fn repeated(fault: ServiceError, count: usize) -> Self {
        Self::seeded(std::iter::repeat_n(fault, count))
    }

    pub fn push(&self, fault: ServiceError) {
        self.lock().push_back(fault);
    }

    /// Take the next failure, if any.
    pub fn pop(&self) -> Option<ServiceError> {
        self.lock().pop_front()
    }

    pub fn peek(&self) -> Option<ServiceError> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ServiceError>> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}
