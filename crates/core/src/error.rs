//! Error model: domain errors and the collaborator failure taxonomy.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type returned by every collaborator call.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (parsing, validation).
/// Collaborator failures are [`ServiceError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Failure raised by a collaborator (shipping, payment, messaging, employee
/// handle, queue store).
///
/// This is a closed set: the orchestrator classifies every variant through
/// [`ErrorKind`] instead of inspecting error types at runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The collaborator's backing store could not be reached.
    #[error("database unavailable")]
    DatabaseUnavailable,

    /// The ordered item is out of stock.
    #[error("item unavailable")]
    ItemUnavailable,

    /// The item cannot be shipped to the given address.
    #[error("shipping not possible")]
    ShippingNotPossible,

    /// The customer's payment details were rejected.
    #[error("payment details error")]
    PaymentDetailsError,

    /// The queue store had nothing to peek or dequeue.
    #[error("queue is empty")]
    QueueEmpty,

    /// Anything else.
    #[error("unexpected failure: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::DatabaseUnavailable => ErrorKind::DatabaseUnavailable,
            ServiceError::ItemUnavailable => ErrorKind::ItemUnavailable,
            ServiceError::ShippingNotPossible => ErrorKind::ShippingNotPossible,
            ServiceError::PaymentDetailsError => ErrorKind::PaymentDetailsError,
            ServiceError::QueueEmpty | ServiceError::Other(_) => ErrorKind::Unclassified,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Error classification table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient infrastructure failure.
    DatabaseUnavailable,
    /// Domain-terminal: item out of stock.
    ItemUnavailable,
    /// Domain-terminal: address not serviceable.
    ShippingNotPossible,
    /// Domain-terminal: payment rejected.
    PaymentDetailsError,
    /// Not part of the known taxonomy.
    Unclassified,
}

impl ErrorKind {
    /// Whether an inline retry may be attempted for this kind.
    ///
    /// | kind                  | retryable |
    /// |-----------------------|-----------|
    /// | `DatabaseUnavailable` | yes       |
    /// | `ItemUnavailable`     | no        |
    /// | `ShippingNotPossible` | no        |
    /// | `PaymentDetailsError` | no        |
    /// | `Unclassified`        | no        |
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::DatabaseUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_unavailable_is_retryable() {
        assert!(ServiceError::DatabaseUnavailable.is_retryable());
        assert!(!ServiceError::ItemUnavailable.is_retryable());
        assert!(!ServiceError::ShippingNotPossible.is_retryable());
        assert!(!ServiceError::PaymentDetailsError.is_retryable());
        assert!(!ServiceError::QueueEmpty.is_retryable());
        assert!(!ServiceError::other("boom").is_retryable());
    }

    #[test]
    fn unknown_failures_are_unclassified() {
        assert_eq!(ServiceError::other("x").kind(), ErrorKind::Unclassified);
        assert_eq!(ServiceError::QueueEmpty.kind(), ErrorKind::Unclassified);
    }
}
