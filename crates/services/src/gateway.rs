//! Collaborator contracts consumed by the commander.
//!
//! Every gateway exposes its [`FaultQueue`]; the commander's retry operations
//! pop from it before calling `receive_request`.

use std::sync::Arc;

use commander_core::{MessageType, Order, QueueTask, ServiceResult, TransactionId};

use crate::fault::FaultQueue;

/// Access to a collaborator's pre-seeded failures.
pub trait Faulty {
    fn faults(&self) -> &FaultQueue;
}

pub trait ShippingGateway: Faulty + Send + Sync {
    /// Fails with `DatabaseUnavailable`, `ItemUnavailable` or `ShippingNotPossible`.
    fn receive_request(&self, item: &str, address: &str) -> ServiceResult<TransactionId>;
}

pub trait PaymentGateway: Faulty + Send + Sync {
    /// Fails with `DatabaseUnavailable` or `PaymentDetailsError`.
    fn receive_request(&self, amount: f64) -> ServiceResult<TransactionId>;
}

pub trait MessagingGateway: Faulty + Send + Sync {
    /// Fails with `DatabaseUnavailable`.
    fn receive_request(&self, message: MessageType) -> ServiceResult<TransactionId>;
}

pub trait EmployeeGateway: Faulty + Send + Sync {
    /// Hand the order to a human. Fails with `DatabaseUnavailable`.
    fn receive_request(&self, order: &Order) -> ServiceResult<()>;
}

/// FIFO store of deferred stage re-attempts.
pub trait QueueStore: Faulty + Send + Sync {
    fn add(&self, task: Arc<QueueTask>) -> ServiceResult<()>;

    /// Head of the queue without removing it.
    fn peek(&self) -> ServiceResult<Option<Arc<QueueTask>>>;

    /// Remove the head. Fails with `QueueEmpty` if there is none.
    fn dequeue(&self) -> ServiceResult<Arc<QueueTask>>;
}
