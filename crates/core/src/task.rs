//! Deferred stage re-attempts held by the queue store.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::Order;

/// Stage a queue task re-attempts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Payment,
    Messaging,
    EmployeeDb,
}

/// Customer message variants. The discriminant is the wire code passed to the
/// messaging service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum MessageType {
    PaymentFail = 0,
    PaymentTrying = 1,
    PaymentSuccess = 2,
}

impl MessageType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// A stage that exhausted its inline retries but not its time budget.
#[derive(Debug)]
pub struct QueueTask {
    order: Arc<Order>,
    task_type: TaskType,
    message_type: Option<MessageType>,
    first_attempt: OnceLock<DateTime<Utc>>,
}

impl QueueTask {
    pub fn new(order: Arc<Order>, task_type: TaskType, message_type: Option<MessageType>) -> Self {
        Self {
            order,
            task_type,
            message_type,
            first_attempt: OnceLock::new(),
        }
    }

    pub fn payment(order: Arc<Order>) -> Self {
        Self::new(order, TaskType::Payment, None)
    }

    pub fn messaging(order: Arc<Order>, message_type: MessageType) -> Self {
        Self::new(order, TaskType::Messaging, Some(message_type))
    }

    pub fn employee_db(order: Arc<Order>) -> Self {
        Self::new(order, TaskType::EmployeeDb, None)
    }

    pub fn order(&self) -> &Arc<Order> {
        &self.order
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.message_type
    }

    /// Message code, or `-1` for non-messaging tasks.
    pub fn message_code(&self) -> i32 {
        self.message_type.map_or(-1, MessageType::code)
    }

    pub fn is_first_attempt(&self) -> bool {
        self.first_attempt.get().is_none()
    }

    pub fn first_attempt_time(&self) -> Option<DateTime<Utc>> {
        self.first_attempt.get().copied()
    }

    /// Record `now` as the first attempt unless one is already recorded, and
    /// return whichever time is stored.
    pub fn mark_first_attempt(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.first_attempt.get_or_init(|| now)
    }

    /// Human-readable task kind for logs.
    pub fn type_name(&self) -> &'static str {
        match (self.task_type, self.message_type) {
            (TaskType::Payment, _) => "Payment",
            (TaskType::EmployeeDb, _) => "Employee Db",
            (TaskType::Messaging, Some(MessageType::PaymentFail)) => "Payment Failure Message",
            (TaskType::Messaging, Some(MessageType::PaymentTrying)) => "Payment Error Message",
            (TaskType::Messaging, _) => "Payment Success Message",
        }
    }
}
