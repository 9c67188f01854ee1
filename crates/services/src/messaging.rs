//! Customer messaging service stub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use commander_core::{MessageType, ServiceError, ServiceResult, TransactionId};

use crate::database::InMemoryDatabase;
use crate::fault::FaultQueue;
use crate::gateway::{Faulty, MessagingGateway};

/// Message delivered to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub request_id: TransactionId,
    pub message: MessageType,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MessagingService {
    database: InMemoryDatabase<TransactionId, MessageRequest>,
    faults: FaultQueue,
}

impl MessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            database: InMemoryDatabase::new(),
            faults: FaultQueue::seeded(faults),
        }
    }

    pub fn requests(&self) -> Vec<MessageRequest> {
        self.database.list()
    }

    pub fn sent_of(&self, message: MessageType) -> usize {
        self.database
            .list()
            .iter()
            .filter(|r| r.message == message)
            .count()
    }

    /// Text the customer receives for `message`.
    pub fn render(message: MessageType) -> &'static str {
        match message {
            MessageType::PaymentSuccess => {
                "Msg: Your order has been placed and paid for successfully! \
                 Thank you for shopping with us!"
            }
            MessageType::PaymentTrying => {
                "Msg: There was an error in your payment process, we are working on it and \
                 will return back to you shortly. Meanwhile, your order has been placed and \
                 will be shipped."
            }
            MessageType::PaymentFail => {
                "Msg: There was an error in your payment process. Your order is placed and has \
                 been converted to COD. Please reach us on CUSTOMER-CARE-NUMBER in case of any \
                 queries. Thank you for shopping with us!"
            }
        }
    }
}

impl Faulty for MessagingService {
    fn faults(&self) -> &FaultQueue {
        &self.faults
    }
}

impl MessagingGateway for MessagingService {
    fn receive_request(&self, message: MessageType) -> ServiceResult<TransactionId> {
        let id = self
            .database
            .insert_with_fresh_key(TransactionId::new, |&request_id| MessageRequest {
                request_id,
                message,
                text: Self::render(message).to_string(),
                sent_at: Utc::now(),
            });
        info!(request_id = %id, code = message.code(), "{}", Self::render(message));
        Ok(id)
    }
}
