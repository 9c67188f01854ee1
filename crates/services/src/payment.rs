//! Payment service stub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use commander_core::{ServiceError, ServiceResult, TransactionId};

use crate::database::InMemoryDatabase;
use crate::fault::FaultQueue;
use crate::gateway::{Faulty, PaymentGateway};

/// Accepted payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub transaction_id: TransactionId,
    pub amount: f64,
    pub paid: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PaymentService {
    database: InMemoryDatabase<TransactionId, PaymentRequest>,
    faults: FaultQueue,
}

impl PaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            database: InMemoryDatabase::new(),
            faults: FaultQueue::seeded(faults),
        }
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.database.list()
    }

    /// Number of payments taken. More than one for a single order means a
    /// stage ran twice.
    pub fn payments_taken(&self) -> usize {
        self.database.len()
    }
}

impl Faulty for PaymentService {
    fn faults(&self) -> &FaultQueue {
        &self.faults
    }
}

impl PaymentGateway for PaymentService {
    fn receive_request(&self, amount: f64) -> ServiceResult<TransactionId> {
        let id = self
            .database
            .insert_with_fresh_key(TransactionId::new, |&transaction_id| PaymentRequest {
                transaction_id,
                amount,
                paid: true,
                received_at: Utc::now(),
            });
        debug!(transaction_id = %id, amount, "payment recorded");
        Ok(id)
    }
}
