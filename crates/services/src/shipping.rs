//! Shipping service stub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use commander_core::{ServiceError, ServiceResult, TransactionId};

use crate::database::InMemoryDatabase;
use crate::fault::FaultQueue;
use crate::gateway::{Faulty, ShippingGateway};

/// Accepted shipping request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRequest {
    pub transaction_id: TransactionId,
    pub item: String,
    pub address: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ShippingService {
    database: InMemoryDatabase<TransactionId, ShippingRequest>,
    faults: FaultQueue,
}

impl ShippingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            database: InMemoryDatabase::new(),
            faults: FaultQueue::seeded(faults),
        }
    }

    pub fn requests(&self) -> Vec<ShippingRequest> {
        self.database.list()
    }
}

impl Faulty for ShippingService {
    fn faults(&self) -> &FaultQueue {
        &self.faults
    }
}

impl ShippingGateway for ShippingService {
    fn receive_request(&self, item: &str, address: &str) -> ServiceResult<TransactionId> {
        let id = self
            .database
            .insert_with_fresh_key(TransactionId::new, |&transaction_id| ShippingRequest {
                transaction_id,
                item: item.to_string(),
                address: address.to_string(),
                received_at: Utc::now(),
            });
        debug!(transaction_id = %id, item, "shipping request stored");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_each_request() {
        let service = ShippingService::new();
        let a = service.receive_request("book", "ABCD").unwrap();
        let b = service.receive_request("pen", "ABCD").unwrap();
        assert_ne!(a, b);
        assert_eq!(service.requests().len(), 2);
    }

    #[test]
    fn faults_are_exposed_not_consumed() {
        let service = ShippingService::with_faults([ServiceError::ItemUnavailable]);
        assert!(service.receive_request("book", "ABCD").is_ok());
        assert_eq!(service.faults().len(), 1);
    }
}
