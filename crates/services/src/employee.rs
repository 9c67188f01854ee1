//! Employee handle stub: orders parked for a human to resolve.

use commander_core::{Entity, Order, OrderId, OrderSnapshot, ServiceError, ServiceResult};
use tracing::debug;

use crate::database::InMemoryDatabase;
use crate::fault::FaultQueue;
use crate::gateway::{EmployeeGateway, Faulty};

#[derive(Debug, Default)]
pub struct EmployeeHandle {
    database: InMemoryDatabase<OrderId, OrderSnapshot>,
    faults: FaultQueue,
}

impl EmployeeHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            database: InMemoryDatabase::new(),
            faults: FaultQueue::seeded(faults),
        }
    }

    pub fn orders(&self) -> Vec<OrderSnapshot> {
        self.database.list()
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.database.get(id).is_some()
    }
}

impl Faulty for EmployeeHandle {
    fn faults(&self) -> &FaultQueue {
        &self.faults
    }
}

impl EmployeeGateway for EmployeeHandle {
    fn receive_request(&self, order: &Order) -> ServiceResult<()> {
        // Re-submitting an order is a no-op.
        if self.database.insert_if_absent(order.id().clone(), order.snapshot()) {
            debug!(order_id = %order.id(), "order parked for employee review");
        }
        Ok(())
    }
}
