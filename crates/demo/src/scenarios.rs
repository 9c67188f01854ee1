//! Collaborator fault setups, one per failure mode.

use std::sync::Arc;

use clap::ValueEnum;

use commander_core::ServiceError;
use commander_orchestrator::Collaborators;
use commander_services::{
    EmployeeHandle, MessagingService, PaymentService, QueueDatabase, ShippingService,
};

/// Enough consecutive outages to exhaust any sensible retry budget.
const OUTAGE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Every collaborator answers.
    AllSuccess,
    /// Payment, employee database and queue are all down.
    EmployeeDbDown,
    /// The item is out of stock.
    ItemUnavailable,
    /// Shipping cannot be reached; the order is never placed.
    ShippingDbDown,
    /// The address cannot be shipped to.
    ShippingNotPossible,
    /// A transient payment failure, then rejected card details.
    PaymentDetailsError,
    /// Payment is down; the queue retries it.
    PaymentDbDown,
    /// Payment and queue are both down.
    PaymentQueueDown,
    /// Messaging is down; the queue retries the confirmation.
    MessagingDbDown,
    /// Messaging and queue are both down.
    MessagingQueueDown,
}

/// The stubs behind one scenario, kept for inspection after the run.
pub struct Stubs {
    pub shipping: Arc<ShippingService>,
    pub payment: Arc<PaymentService>,
    pub messaging: Arc<MessagingService>,
    pub employee: Arc<EmployeeHandle>,
    pub queue: Arc<QueueDatabase>,
}

impl Stubs {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            employee_handle: self.employee.clone(),
            payment: self.payment.clone(),
            shipping: self.shipping.clone(),
            messaging: self.messaging.clone(),
            queue: Some(self.queue.clone()),
        }
    }
}

fn down() -> Vec<ServiceError> {
    vec![ServiceError::DatabaseUnavailable; OUTAGE]
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        Scenario::value_variants()
    }

    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_else(|| format!("{self:?}"))
    }

    pub fn stubs(self) -> Stubs {
        let mut shipping = Vec::new();
        let mut payment = Vec::new();
        let mut messaging = Vec::new();
        let mut employee = Vec::new();
        let mut queue = Vec::new();

        match self {
            Scenario::AllSuccess => {}
            Scenario::EmployeeDbDown => {
                payment = down();
                employee = down();
                queue = down();
            }
            Scenario::ItemUnavailable => shipping.push(ServiceError::ItemUnavailable),
            Scenario::ShippingDbDown => shipping = down(),
            Scenario::ShippingNotPossible => shipping.push(ServiceError::ShippingNotPossible),
            Scenario::PaymentDetailsError => {
                payment = vec![
                    ServiceError::DatabaseUnavailable,
                    ServiceError::PaymentDetailsError,
                ];
                messaging.push(ServiceError::DatabaseUnavailable);
                queue.push(ServiceError::DatabaseUnavailable);
            }
            Scenario::PaymentDbDown => payment = down(),
            Scenario::PaymentQueueDown => {
                payment = down();
                queue = down();
            }
            Scenario::MessagingDbDown => messaging = down(),
            Scenario::MessagingQueueDown => {
                messaging = down();
                queue = down();
            }
        }

        Stubs {
            shipping: Arc::new(ShippingService::with_faults(shipping)),
            payment: Arc::new(PaymentService::with_faults(payment)),
            messaging: Arc::new(MessagingService::with_faults(messaging)),
            employee: Arc::new(EmployeeHandle::with_faults(employee)),
            queue: Arc::new(QueueDatabase::with_faults(queue)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_services::Faulty;

    #[test]
    fn names_are_kebab_case() {
        assert_eq!(Scenario::AllSuccess.name(), "all-success");
        assert_eq!(Scenario::MessagingQueueDown.name(), "messaging-queue-down");
        assert_eq!(Scenario::all().len(), 10);
    }

    #[test]
    fn outage_scenarios_seed_faults() {
        let stubs = Scenario::PaymentQueueDown.stubs();
        assert_eq!(stubs.payment.faults().len(), OUTAGE);
        assert_eq!(stubs.queue.faults().len(), OUTAGE);
        assert!(stubs.shipping.faults().is_empty());

        let stubs = Scenario::AllSuccess.stubs();
        assert!(stubs.payment.faults().is_empty());
    }
}
