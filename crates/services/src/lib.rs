//! Collaborators the commander drives: shipping, payment, messaging, the
//! employee handle and the queue store.
//!
//! Each collaborator is consumed through a small gateway trait. The stubs in
//! this crate keep their records in memory and carry a [`FaultQueue`] of
//! pre-seeded failures; callers pop the next failure before doing real work,
//! which is how tests and demo scenarios inject outages.

pub mod database;
pub mod employee;
pub mod fault;
pub mod gateway;
pub mod messaging;
pub mod payment;
pub mod queue;
pub mod shipping;

pub use database::InMemoryDatabase;
pub use employee::EmployeeHandle;
pub use fault::FaultQueue;
pub use gateway::{EmployeeGateway, Faulty, MessagingGateway, PaymentGateway, QueueStore, ShippingGateway};
pub use messaging::{MessageRequest, MessagingService};
pub use payment::{PaymentRequest, PaymentService};
pub use queue::QueueDatabase;
pub use shipping::{ShippingRequest, ShippingService};
