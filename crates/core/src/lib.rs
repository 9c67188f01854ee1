//! `commander-core`: order orchestration domain building blocks.
//!
//! This crate contains **pure domain** primitives (no threads, no sleeping, no
//! collaborator calls): the order record and its stage flags, queue tasks, ids
//! and the failure taxonomy shared by services and the orchestrator.

pub mod entity;
pub mod error;
pub mod id;
pub mod order;
pub mod task;
pub mod user;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind, ServiceError, ServiceResult};
pub use id::{IdAllocator, IdStore, InMemoryIdStore, OrderId, TransactionId};
pub use order::{MessageSent, Order, OrderSnapshot, PaymentStatus, SiteNotice};
pub use task::{MessageType, QueueTask, TaskType};
pub use user::User;
pub use value_object::ValueObject;
