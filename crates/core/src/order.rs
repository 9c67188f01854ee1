//! Order record: the unit of work and the duplicate-suppression guard.
//!
//! Stage handlers running on different threads share one `Arc<Order>`. The
//! stage flags are atomics that handlers read and then write with separate
//! operations (no compare-and-swap), so the last writer wins. Two handlers that
//! both pass a check before either writes can apply a side effect twice; callers
//! that need to rule this out take [`Order::lock_stages`] around check-and-act.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::OrderId;
use crate::user::User;

/// Payment stage outcome.
///
/// Moves `Trying -> Done` or `Trying -> NotDone`, never back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PaymentStatus {
    NotDone = 0,
    Trying = 1,
    Done = 2,
}

impl PaymentStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PaymentStatus::NotDone,
            2 => PaymentStatus::Done,
            _ => PaymentStatus::Trying,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Trying)
    }
}

/// Last customer message delivered for this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageSent {
    NoneSent = 0,
    PaymentTrying = 1,
    PaymentFail = 2,
    PaymentSuccessful = 3,
}

impl MessageSent {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MessageSent::PaymentTrying,
            2 => MessageSent::PaymentFail,
            3 => MessageSent::PaymentSuccessful,
            _ => MessageSent::NoneSent,
        }
    }

    /// Once terminal, no further message of any type is sent.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageSent::PaymentFail | MessageSent::PaymentSuccessful)
    }
}

/// Customer-facing outcome shown when the order is placed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteNotice {
    PaymentSuccessful,
    PaymentPending,
    PaymentDetailsInvalid,
    ShippingNotPossible,
    ItemUnavailable,
    OrderNotPlaced,
}

impl SiteNotice {
    pub fn text(self) -> &'static str {
        match self {
            SiteNotice::PaymentSuccessful => {
                "Payment made successfully, thank you for shopping with us!!"
            }
            SiteNotice::PaymentPending => {
                "There was an error in payment. We are on it, and will get back to you asap. \
                 Don't worry, your order has been placed and will be shipped."
            }
            SiteNotice::PaymentDetailsInvalid => {
                "There was an error in payment. Your account/card details may have been \
                 incorrect. Meanwhile, your order has been converted to COD and will be shipped."
            }
            SiteNotice::ShippingNotPossible => {
                "Shipping is currently not possible to your address. We are working on the \
                 problem and will get back to you asap."
            }
            SiteNotice::ItemUnavailable => {
                "This item is currently unavailable. We will inform you as soon as the item \
                 becomes available again."
            }
            SiteNotice::OrderNotPlaced => {
                "Sorry, there was a problem in creating your order. Please try later."
            }
        }
    }
}

/// Entity: Order.
pub struct Order {
    id: OrderId,
    user: User,
    item: String,
    price: f64,
    created_at: DateTime<Utc>,
    payment_status: AtomicU8,
    message_sent: AtomicU8,
    added_to_employee_handle: AtomicBool,
    notice: OnceLock<SiteNotice>,
    stage_lock: Mutex<()>,
}

impl Order {
    pub fn new(id: OrderId, user: User, item: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            user,
            item: item.into(),
            price,
            created_at: Utc::now(),
            payment_status: AtomicU8::new(PaymentStatus::Trying as u8),
            message_sent: AtomicU8::new(MessageSent::NoneSent as u8),
            added_to_employee_handle: AtomicBool::new(false),
            notice: OnceLock::new(),
            stage_lock: Mutex::new(()),
        }
    }

    /// Override the creation time. All stage budgets are measured from it.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wall-clock time since creation (zero if the clock went backwards).
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// `true` once `elapsed() >= budget`.
    pub fn budget_exceeded(&self, budget: Duration) -> bool {
        self.elapsed() >= budget
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_u8(self.payment_status.load(Ordering::SeqCst))
    }

    pub fn set_payment_status(&self, status: PaymentStatus) {
        self.payment_status.store(status as u8, Ordering::SeqCst);
    }

    pub fn message_sent(&self) -> MessageSent {
        MessageSent::from_u8(self.message_sent.load(Ordering::SeqCst))
    }

    pub fn set_message_sent(&self, sent: MessageSent) {
        self.message_sent.store(sent as u8, Ordering::SeqCst);
    }

    pub fn is_added_to_employee_handle(&self) -> bool {
        self.added_to_employee_handle.load(Ordering::SeqCst)
    }

    pub fn mark_added_to_employee_handle(&self) {
        self.added_to_employee_handle.store(true, Ordering::SeqCst);
    }

    pub fn notice(&self) -> Option<SiteNotice> {
        self.notice.get().copied()
    }

    /// Record the customer-facing outcome. Only the first call takes effect;
    /// returns whether this call was it.
    pub fn record_notice(&self, notice: SiteNotice) -> bool {
        self.notice.set(notice).is_ok()
    }

    /// Serialize check-and-act on the stage flags for this order.
    pub fn lock_stages(&self) -> MutexGuard<'_, ()> {
        self.stage_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id.clone(),
            user: self.user.clone(),
            item: self.item.clone(),
            price: self.price,
            created_at: self.created_at,
            payment_status: self.payment_status(),
            message_sent: self.message_sent(),
            added_to_employee_handle: self.is_added_to_employee_handle(),
            notice: self.notice(),
        }
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl core::fmt::Debug for Order {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id)
            .field("item", &self.item)
            .field("price", &self.price)
            .field("created_at", &self.created_at)
            .field("payment_status", &self.payment_status())
            .field("message_sent", &self.message_sent())
            .field("added_to_employee_handle", &self.is_added_to_employee_handle())
            .field("notice", &self.notice())
            .finish()
    }
}

/// Point-in-time copy of an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub user: User,
    pub item: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub message_sent: MessageSent,
    pub added_to_employee_handle: bool,
    pub notice: Option<SiteNotice>,
}
