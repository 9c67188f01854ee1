//! The order commander: drives shipping, payment, messaging and employee
//! escalation for each order to a terminal state within its time budgets.
//!
//! Shipping runs on the caller's thread. Every later stage (and every queue
//! operation, see [`crate::queue`]) is handed to the [`TaskSpawner`] and the
//! caller returns immediately. Stage outcomes live on the shared
//! [`Order`]; no error ever crosses a stage boundary.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, MutexGuard};

use tracing::{debug, error, info, trace, warn};

use commander_core::{
    Entity, ErrorKind, IdAllocator, MessageSent, MessageType, Order, PaymentStatus, QueueTask,
    ServiceError, ServiceResult, SiteNotice, User,
};
use commander_services::{
    EmployeeGateway, FaultQueue, MessagingGateway, PaymentGateway, QueueStore, ShippingGateway,
};

use crate::config::{CommanderConfig, ConsistencyMode};
use crate::retry::{predicates, Retry, Sleeper, ThreadSleeper};
use crate::spawner::{TaskSpawner, ThreadSpawner};

/// The collaborators a commander drives.
#[derive(Clone)]
pub struct Collaborators {
    pub employee_handle: Arc<dyn EmployeeGateway>,
    pub payment: Arc<dyn PaymentGateway>,
    pub shipping: Arc<dyn ShippingGateway>,
    pub messaging: Arc<dyn MessagingGateway>,
    /// Without a queue store, stages that exhaust their retries are only
    /// escalated, never deferred.
    pub queue: Option<Arc<dyn QueueStore>>,
}

pub(crate) struct Inner {
    pub(crate) services: Collaborators,
    pub(crate) config: CommanderConfig,
    pub(crate) spawner: Arc<dyn TaskSpawner>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) ids: IdAllocator,
    /// Tasks added to the queue store and not yet dequeued.
    pub(crate) queue_items: AtomicUsize,
}

/// Order orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Commander {
    pub(crate) inner: Arc<Inner>,
}

/// Builder for a [`Commander`] with non-default spawner, sleeper or ids.
pub struct CommanderBuilder {
    services: Collaborators,
    config: CommanderConfig,
    spawner: Arc<dyn TaskSpawner>,
    sleeper: Arc<dyn Sleeper>,
    ids: IdAllocator,
}

impl CommanderBuilder {
    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_id_allocator(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Commander {
        Commander {
            inner: Arc::new(Inner {
                services: self.services,
                config: self.config,
                spawner: self.spawner,
                sleeper: self.sleeper,
                ids: self.ids,
                queue_items: AtomicUsize::new(0),
            }),
        }
    }
}

impl Commander {
    /// Commander with one thread per spawned stage and real sleeps.
    pub fn new(services: Collaborators, config: CommanderConfig) -> Self {
        Self::builder(services, config).build()
    }

    pub fn builder(services: Collaborators, config: CommanderConfig) -> CommanderBuilder {
        CommanderBuilder {
            services,
            config,
            spawner: Arc::new(ThreadSpawner),
            sleeper: Arc::new(ThreadSleeper),
            ids: IdAllocator::in_memory(),
        }
    }

    pub fn config(&self) -> &CommanderConfig {
        &self.inner.config
    }

    /// Create an order with a fresh id and place it.
    ///
    /// Returns once shipping has been decided; payment and everything after
    /// it continue in the background.
    pub fn place_order(&self, user: User, item: impl Into<String>, price: f64) -> Arc<Order> {
        let order = Arc::new(Order::new(self.inner.ids.next_order_id(), user, item, price));
        self.place(order.clone());
        order
    }

    /// Run the shipping stage for an existing order. Never panics.
    pub fn place(&self, order: Arc<Order>) {
        info!(order_id = %order.id(), item = order.item(), price = order.price(), "placing order");
        let placed = panic::catch_unwind(AssertUnwindSafe(|| self.shipping_stage(&order)));
        if placed.is_err() {
            error!(order_id = %order.id(), "order placement aborted by a panicking collaborator");
        }
    }

    fn shipping_stage(&self, order: &Arc<Order>) {
        let shipping = &self.inner.services.shipping;
        let mut retry = self.retry(
            |faults: &FaultQueue| {
                injected_failure(faults, order, "shipping service")?;
                let transaction_id = shipping.receive_request(order.item(), &order.user().address)?;
                info!(order_id = %order.id(), %transaction_id, "shipping placed successfully");
                self.payment_stage(order);
                Ok(())
            },
            |order: &Arc<Order>, err: &ServiceError| self.handle_shipping_error(order, err),
        );
        retry.perform(shipping.faults(), order);
    }

    fn handle_shipping_error(&self, order: &Arc<Order>, err: &ServiceError) {
        match err.kind() {
            ErrorKind::ShippingNotPossible => {
                self.show_notice(order, SiteNotice::ShippingNotPossible);
                info!(
                    order_id = %order.id(),
                    address = %order.user().address,
                    "shipping not possible to address, adding problem to employee handle"
                );
                self.escalate(order);
            }
            ErrorKind::ItemUnavailable => {
                self.show_notice(order, SiteNotice::ItemUnavailable);
                info!(
                    order_id = %order.id(),
                    item = order.item(),
                    "item unavailable, adding problem to employee handle"
                );
                self.escalate(order);
            }
            _ => {
                self.show_notice(order, SiteNotice::OrderNotPlaced);
                error!(order_id = %order.id(), error = %err, "shipping service unavailable, order not placed");
            }
        }
    }

    /// Attempt payment for a shipped order.
    ///
    /// Past the payment budget a `Trying` order is failed on the spot (no
    /// payment call); otherwise the attempt is spawned.
    pub fn payment_stage(&self, order: &Arc<Order>) {
        if order.budget_exceeded(self.inner.config.limits.payment_time) {
            let expired = {
                let _guard = self.stage_guard(order);
                let trying = order.payment_status() == PaymentStatus::Trying;
                if trying {
                    order.set_payment_status(PaymentStatus::NotDone);
                }
                trying
            };
            if expired {
                error!(order_id = %order.id(), "payment time for order over, failed and returning");
                self.message_stage(order, MessageType::PaymentFail);
            } else {
                trace!(order_id = %order.id(), "payment time for order over, nothing to do");
            }
            return;
        }

        let this = self.clone();
        let order = order.clone();
        self.spawn("payment", move || this.run_payment(&order));
    }

    fn run_payment(&self, order: &Arc<Order>) {
        let payment = &self.inner.services.payment;
        let mut retry = self.retry(
            |faults: &FaultQueue| {
                injected_failure(faults, order, "payment service")?;
                let transaction_id = {
                    let _guard = self.stage_guard(order);
                    if order.payment_status() != PaymentStatus::Trying {
                        trace!(order_id = %order.id(), "payment already settled");
                        return Ok(());
                    }
                    let transaction_id = payment.receive_request(order.price())?;
                    order.set_payment_status(PaymentStatus::Done);
                    transaction_id
                };
                info!(order_id = %order.id(), %transaction_id, "payment successful");
                self.show_notice(order, SiteNotice::PaymentSuccessful);
                self.message_stage(order, MessageType::PaymentSuccess);
                Ok(())
            },
            |order: &Arc<Order>, err: &ServiceError| self.handle_payment_error(order, err),
        );
        retry.perform(payment.faults(), order);
    }

    fn handle_payment_error(&self, order: &Arc<Order>, err: &ServiceError) {
        if err.kind() == ErrorKind::PaymentDetailsError {
            self.show_notice(order, SiteNotice::PaymentDetailsInvalid);
            let failed = {
                let _guard = self.stage_guard(order);
                let trying = order.payment_status() == PaymentStatus::Trying;
                if trying {
                    order.set_payment_status(PaymentStatus::NotDone);
                }
                trying
            };
            error!(order_id = %order.id(), "payment details incorrect, payment failed");
            if failed {
                self.message_stage(order, MessageType::PaymentFail);
            }
            return;
        }

        if order.message_sent() == MessageSent::NoneSent {
            self.show_notice(order, SiteNotice::PaymentPending);
            warn!(order_id = %order.id(), error = %err, "payment error, going to queue");
            self.message_stage(order, MessageType::PaymentTrying);
        }
        if order.payment_status() == PaymentStatus::Trying
            && !order.budget_exceeded(self.inner.config.limits.payment_time)
        {
            self.enqueue(QueueTask::payment(order.clone()));
            self.escalate(order);
        }
    }

    /// Send a customer message for the order.
    ///
    /// Dropped past the message budget; otherwise spawned. A terminal message
    /// already recorded on the order suppresses any further message.
    pub fn message_stage(&self, order: &Arc<Order>, message: MessageType) {
        if order.budget_exceeded(self.inner.config.limits.message_time) {
            trace!(order_id = %order.id(), ?message, "message time for order over, returning");
            return;
        }
        let this = self.clone();
        let order = order.clone();
        self.spawn("messaging", move || this.run_message(&order, message));
    }

    fn run_message(&self, order: &Arc<Order>, message: MessageType) {
        let messaging = &self.inner.services.messaging;
        let mut retry = self.retry(
            |faults: &FaultQueue| {
                injected_failure(faults, order, "messaging service")?;
                let request_id = {
                    let _guard = self.stage_guard(order);
                    if !message_needed(order, message) {
                        trace!(order_id = %order.id(), ?message, "message no longer needed");
                        return Ok(());
                    }
                    let request_id = messaging.receive_request(message)?;
                    order.set_message_sent(sent_state(message));
                    request_id
                };
                info!(order_id = %order.id(), %request_id, ?message, "message sent");
                Ok(())
            },
            |order: &Arc<Order>, err: &ServiceError| self.handle_message_error(order, message, err),
        );
        retry.perform(messaging.faults(), order);
    }

    fn handle_message_error(&self, order: &Arc<Order>, message: MessageType, err: &ServiceError) {
        if message_needed(order, message)
            && !order.budget_exceeded(self.inner.config.limits.message_time)
        {
            warn!(
                order_id = %order.id(),
                ?message,
                error = %err,
                "error in sending message, queueing task and adding to employee handle"
            );
            self.enqueue(QueueTask::messaging(order.clone(), message));
            self.escalate(order);
        } else {
            debug!(order_id = %order.id(), ?message, error = %err, "giving up on message");
        }
    }

    /// Hand the order to the employee handle (at most once).
    pub fn escalate(&self, order: &Arc<Order>) {
        if order.budget_exceeded(self.inner.config.limits.employee_time) {
            trace!(order_id = %order.id(), "employee handle time for order over, returning");
            return;
        }
        let this = self.clone();
        let order = order.clone();
        self.spawn("employee-handle", move || this.run_escalation(&order));
    }

    fn run_escalation(&self, order: &Arc<Order>) {
        let employee = &self.inner.services.employee_handle;
        let mut retry = self.retry(
            |faults: &FaultQueue| {
                injected_failure(faults, order, "employee handle")?;
                {
                    let _guard = self.stage_guard(order);
                    if order.is_added_to_employee_handle() {
                        return Ok(());
                    }
                    employee.receive_request(order)?;
                    order.mark_added_to_employee_handle();
                }
                info!(order_id = %order.id(), "added order to employee database");
                Ok(())
            },
            |order: &Arc<Order>, err: &ServiceError| {
                if !order.is_added_to_employee_handle()
                    && !order.budget_exceeded(self.inner.config.limits.employee_time)
                {
                    warn!(order_id = %order.id(), error = %err, "error in adding to employee db, queueing task");
                    self.enqueue(QueueTask::employee_db(order.clone()));
                }
            },
        );
        retry.perform(employee.faults(), order);
    }

    /// Record the customer-facing outcome; only the first one per order shows.
    pub(crate) fn show_notice(&self, order: &Order, notice: SiteNotice) {
        if order.record_notice(notice) {
            info!(order_id = %order.id(), ?notice, "{}", notice.text());
        }
    }

    /// The order's stage lock in `Serialized` mode, nothing in `Relaxed` mode.
    pub(crate) fn stage_guard<'a>(&self, order: &'a Order) -> Option<MutexGuard<'a, ()>> {
        match self.inner.config.consistency {
            ConsistencyMode::Relaxed => None,
            ConsistencyMode::Serialized => Some(order.lock_stages()),
        }
    }

    /// Retry configured from this commander's parameters, retrying only
    /// transient collaborator failures.
    pub(crate) fn retry<T, O, H>(&self, operation: O, handler: H) -> Retry<T, O, H>
    where
        T: ?Sized,
        O: FnMut(&FaultQueue) -> ServiceResult<()>,
        H: FnMut(&T, &ServiceError),
    {
        let params = self.inner.config.retry;
        Retry::new(operation, handler, params.num_of_retries, params.max_retry_delay)
            .retry_on(predicates::database_unavailable)
            .with_sleeper(self.inner.sleeper.clone())
    }

    pub(crate) fn spawn(&self, name: &'static str, job: impl FnOnce() + Send + 'static) {
        self.inner.spawner.spawn(name, Box::new(job));
    }
}

impl core::fmt::Debug for Commander {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Commander")
            .field("config", &self.inner.config)
            .field("queued_items", &self.queued_items())
            .field("has_queue", &self.inner.services.queue.is_some())
            .finish()
    }
}

/// Pop the collaborator's next seeded failure, if any.
pub(crate) fn injected_failure(
    faults: &FaultQueue,
    order: &Order,
    service: &'static str,
) -> ServiceResult<()> {
    match faults.pop() {
        Some(err) if err.is_retryable() => {
            debug!(order_id = %order.id(), service, "error in connecting to {service}, trying again");
            Err(err)
        }
        Some(err) => {
            debug!(order_id = %order.id(), service, error = %err, "{service} rejected request");
            Err(err)
        }
        None => Ok(()),
    }
}

/// Whether sending `message` would still change anything for the order.
///
/// The "payment trying" notice only goes out while payment is pending and
/// nothing has been sent; any other message only while no terminal message
/// has been sent.
pub(crate) fn message_needed(order: &Order, message: MessageType) -> bool {
    match message {
        MessageType::PaymentTrying => {
            order.payment_status() == PaymentStatus::Trying
                && order.message_sent() == MessageSent::NoneSent
        }
        MessageType::PaymentFail | MessageType::PaymentSuccess => {
            !order.message_sent().is_terminal()
        }
    }
}

fn sent_state(message: MessageType) -> MessageSent {
    match message {
        MessageType::PaymentFail => MessageSent::PaymentFail,
        MessageType::PaymentTrying => MessageSent::PaymentTrying,
        MessageType::PaymentSuccess => MessageSent::PaymentSuccessful,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryParams, TimeLimits};
    use crate::spawner::InlineSpawner;
    use commander_services::{EmployeeHandle, MessagingService, PaymentService, ShippingService};
    use proptest::prelude::*;
    use std::time::Duration;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    struct Fixture {
        commander: Commander,
        shipping: Arc<ShippingService>,
        payment: Arc<PaymentService>,
        messaging: Arc<MessagingService>,
        employee: Arc<EmployeeHandle>,
    }

    fn fixture(
        shipping: ShippingService,
        payment: PaymentService,
        messaging: MessagingService,
        employee: EmployeeHandle,
    ) -> Fixture {
        let shipping = Arc::new(shipping);
        let payment = Arc::new(payment);
        let messaging = Arc::new(messaging);
        let employee = Arc::new(employee);
        let config = CommanderConfig::default()
            .with_retry(RetryParams::new(1, Duration::from_millis(1)))
            .with_limits(TimeLimits::new(
                Duration::from_secs(60),
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(60),
                Duration::from_secs(60),
            ));
        let commander = Commander::builder(
            Collaborators {
                employee_handle: employee.clone(),
                payment: payment.clone(),
                shipping: shipping.clone(),
                messaging: messaging.clone(),
                queue: None,
            },
            config,
        )
        .with_spawner(Arc::new(InlineSpawner))
        .with_sleeper(Arc::new(NoSleep))
        .build();

        Fixture {
            commander,
            shipping,
            payment,
            messaging,
            employee,
        }
    }

    fn healthy() -> Fixture {
        fixture(
            ShippingService::new(),
            PaymentService::new(),
            MessagingService::new(),
            EmployeeHandle::new(),
        )
    }

    fn user() -> User {
        User::new("Jim", "ABCD")
    }

    #[test]
    fn happy_path_pays_and_confirms() {
        let f = healthy();
        let order = f.commander.place_order(user(), "book", 10.0);

        assert_eq!(order.payment_status(), PaymentStatus::Done);
        assert_eq!(order.message_sent(), MessageSent::PaymentSuccessful);
        assert!(!order.is_added_to_employee_handle());
        assert_eq!(order.notice(), Some(SiteNotice::PaymentSuccessful));
        assert_eq!(f.shipping.requests().len(), 1);
        assert_eq!(f.payment.payments_taken(), 1);
        assert_eq!(f.messaging.sent_of(MessageType::PaymentSuccess), 1);
    }

    #[test]
    fn item_unavailable_escalates_without_payment() {
        let f = fixture(
            ShippingService::with_faults([ServiceError::ItemUnavailable]),
            PaymentService::new(),
            MessagingService::new(),
            EmployeeHandle::new(),
        );
        let order = f.commander.place_order(user(), "book", 10.0);

        assert_eq!(order.payment_status(), PaymentStatus::Trying);
        assert!(order.is_added_to_employee_handle());
        assert!(f.employee.contains(order.id()));
        assert_eq!(order.notice(), Some(SiteNotice::ItemUnavailable));
        assert_eq!(f.payment.payments_taken(), 0);
    }

    #[test]
    fn shipping_outage_leaves_order_unplaced() {
        let f = fixture(
            ShippingService::with_faults([
                ServiceError::DatabaseUnavailable,
                ServiceError::DatabaseUnavailable,
            ]),
            PaymentService::new(),
            MessagingService::new(),
            EmployeeHandle::new(),
        );
        let order = f.commander.place_order(user(), "book", 10.0);

        assert_eq!(order.notice(), Some(SiteNotice::OrderNotPlaced));
        assert!(f.shipping.requests().is_empty());
        assert!(!order.is_added_to_employee_handle());
    }

    #[test]
    fn payment_details_error_fails_without_retry() {
        let f = fixture(
            ShippingService::new(),
            PaymentService::with_faults([ServiceError::PaymentDetailsError]),
            MessagingService::new(),
            EmployeeHandle::new(),
        );
        let order = f.commander.place_order(user(), "book", 10.0);

        assert_eq!(order.payment_status(), PaymentStatus::NotDone);
        assert_eq!(order.message_sent(), MessageSent::PaymentFail);
        assert_eq!(order.notice(), Some(SiteNotice::PaymentDetailsInvalid));
        assert_eq!(f.payment.payments_taken(), 0);
    }

    #[test]
    fn exhausted_payment_without_queue_escalates() {
        let f = fixture(
            ShippingService::new(),
            PaymentService::with_faults([
                ServiceError::DatabaseUnavailable,
                ServiceError::DatabaseUnavailable,
            ]),
            MessagingService::new(),
            EmployeeHandle::new(),
        );
        let order = f.commander.place_order(user(), "book", 10.0);

        assert_eq!(order.payment_status(), PaymentStatus::Trying);
        assert_eq!(order.message_sent(), MessageSent::PaymentTrying);
        assert_eq!(order.notice(), Some(SiteNotice::PaymentPending));
        assert!(order.is_added_to_employee_handle());
        assert_eq!(f.commander.queued_items(), 0);
    }

    #[test]
    fn settled_payment_is_not_taken_again() {
        let f = healthy();
        let order = f.commander.place_order(user(), "book", 10.0);
        assert_eq!(order.payment_status(), PaymentStatus::Done);

        f.commander.payment_stage(&order);
        f.commander.payment_stage(&order);

        assert_eq!(order.payment_status(), PaymentStatus::Done);
        assert_eq!(f.payment.payments_taken(), 1);
    }

    #[test]
    fn expired_payment_fails_without_calling_service() {
        let f = healthy();
        let order = Arc::new(
            Order::new(IdAllocator::in_memory().next_order_id(), user(), "book", 10.0)
                .with_created_at(chrono::Utc::now() - chrono::Duration::seconds(61)),
        );

        f.commander.payment_stage(&order);

        assert_eq!(order.payment_status(), PaymentStatus::NotDone);
        assert_eq!(f.payment.payments_taken(), 0);
        // The message budget expired as well.
        assert_eq!(order.message_sent(), MessageSent::NoneSent);
    }

    #[test]
    fn escalation_happens_once() {
        let f = healthy();
        let order = Arc::new(Order::new(
            IdAllocator::in_memory().next_order_id(),
            user(),
            "book",
            10.0,
        ));

        f.commander.escalate(&order);
        f.commander.escalate(&order);

        assert!(order.is_added_to_employee_handle());
        assert_eq!(f.employee.orders().len(), 1);
    }

    #[test]
    fn message_needed_rules() {
        let order = Order::new(IdAllocator::in_memory().next_order_id(), user(), "book", 10.0);
        assert!(message_needed(&order, MessageType::PaymentTrying));
        assert!(message_needed(&order, MessageType::PaymentSuccess));

        order.set_message_sent(MessageSent::PaymentTrying);
        assert!(!message_needed(&order, MessageType::PaymentTrying));
        assert!(message_needed(&order, MessageType::PaymentFail));

        order.set_message_sent(MessageSent::PaymentFail);
        assert!(!message_needed(&order, MessageType::PaymentSuccess));
        assert!(!message_needed(&order, MessageType::PaymentFail));
    }

    fn message_type() -> impl Strategy<Value = MessageType> {
        prop_oneof![
            Just(MessageType::PaymentFail),
            Just(MessageType::PaymentTrying),
            Just(MessageType::PaymentSuccess),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: once a terminal message is recorded, no later message
        /// request changes it or reaches the messaging service.
        #[test]
        fn terminal_message_is_final(messages in proptest::collection::vec(message_type(), 1..12)) {
            let f = healthy();
            let order = Arc::new(Order::new(
                IdAllocator::in_memory().next_order_id(),
                user(),
                "book",
                10.0,
            ));

            let mut terminal: Option<MessageSent> = None;
            for message in messages {
                f.commander.message_stage(&order, message);
                let sent = order.message_sent();
                if let Some(first) = terminal {
                    prop_assert_eq!(sent, first);
                } else if sent.is_terminal() {
                    terminal = Some(sent);
                }
            }

            let terminal_sends = f.messaging.sent_of(MessageType::PaymentFail)
                + f.messaging.sent_of(MessageType::PaymentSuccess);
            prop_assert!(terminal_sends <= 1);
        }
    }
}
