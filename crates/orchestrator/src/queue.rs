//! Deferred re-attempts: enqueueing stage tasks and the drain loop that works
//! through them.
//!
//! A stage that exhausts its inline retries but still has budget left is
//! wrapped in a [`QueueTask`] and added to the queue store. Each successful add
//! starts a drain step. A drain step looks at the head task, drops it once it
//! has been in play for `queue_task_time` or its stage has reached a terminal
//! state, otherwise re-runs the stage inline. While tasks remain it sleeps
//! `queue_task_time / 3` and schedules the next step.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use commander_core::{
    Entity, MessageType, PaymentStatus, QueueTask, ServiceError, ServiceResult, TaskType,
};
use commander_services::{FaultQueue, QueueStore};

use crate::commander::{message_needed, Commander};

impl Commander {
    /// Defer a stage re-attempt to the queue store.
    ///
    /// Dropped (with a trace log) when the order's queue budget is spent, when
    /// the stage is already settled, or when no queue store is configured.
    pub fn enqueue(&self, task: QueueTask) {
        let order = task.order();
        if order.budget_exceeded(self.inner.config.limits.queue_time) {
            trace!(order_id = %order.id(), task = task.type_name(), "queue time for order over, not queueing");
            return;
        }
        if task_settled(&task) {
            trace!(order_id = %order.id(), task = task.type_name(), "not queueing task since task already done");
            return;
        }
        let Some(queue) = self.inner.services.queue.clone() else {
            warn!(order_id = %order.id(), task = task.type_name(), "no queue store configured, dropping task");
            return;
        };

        let this = self.clone();
        let task = Arc::new(task);
        self.spawn("queue-add", move || this.add_to_queue(queue.as_ref(), &task));
    }

    fn add_to_queue(&self, queue: &dyn QueueStore, task: &Arc<QueueTask>) {
        let mut retry = self.retry(
            |faults: &FaultQueue| {
                if let Some(err) = faults.pop() {
                    warn!(order_id = %task.order().id(), error = %err, "error in connecting to queue db, trying again");
                    return Err(err);
                }
                queue.add(task.clone())?;
                self.inner.queue_items.fetch_add(1, Ordering::SeqCst);
                info!(order_id = %task.order().id(), task = task.type_name(), "task added to queue");
                self.drain();
                Ok(())
            },
            |task: &Arc<QueueTask>, err: &ServiceError| self.handle_enqueue_error(task, err),
        );
        retry.perform(queue.faults(), task);
    }

    fn handle_enqueue_error(&self, task: &QueueTask, err: &ServiceError) {
        let order = task.order();
        if task.task_type() == TaskType::Payment {
            let failed = {
                let _guard = self.stage_guard(order);
                let trying = order.payment_status() == PaymentStatus::Trying;
                if trying {
                    order.set_payment_status(PaymentStatus::NotDone);
                }
                trying
            };
            error!(order_id = %order.id(), error = %err, "unable to queue payment task, payment failed");
            if failed {
                self.message_stage(order, MessageType::PaymentFail);
            }
        }
        error!(
            order_id = %order.id(),
            task = task.type_name(),
            error = %err,
            "unable to queue task, adding to employee handle"
        );
        self.escalate(order);
    }

    /// Number of tasks added to the queue store and not yet dequeued.
    pub fn queued_items(&self) -> usize {
        self.inner.queue_items.load(Ordering::SeqCst)
    }

    /// Schedule one drain step.
    pub(crate) fn drain(&self) {
        let Some(queue) = self.inner.services.queue.clone() else {
            return;
        };
        let this = self.clone();
        self.spawn("queue-drain", move || {
            let mut retry = this.retry(
                |faults: &FaultQueue| {
                    if let Some(err) = faults.pop() {
                        warn!(error = %err, "error in accessing queue db to do tasks, trying again");
                        return Err(err);
                    }
                    this.drain_step(queue.as_ref())
                },
                |_: &(), err: &ServiceError| debug!(error = %err, "giving up on draining queue"),
            );
            retry.perform(queue.faults(), &());
        });
    }

    fn drain_step(&self, queue: &dyn QueueStore) -> ServiceResult<()> {
        if self.queued_items() > 0 {
            let task = queue.peek()?.ok_or(ServiceError::QueueEmpty)?;
            let order = task.order();
            trace!(order_id = %order.id(), task = task.type_name(), "started doing queued task");

            let first_attempt = task.mark_first_attempt(Utc::now());
            let in_play = (Utc::now() - first_attempt).to_std().unwrap_or(Duration::ZERO);
            if in_play >= self.inner.config.limits.queue_task_time {
                trace!(order_id = %order.id(), task = task.type_name(), "queued task timed out, dequeueing");
                self.dequeue();
            } else {
                match task.task_type() {
                    TaskType::Payment => self.retry_payment_task(&task),
                    TaskType::Messaging => self.retry_messaging_task(&task),
                    TaskType::EmployeeDb => self.retry_employee_task(&task),
                }
            }
        }

        if self.queued_items() == 0 {
            trace!("queue is empty, drain loop stopping");
        } else {
            self.inner
                .sleeper
                .sleep(self.inner.config.limits.drain_interval());
            self.drain();
        }
        Ok(())
    }

    fn retry_payment_task(&self, task: &QueueTask) {
        let order = task.order();
        if order.payment_status() != PaymentStatus::Trying {
            trace!(order_id = %order.id(), "queued payment already settled, dequeueing");
            self.dequeue();
        } else {
            debug!(order_id = %order.id(), "retrying payment from queue");
            self.payment_stage(order);
        }
    }

    fn retry_messaging_task(&self, task: &QueueTask) {
        let order = task.order();
        let Some(message) = task.message_type() else {
            warn!(order_id = %order.id(), "messaging task without message type, dequeueing");
            self.dequeue();
            return;
        };

        if !message_needed(order, message) {
            trace!(order_id = %order.id(), ?message, "queued message no longer needed, dequeueing");
            self.dequeue();
        } else {
            debug!(order_id = %order.id(), ?message, "retrying message from queue");
            self.message_stage(order, message);
        }
    }

    fn retry_employee_task(&self, task: &QueueTask) {
        let order = task.order();
        if order.is_added_to_employee_handle() {
            trace!(order_id = %order.id(), "order already with employee handle, dequeueing");
            self.dequeue();
        } else {
            debug!(order_id = %order.id(), "retrying employee handle from queue");
            self.escalate(order);
        }
    }

    /// Remove the head task (spawned, retried).
    pub(crate) fn dequeue(&self) {
        let Some(queue) = self.inner.services.queue.clone() else {
            return;
        };
        let this = self.clone();
        self.spawn("queue-dequeue", move || {
            let mut retry = this.retry(
                |faults: &FaultQueue| {
                    if let Some(err) = faults.pop() {
                        warn!(error = %err, "error in connecting to queue db to dequeue, trying again");
                        return Err(err);
                    }
                    let task = queue.dequeue()?;
                    let _ = this.inner.queue_items.fetch_update(
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        |n| n.checked_sub(1),
                    );
                    trace!(order_id = %task.order().id(), task = task.type_name(), "dequeued task");
                    Ok(())
                },
                |_: &(), err: &ServiceError| debug!(error = %err, "giving up on dequeue"),
            );
            retry.perform(queue.faults(), &());
        });
    }
}

/// Whether the task's stage has already reached the state the task would
/// drive it to.
fn task_settled(task: &QueueTask) -> bool {
    let order = task.order();
    match task.task_type() {
        TaskType::Payment => order.payment_status() != PaymentStatus::Trying,
        TaskType::Messaging => match task.message_type() {
            Some(message) => !message_needed(order, message),
            None => true,
        },
        TaskType::EmployeeDb => order.is_added_to_employee_handle(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_core::{IdAllocator, MessageSent, Order, User};

    fn order() -> Arc<Order> {
        Arc::new(Order::new(
            IdAllocator::in_memory().next_order_id(),
            User::new("Jim", "ABCD"),
            "book",
            10.0,
        ))
    }

    #[test]
    fn payment_task_settles_with_payment() {
        let order = order();
        let task = QueueTask::payment(order.clone());
        assert!(!task_settled(&task));
        order.set_payment_status(PaymentStatus::Done);
        assert!(task_settled(&task));
    }

    #[test]
    fn pending_message_task_settles_after_any_message() {
        let order = order();
        let trying = QueueTask::messaging(order.clone(), MessageType::PaymentTrying);
        let fail = QueueTask::messaging(order.clone(), MessageType::PaymentFail);
        assert!(!task_settled(&trying));

        order.set_message_sent(MessageSent::PaymentTrying);
        assert!(task_settled(&trying));
        assert!(!task_settled(&fail));

        order.set_message_sent(MessageSent::PaymentSuccessful);
        assert!(task_settled(&fail));
    }

    #[test]
    fn employee_task_settles_once_added() {
        let order = order();
        let task = QueueTask::employee_db(order.clone());
        assert!(!task_settled(&task));
        order.mark_added_to_employee_handle();
        assert!(task_settled(&task));
    }
}
