//! Queue store stub.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use commander_core::{QueueTask, ServiceError, ServiceResult, TaskType};

use crate::fault::FaultQueue;
use crate::gateway::{Faulty, QueueStore};

/// In-memory FIFO of queue tasks.
#[derive(Debug, Default)]
pub struct QueueDatabase {
    tasks: Mutex<VecDeque<Arc<QueueTask>>>,
    added: Mutex<Vec<TaskType>>,
    faults: FaultQueue,
}

impl QueueDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = ServiceError>) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            added: Mutex::new(Vec::new()),
            faults: FaultQueue::seeded(faults),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Type of every task ever added, in order.
    pub fn added_types(&self) -> Vec<TaskType> {
        self.added.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<QueueTask>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Faulty for QueueDatabase {
    fn faults(&self) -> &FaultQueue {
        &self.faults
    }
}

impl QueueStore for QueueDatabase {
    fn add(&self, task: Arc<QueueTask>) -> ServiceResult<()> {
        self.added
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.task_type());
        self.lock().push_back(task);
        Ok(())
    }

    fn peek(&self) -> ServiceResult<Option<Arc<QueueTask>>> {
        Ok(self.lock().front().cloned())
    }

    fn dequeue(&self) -> ServiceResult<Arc<QueueTask>> {
        self.lock().pop_front().ok_or(ServiceError::QueueEmpty)
    }
}
