use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use emb_model::Task;

/// Unbounded FIFO handoff from many producers to the single worker.
///
/// `enqueue` never blocks. Growth is the visible backpressure signal: the
/// depth is exported as a metric rather than capped.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<Task>>,
    ready: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and wake the consumer. Returns the depth after insertion.
    pub fn enqueue(&self, task: Task) -> usize {
        let mut items = self.items.lock();
        items.push_back(task);
        let depth = items.len();
        drop(items);

        self.ready.notify_one();
        depth
    }

    /// Block until a task is available.
    pub fn dequeue(&self) -> Task {
        let mut items = self.items.lock();
        loop {
            if let Some(task) = items.pop_front() {
                return task;
            }
            self.ready.wait(&mut items);
        }
    }

    /// Wait at most `timeout` for a task.
    ///
    /// Returns `None` when the deadline passes with the queue still empty, so the
    /// caller can check its shutdown signal between waits. A timeout too large to
    /// represent as a deadline waits like [`TaskQueue::dequeue`].
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Task> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.dequeue());
        };
        let mut items = self.items.lock();
        loop {
            if let Some(task) = items.pop_front() {
                return Some(task);
            }
            if self.ready.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
