//! Task queue shared between producers and the executor.
//!
//! Queue order is admission order: the executor always admits the earliest
//! enqueued task that has not been admitted yet. An admitted task's body moves
//! to the executor while its entry stays queued until the task is harvested.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::logging::targets;
use crate::task::{Mark, Task};

enum EntryState {
    /// Waiting for admission.
    Pending(Task),
    /// Cancelled before admission; waiting for the executor to settle it.
    Withdrawn(Task),
    /// Owned by the executor.
    Admitted,
    /// Admitted, with an abort requested by the caller.
    AbortRequested,
    /// Admitted, abort already handed to the executor.
    AbortDelivered,
}

struct Entry {
    mark: Mark,
    state: EntryState,
}

/// Cancellations collected for the executor.
#[derive(Debug, Default)]
pub struct Cancellations {
    /// Tasks withdrawn before admission.
    pub withdrawn: Vec<Task>,
    /// Admitted tasks whose transfers should be aborted.
    pub aborts: Vec<Mark>,
}

impl Cancellations {
    /// Check if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.withdrawn.is_empty() && self.aborts.is_empty()
    }
}

/// An ordered collection of tasks.
#[derive(Default)]
pub struct TaskQueue {
    entries: VecDeque<Entry>,
    /// Number of entries in `Withdrawn` or `AbortRequested` state.
    unsettled: usize,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail.
    pub fn push(&mut self, task: Task) -> Mark {
        let mark = task.mark();
        self.entries.push_back(Entry {
            mark,
            state: EntryState::Pending(task),
        });
        mark
    }

    /// The earliest task not yet admitted.
    pub fn first_unadmitted(&self) -> Option<&Task> {
        self.entries.iter().find_map(|entry| match &entry.state {
            EntryState::Pending(task) => Some(task),
            _ => None,
        })
    }

    /// Check if any task is waiting for admission.
    pub fn has_unadmitted(&self) -> bool {
        self.first_unadmitted().is_some()
    }

    /// Admit the earliest unadmitted task, handing it to the caller.
    ///
    /// The entry stays in the queue until [`remove`](Self::remove) is called.
    pub fn admit_next(&mut self) -> Option<Task> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| matches!(entry.state, EntryState::Pending(_)))?;
        match std::mem::replace(&mut entry.state, EntryState::Admitted) {
            EntryState::Pending(mut task) => {
                task.mark_handled();
                Some(task)
            }
            _ => None,
        }
    }

    /// Remove the entry with the given mark.
    ///
    /// Removing an absent mark is a no-op.
    pub fn remove(&mut self, mark: Mark) {
        let unsettled = &mut self.unsettled;
        self.entries.retain(|entry| {
            if entry.mark != mark {
                return true;
            }
            if matches!(
                entry.state,
                EntryState::Withdrawn(_) | EntryState::AbortRequested
            ) {
                *unsettled -= 1;
            }
            false
        });
    }

    /// Request cancellation of a task.
    ///
    /// A pending task is withdrawn; an admitted task is flagged for abort.
    /// Returns `false` if the mark is unknown or already cancelled.
    pub fn cancel(&mut self, mark: Mark) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.mark == mark) else {
            return false;
        };
        let next = match std::mem::replace(&mut entry.state, EntryState::AbortDelivered) {
            EntryState::Pending(task) => EntryState::Withdrawn(task),
            EntryState::Admitted => EntryState::AbortRequested,
            other => {
                entry.state = other;
                return false;
            }
        };
        entry.state = next;
        self.unsettled += 1;
        true
    }

    /// Check if any cancellation is waiting to be collected.
    pub fn has_cancellations(&self) -> bool {
        self.unsettled > 0
    }

    /// Collect withdrawn tasks and pending abort requests.
    ///
    /// Withdrawn entries leave the queue; aborted entries stay until removed.
    pub fn take_cancellations(&mut self) -> Cancellations {
        let mut cancellations = Cancellations::default();
        if self.unsettled == 0 {
            return cancellations;
        }
        let entries = std::mem::take(&mut self.entries);
        for Entry { mark, state } in entries {
            match state {
                EntryState::Withdrawn(task) => cancellations.withdrawn.push(task),
                EntryState::AbortRequested => {
                    cancellations.aborts.push(mark);
                    self.entries.push_back(Entry {
                        mark,
                        state: EntryState::AbortDelivered,
                    });
                }
                state => self.entries.push_back(Entry { mark, state }),
            }
        }
        self.unsettled = 0;
        cancellations
    }

    /// Remove every entry, returning the tasks that were never admitted.
    pub fn drain(&mut self) -> Vec<Task> {
        self.unsettled = 0;
        self.entries
            .drain(..)
            .filter_map(|entry| match entry.state {
                EntryState::Pending(task) | EntryState::Withdrawn(task) => Some(task),
                _ => None,
            })
            .collect()
    }

    /// Number of entries, admitted or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct SharedState {
    queue: TaskQueue,
    closed: bool,
}

/// A thread-safe [`TaskQueue`] with wake-ups for the executor.
///
/// Every operation takes the same lock. Pushes, cancellations, and closing
/// wake an executor blocked in [`wait_for_work`](Self::wait_for_work).
pub struct SharedTaskQueue {
    inner: Mutex<SharedState>,
    work: Condvar,
}

impl SharedTaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SharedState {
                queue: TaskQueue::new(),
                closed: false,
            }),
            work: Condvar::new(),
        }
    }

    /// Enqueue a task. Returns `None` if the queue has been closed.
    pub fn push(&self, task: Task) -> Option<Mark> {
        let mut state = self.inner.lock();
        if state.closed {
            // The rejected task is dropped after the lock is released.
            drop(state);
            return None;
        }
        let mark = state.queue.push(task);
        let len = state.queue.len();
        drop(state);
        tracing::trace!(target: targets::QUEUE, %mark, len, "task enqueued");
        self.work.notify_one();
        Some(mark)
    }

    pub fn first_unadmitted(&self) -> Option<Mark> {
        self.inner.lock().queue.first_unadmitted().map(Task::mark)
    }

    pub fn has_unadmitted(&self) -> bool {
        self.inner.lock().queue.has_unadmitted()
    }

    pub fn admit_next(&self) -> Option<Task> {
        self.inner.lock().queue.admit_next()
    }

    pub fn remove(&self, mark: Mark) {
        self.inner.lock().queue.remove(mark);
    }

    pub fn cancel(&self, mark: Mark) -> bool {
        let cancelled = self.inner.lock().queue.cancel(mark);
        if cancelled {
            tracing::debug!(target: targets::QUEUE, %mark, "cancellation requested");
            self.work.notify_one();
        }
        cancelled
    }

    pub fn take_cancellations(&self) -> Cancellations {
        self.inner.lock().queue.take_cancellations()
    }

    pub fn drain(&self) -> Vec<Task> {
        self.inner.lock().queue.drain()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Stop accepting tasks and wake the executor.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.work.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Block until there is something to admit or settle, the queue is
    /// closed, or `timeout` elapses.
    pub fn wait_for_work(&self, timeout: Duration) {
        let mut state = self.inner.lock();
        if state.closed || state.queue.has_unadmitted() || state.queue.has_cancellations() {
            return;
        }
        self.work.wait_for(&mut state, timeout);
    }
}

impl Default for SharedTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
