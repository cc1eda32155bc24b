//! Per-node occurrence queue.
//!
//! The transport pushes [`RawOccurrence`]s; the node pops them. Readers
//! wait on a [`Notify`], registering interest before re-checking the
//! queue so a push between the check and the wait is never missed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use murmur_event::RawOccurrence;
use tokio::sync::Notify;

/// FIFO of occurrences with close semantics.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<RawOccurrence>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RawOccurrence>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an occurrence. Returns `false` if the inbox is closed.
    pub fn push(&self, raw: RawOccurrence) -> bool {
        {
            let mut queue = self.lock();
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            queue.push_back(raw);
        }
        self.notify.notify_waiters();
        true
    }

    /// Removes the oldest occurrence, if any.
    pub fn try_pop(&self) -> Option<RawOccurrence> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// `true` when a pop would not block: something is queued or the
    /// inbox is closed.
    pub fn is_ready(&self) -> bool {
        self.is_closed() || !self.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the inbox and wakes every waiter. Queued occurrences stay
    /// readable.
    pub fn close(&self) {
        {
            let _queue = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
    }

    /// Resolves once [`Inbox::is_ready`] holds.
    pub async fn readable(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}
