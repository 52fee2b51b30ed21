//! Notification delivery.
//!
//! Every notification, from a variable to its observers or from the store to a watch, goes
//! through a [`Dispatcher`]. Deliveries are queued and then drained in FIFO order. A delivery
//! that causes further notifications (a watch callback writing to the cache, an observer
//! setting another variable) only enqueues them: the round already draining picks them up once
//! the current delivery returns. Re-entrant changes are therefore delivered breadth-first with
//! a bounded stack.
//!
//! Inside [`Dispatcher::batch`] nothing is delivered, and a subscriber already waiting in the
//! queue is not queued again, so each subscriber hears about a batch once.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use crate::locks::lock;

/// Identifies an observer or watch registered with a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A queued notification.
pub type Delivery = Arc<dyn Fn() + Send + Sync>;

/// FIFO notification queue with batching.
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<(SubscriberId, Delivery)>>,
    draining: AtomicBool,
    batch_depth: AtomicUsize,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending_len())
            .field("draining", &self.is_draining())
            .field("batch_depth", &self.batch_depth.load(Ordering::Acquire))
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id; ids increase in registration order.
    pub fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Queue a delivery for `subscriber`. Call [`Dispatcher::flush`] to deliver.
    pub fn enqueue(&self, subscriber: SubscriberId, delivery: Delivery) {
        let mut pending = lock(&self.pending);
        if self.in_batch() && pending.iter().any(|(id, _)| *id == subscriber) {
            tracing::trace!(subscriber = %subscriber, "Notification already queued in batch");
            return;
        }
        pending.push_back((subscriber, delivery));
    }

    /// Deliver everything queued, unless a batch is open or a round is already draining.
    pub fn flush(&self) {
        if self.in_batch() || self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        let _draining = DrainGuard(&self.draining);

        let mut delivered = 0usize;
        loop {
            // The queue lock is released before the delivery runs.
            let next = lock(&self.pending).pop_front();
            let Some((subscriber, delivery)) = next else {
                break;
            };
            tracing::trace!(subscriber = %subscriber, "Delivering notification");
            delivery();
            delivered += 1;
        }
        if delivered > 0 {
            tracing::debug!(delivered, "Notification round complete");
        }
    }

    /// Run `f` with delivery held back, then deliver once per queued subscriber.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.batch_depth.fetch_add(1, Ordering::AcqRel);
        let result = {
            let _batch = BatchGuard(&self.batch_depth);
            f()
        };
        self.flush();
        result
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth.load(Ordering::Acquire) > 0
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct BatchGuard<'a>(&'a AtomicUsize);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
