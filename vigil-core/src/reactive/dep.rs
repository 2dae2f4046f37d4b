//! Dependency Implementation
//!
//! A [`Dep`] is the anchor an observed slot hangs its subscribers on. Every
//! object key, every observed container (for shape changes such as array
//! mutation or key addition) and every [`ReactiveCell`](super::ReactiveCell)
//! owns one.
//!
//! # How Dependencies Work
//!
//! 1. While a watcher evaluates, each slot it reads calls [`Dep::depend`].
//!    The dependency proposes itself to the active evaluator, which decides
//!    whether it is new for this evaluation and, if so, calls
//!    [`Dep::add_sub`].
//!
//! 2. When the slot is written, [`Dep::notify`] snapshots the subscriber
//!    list and calls `update` on each entry: lazy subscribers first, then
//!    eager ones, each group in insertion order. The snapshot matters: an
//!    update may re-evaluate a watcher, which adds and removes
//!    subscriptions on this same dependency.
//!
//! # Memory
//!
//! Subscribers are held weakly. Watchers hold their dependencies strongly,
//! so a dropped watcher simply disappears from the lists on the next
//! notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::EvalContext;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a dependency. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct Entry {
    id: SubscriberId,
    subscriber: Weak<dyn Subscriber>,
}

/// A set of watchers interested in one observed slot.
pub struct Dep {
    id: DepId,
    subs: Mutex<SmallVec<[Entry; 4]>>,
}

impl Dep {
    /// Create a dependency with a fresh id and no subscribers.
    pub fn new() -> Self {
        Self {
            id: DepId::next(),
            subs: Mutex::new(SmallVec::new()),
        }
    }

    /// Get the dependency's unique ID.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Subscribe `subscriber`. Adding the same subscriber twice is a no-op.
    pub fn add_sub(&self, subscriber: &Arc<dyn Subscriber>) {
        let id = subscriber.id();
        let mut subs = self.subs.lock();
        if subs.iter().any(|entry| entry.id == id) {
            return;
        }
        subs.push(Entry {
            id,
            subscriber: Arc::downgrade(subscriber),
        });
    }

    /// Unsubscribe the subscriber with the given id, if present.
    pub fn remove_sub(&self, id: SubscriberId) {
        let mut subs = self.subs.lock();
        if let Some(pos) = subs.iter().position(|entry| entry.id == id) {
            subs.remove(pos);
        }
    }

    /// Register this dependency on the active evaluator, if there is one.
    pub fn depend(self: &Arc<Self>, context: &EvalContext) {
        if let Some(target) = context.current() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber that the slot changed.
    pub fn notify(&self) {
        let snapshot: SmallVec<[Weak<dyn Subscriber>; 8]> = {
            let mut subs = self.subs.lock();
            subs.retain(|entry| entry.subscriber.strong_count() > 0);
            subs.iter().map(|entry| entry.subscriber.clone()).collect()
        };

        trace!(dep = self.id.0, subscribers = snapshot.len(), "notify");

        let live: SmallVec<[Arc<dyn Subscriber>; 8]> =
            snapshot.iter().filter_map(|sub| sub.upgrade()).collect();

        // Lazy subscribers first: an eager one re-running in this round must
        // not read a computed value that is not dirty yet.
        for subscriber in live.iter().filter(|sub| sub.is_lazy()) {
            subscriber.update(false);
        }
        for subscriber in live.iter().filter(|sub| !sub.is_lazy()) {
            subscriber.update(false);
        }
    }

    /// Whether `id` is currently subscribed.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subs.lock().iter().any(|entry| entry.id == id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id.0)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
