//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a [`Dep`] can notify. In practice that is a
//! [`Watcher`](super::Watcher), but dependencies only talk to the trait so the
//! bookkeeping can be tested in isolation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Dep;

/// Unique identifier for a subscriber.
///
/// Ids are handed out in creation order, so sorting by id runs parents
/// before the watchers they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that depends on observed state.
pub trait Subscriber: Send + Sync {
    /// The subscriber's unique id.
    fn id(&self) -> SubscriberId;

    /// Record `dep` as touched during the current evaluation.
    ///
    /// Called by [`Dep::depend`] while this subscriber is the active
    /// evaluator. Implementations decide whether the dependency is new.
    fn add_dep(&self, dep: &Arc<Dep>);

    /// One of the subscriber's dependencies changed.
    ///
    /// `shallow` asks for an immediate forced re-run that bypasses any
    /// scheduler.
    fn update(&self, shallow: bool);

    /// Whether an update only marks the subscriber stale. Lazy subscribers
    /// are notified before eager ones.
    fn is_lazy(&self) -> bool {
        false
    }
}
