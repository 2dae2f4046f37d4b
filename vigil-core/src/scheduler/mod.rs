//! Update Scheduling
//!
//! When a dependency of an eager watcher changes, the watcher does not run
//! itself. It hands itself to the engine's [`Scheduler`], which decides when
//! the re-run happens. Watchers created with `sync`, and forced shallow
//! updates, bypass the scheduler.
//!
//! Two schedulers ship with the crate:
//!
//! - [`ImmediateScheduler`] runs the watcher on the spot. It is the engine
//!   default and keeps the core fully synchronous.
//! - [`UpdateQueue`] collects watchers and runs each at most once per
//!   batch when [`UpdateQueue::flush`] is called, in creation order.

mod queue;

pub use queue::UpdateQueue;

use crate::reactive::Watcher;

/// Receives eager watchers whose dependencies changed.
pub trait Scheduler: Send + Sync {
    /// Arrange for `watcher` to [`run`](Watcher::run).
    fn schedule(&self, watcher: Watcher);
}

/// Runs every scheduled watcher immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, watcher: Watcher) {
        watcher.run(false);
    }
}
