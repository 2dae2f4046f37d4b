//! Update Queue
//!
//! A deduplicating batch scheduler.
//!
//! # Algorithm
//!
//! 1. `schedule` inserts the watcher keyed by id; a watcher already pending
//!    is not added twice.
//! 2. `flush` drains the pending set, sorts it by watcher id (creation
//!    order, so parents run before the watchers they created) and runs each
//!    watcher that has not been torn down.
//! 3. Watchers scheduled while a batch runs form the next batch. Flushing
//!    stops when a batch comes back empty.
//! 4. A watcher that runs more than `max_update_count` times in one flush is
//!    reported as a circular update and the queue is cleared.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Scheduler;
use crate::config::QueueConfig;
use crate::error::{ReactiveError, Result};
use crate::reactive::{SubscriberId, Watcher};

/// Batches eager re-runs until [`flush`](Self::flush).
pub struct UpdateQueue {
    config: QueueConfig,
    pending: Mutex<IndexMap<SubscriberId, Watcher>>,
}

impl UpdateQueue {
    /// Create an empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(IndexMap::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of pending watchers.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop every pending watcher without running it.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Run pending watchers until none are left. Returns how many runs
    /// happened.
    pub fn flush(&self) -> Result<usize> {
        let mut counts: HashMap<SubscriberId, usize> = HashMap::new();
        let mut total = 0;

        loop {
            let mut batch: Vec<Watcher> = {
                let mut pending = self.pending.lock();
                pending.drain(..).map(|(_, watcher)| watcher).collect()
            };
            if batch.is_empty() {
                break;
            }
            batch.sort_by_key(Watcher::id);

            for watcher in batch {
                if !watcher.is_active() {
                    continue;
                }
                let runs = counts.entry(watcher.id()).or_insert(0);
                *runs += 1;
                if *runs > self.config.max_update_count {
                    let runs = *runs;
                    warn!(
                        watcher = watcher.id().raw(),
                        runs, "possible infinite update loop, clearing queue"
                    );
                    self.clear();
                    return Err(ReactiveError::CircularUpdate {
                        watcher: watcher.id(),
                        runs,
                    });
                }
                watcher.run(false);
                total += 1;
            }
        }

        if total > 0 {
            debug!(runs = total, "flushed update queue");
        }
        Ok(total)
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl Scheduler for UpdateQueue {
    fn schedule(&self, watcher: Watcher) {
        self.pending.lock().entry(watcher.id()).or_insert(watcher);
    }
}

impl std::fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("config", &self.config)
            .field("pending", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
