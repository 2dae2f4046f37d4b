//! Error types.
//!
//! The engine core never fails: non-observable values are skipped and
//! redundant writes are ignored. Errors only come from the edges that parse
//! user input or manage scopes and queues.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Errors raised by the consumer-facing layers of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A path expression such as `user.tags[0]` could not be parsed.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The expression as given.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A computed or meta property with this name already exists.
    #[error("property `{0}` is already defined on this scope")]
    DuplicateKey(String),

    /// The scope was destroyed and can no longer create watchers.
    #[error("scope {0} has been destroyed")]
    ScopeDestroyed(u64),

    /// A watcher kept re-queueing itself during a single flush.
    #[error("watcher {watcher:?} ran {runs} times in one flush; possible infinite update loop")]
    CircularUpdate {
        /// The offending watcher.
        watcher: SubscriberId,
        /// How many times it ran before the queue gave up.
        runs: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
