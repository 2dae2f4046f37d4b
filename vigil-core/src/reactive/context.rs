//! Evaluation Context
//!
//! The evaluation context tracks which watcher is currently running its
//! getter. When an observed property is read, its dependency asks the
//! context for the active evaluator and registers itself there.
//!
//! # Implementation
//!
//! Each [`Engine`](super::Engine) owns one stack. Entering an evaluation
//! pushes the watcher; the returned guard pops it on drop, including during
//! unwinding. Nested evaluation (a watcher reading a computed value that has
//! to recompute) therefore always restores the caller as the active
//! evaluator.
//!
//! A frame may also be empty: [`EvalContext::untracked`] pushes one to hide
//! the outer evaluator from reads that should not create dependencies.

use std::sync::Arc;

use parking_lot::Mutex;

use super::subscriber::{Subscriber, SubscriberId};

/// An entry in the evaluation stack.
struct Frame {
    /// `None` for untracked sections.
    subscriber: Option<Arc<dyn Subscriber>>,
}

/// Stack of active evaluators, owned by one engine.
#[derive(Default)]
pub struct EvalContext {
    stack: Mutex<Vec<Frame>>,
}

/// Guard that pops the evaluator when dropped.
pub struct ContextGuard<'a> {
    context: &'a EvalContext,
    subscriber_id: Option<SubscriberId>,
}

impl EvalContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subscriber` the active evaluator until the guard drops.
    pub fn enter(&self, subscriber: Arc<dyn Subscriber>) -> ContextGuard<'_> {
        let subscriber_id = Some(subscriber.id());
        self.stack.lock().push(Frame {
            subscriber: Some(subscriber),
        });
        ContextGuard {
            context: self,
            subscriber_id,
        }
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.stack.lock().push(Frame { subscriber: None });
        let _guard = ContextGuard {
            context: self,
            subscriber_id: None,
        };
        f()
    }

    /// The active evaluator, if reads are currently being tracked.
    pub fn current(&self) -> Option<Arc<dyn Subscriber>> {
        self.stack
            .lock()
            .last()
            .and_then(|frame| frame.subscriber.clone())
    }

    /// Id of the active evaluator.
    pub fn current_id(&self) -> Option<SubscriberId> {
        self.stack
            .lock()
            .last()
            .and_then(|frame| frame.subscriber.as_ref().map(|s| s.id()))
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.stack
            .lock()
            .last()
            .is_some_and(|frame| frame.subscriber.is_some())
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.lock().pop();

        // A mismatch means a guard outlived the frame above it.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.subscriber.as_ref().map(|s| s.id()),
                self.subscriber_id,
                "EvalContext mismatch: expected {:?}",
                self.subscriber_id,
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
