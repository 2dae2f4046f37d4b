//! Computed Implementation
//!
//! A Computed is a cached derived value backed by a lazy [`Watcher`].
//!
//! # How Computed Values Work
//!
//! 1. The watcher starts dirty; nothing runs until the first read.
//!
//! 2. A read evaluates the getter if the watcher is dirty, then caches the
//!    result. Reads of a clean computed return the cache.
//!
//! 3. When any dependency changes the watcher only marks itself dirty. The
//!    getter runs again on the next read, never before.
//!
//! 4. If another watcher is evaluating when the computed is read, every
//!    dependency of the computed is registered on that outer watcher too.
//!    The outer watcher is then notified directly by the underlying state,
//!    which is how a computed that reads a computed stays consistent.

use std::sync::Arc;

use tracing::trace;

use super::runtime::Engine;
use super::value::Value;
use super::watcher::{Watcher, WatcherOptions};

/// User setter for a writable computed.
pub type Setter = Arc<dyn Fn(Value) + Send + Sync>;

/// A cached derived value. Cloning shares the cache.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{Engine, Value};
///
/// let engine = Engine::new();
/// let count = engine.cell(2);
///
/// let c = count.clone();
/// let doubled = engine.computed(move || {
///     Value::from(c.get().as_f64().unwrap_or_default() * 2.0)
/// });
///
/// assert_eq!(doubled.get(), Value::from(4));
/// count.set(5);
/// assert_eq!(doubled.get(), Value::from(10));
/// ```
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
    setter: Option<Setter>,
}

impl Computed {
    /// Read-only computed value.
    pub fn new<G>(engine: &Engine, getter: G) -> Self
    where
        G: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            watcher: Watcher::new(engine, getter, WatcherOptions::computed()),
            setter: None,
        }
    }

    /// Computed value whose writes are forwarded to `setter`.
    pub fn with_setter<G, S>(engine: &Engine, getter: G, setter: S) -> Self
    where
        G: Fn() -> Value + Send + Sync + 'static,
        S: Fn(Value) + Send + Sync + 'static,
    {
        Self {
            watcher: Watcher::new(engine, getter, WatcherOptions::computed()),
            setter: Some(Arc::new(setter)),
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> Value {
        if self.watcher.is_dirty() {
            self.watcher.evaluate();
        }
        if self.watcher.engine().is_tracking() {
            self.watcher.depend();
        }
        self.watcher.value()
    }

    /// Forward `value` to the user setter. Without one this does nothing.
    pub fn set(&self, value: impl Into<Value>) {
        match &self.setter {
            Some(setter) => setter(value.into()),
            None => trace!(
                watcher = self.watcher.id().raw(),
                "write to read-only computed ignored"
            ),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The backing lazy watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher)
            .field("writable", &self.is_writable())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
