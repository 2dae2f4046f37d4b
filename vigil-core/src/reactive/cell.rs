//! A single reactive property that is not part of an observed object.
//!
//! Scopes use cells for meta properties; they are also handy as standalone
//! reactive values in tests and small programs.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::dep::Dep;
use super::runtime::{Engine, WeakEngine};
use super::value::Value;

struct CellInner {
    value: RwLock<Value>,
    dep: Arc<Dep>,
    engine: WeakEngine,
}

/// A standalone reactive value. Cloning shares the cell.
#[derive(Clone)]
pub struct ReactiveCell {
    inner: Arc<CellInner>,
}

impl ReactiveCell {
    /// Create a cell holding `value`, observing it if it is a container.
    pub fn new(engine: &Engine, value: impl Into<Value>) -> Self {
        let value = value.into();
        engine.observe(&value);
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(value),
                dep: Arc::new(Dep::new()),
                engine: engine.downgrade(),
            }),
        }
    }

    /// Read the value, registering dependencies on the active evaluator.
    pub fn get(&self) -> Value {
        let value = self.inner.value.read().clone();
        if let Some(engine) = self.inner.engine.upgrade() {
            self.inner.dep.depend(engine.context());
            engine.depend_on_value(&value);
        }
        value
    }

    /// Read the value without tracking.
    pub fn get_untracked(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Replace the value. Strictly equal writes are ignored.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        {
            let mut current = self.inner.value.write();
            if current.strict_eq(&value) {
                return;
            }
            *current = value.clone();
        }
        if let Some(engine) = self.inner.engine.upgrade() {
            engine.observe(&value);
        }
        trace!(dep = self.inner.dep.id().raw(), "cell set");
        self.inner.dep.notify();
    }

    pub fn dep(&self) -> &Arc<Dep> {
        &self.inner.dep
    }
}

impl std::fmt::Debug for ReactiveCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &self.get_untracked())
            .field("dep", &self.inner.dep)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{MutableSequence, PlainArray};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn cell_get_and_set() {
        let engine = Engine::new();
        let cell = engine.cell(0);
        assert_eq!(cell.get(), Value::from(0));

        cell.set(42);
        assert_eq!(cell.get(), Value::from(42));
    }

    #[test]
    fn cell_notifies_watchers_once_per_change() {
        let engine = Engine::new();
        let cell = engine.cell("a");
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();

        let c = cell.clone();
        let _watcher = engine.watch(
            move || c.get(),
            move |_, _| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        cell.set("b");
        cell.set("b");
        cell.set("c");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cell_holding_an_array_tracks_mutation() {
        let engine = Engine::new();
        let list = PlainArray::new();
        let cell = engine.cell(list.clone());
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let c = cell.clone();
        let _watcher = engine.watch(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                c.get()
            },
            |_, _| {},
        );

        let observed = engine
            .observer_of(&Value::from(list))
            .and_then(|observer| observer.as_array())
            .unwrap();
        observed.push(Value::from(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
