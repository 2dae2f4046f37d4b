//! Watcher Implementation
//!
//! A Watcher is one reactive computation: a getter that reads observed
//! state, plus the set of dependencies it touched the last time it ran.
//!
//! # How Watchers Work
//!
//! 1. Evaluation pushes the watcher onto the engine's [`EvalContext`],
//!    runs the getter, and pops it again. Every dependency read in between
//!    calls [`Subscriber::add_dep`] on the watcher.
//!
//! 2. Dependencies are collected into a fresh working set. When the getter
//!    returns, the working set replaces the old one and the watcher
//!    unsubscribes from every dependency it no longer reads. Conditional
//!    reads are therefore dropped as soon as the branch is not taken.
//!
//! 3. When a dependency notifies, the watcher either marks itself dirty
//!    (lazy watchers), runs immediately (`sync`, or a shallow forced
//!    update), or hands itself to the engine's [`Scheduler`].
//!
//! # Lazy vs Eager
//!
//! - Eager watchers evaluate on creation and call their callback with the
//!   new and old value when a re-run produces a different result.
//! - Lazy watchers start dirty and only evaluate when pulled. They back
//!   [`Computed`](super::Computed).
//!
//! # Teardown
//!
//! The engine never unsubscribes a watcher on its own outside evaluation.
//! Consumers call [`Watcher::teardown`] when they are done with it.
//!
//! [`EvalContext`]: super::EvalContext
//! [`Scheduler`]: crate::scheduler::Scheduler

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::dep::{Dep, DepId};
use super::runtime::Engine;
use super::subscriber::{Subscriber, SubscriberId};
use super::value::{ContainerId, Value};

/// Getter evaluated by a watcher.
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Change callback, called with `(new, old)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Per-watcher settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherOptions {
    /// Defer evaluation until the value is pulled.
    pub lazy: bool,
    /// Read every nested key and element of the result.
    pub deep: bool,
    /// Re-run on notification instead of going through the scheduler.
    pub sync: bool,
    /// Created by user code rather than by a binding. Informational only.
    pub user: bool,
}

impl WatcherOptions {
    /// Options for a computed property.
    pub fn computed() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    /// Options for a user watcher.
    pub fn user() -> Self {
        Self {
            user: true,
            ..Self::default()
        }
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

struct WatcherState {
    /// Cached result of the last evaluation.
    value: Value,
    /// Lazy watchers only: the cached value is stale.
    dirty: bool,
    active: bool,
    evaluating: bool,
    deps: IndexMap<DepId, Arc<Dep>>,
    new_deps: IndexMap<DepId, Arc<Dep>>,
    run_count: usize,
}

struct WatcherInner {
    id: SubscriberId,
    engine: Engine,
    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
    state: Mutex<WatcherState>,
    this: Weak<WatcherInner>,
}

/// A reactive computation. Cloning shares the watcher.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{Engine, PlainObject, Value};
///
/// let engine = Engine::new();
/// let state = engine
///     .observe(&Value::from(PlainObject::new().with("count", 1)))
///     .and_then(|observer| observer.as_object())
///     .unwrap();
///
/// let s = state.clone();
/// let watcher = engine.watch(move || s.get("count"), |new, old| {
///     println!("count: {old:?} -> {new:?}");
/// });
///
/// state.set("count", 2);
/// assert_eq!(watcher.value(), Value::from(2));
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher without a change callback.
    pub fn new<G>(engine: &Engine, getter: G, options: WatcherOptions) -> Self
    where
        G: Fn() -> Value + Send + Sync + 'static,
    {
        Self::build(engine, Arc::new(getter), None, options)
    }

    /// Create a watcher that calls `callback(new, old)` on change.
    pub fn with_callback<G, C>(
        engine: &Engine,
        getter: G,
        callback: C,
        options: WatcherOptions,
    ) -> Self
    where
        G: Fn() -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        Self::build(engine, Arc::new(getter), Some(Arc::new(callback)), options)
    }

    pub(crate) fn build(
        engine: &Engine,
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| WatcherInner {
            id: SubscriberId::new(),
            engine: engine.clone(),
            getter,
            callback,
            options,
            state: Mutex::new(WatcherState {
                value: Value::Null,
                dirty: options.lazy,
                active: true,
                evaluating: false,
                deps: IndexMap::new(),
                new_deps: IndexMap::new(),
                run_count: 0,
            }),
            this: this.clone(),
        });

        let watcher = Self { inner };
        if !options.lazy {
            let value = watcher.inner.collect();
            watcher.inner.state.lock().value = value;
        }
        watcher
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn options(&self) -> WatcherOptions {
        self.inner.options
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// The cached value. Lazy watchers may hold a stale value; see
    /// [`is_dirty`](Self::is_dirty).
    pub fn value(&self) -> Value {
        self.inner.state.lock().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// False once torn down.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Number of dependencies held after the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    /// Whether the last evaluation read `dep`.
    pub fn depends_on(&self, dep: DepId) -> bool {
        self.inner.state.lock().deps.contains_key(&dep)
    }

    /// How many times the getter has run.
    pub fn run_count(&self) -> usize {
        self.inner.state.lock().run_count
    }

    /// Run the getter, store the result and clear the dirty flag.
    pub fn evaluate(&self) -> Value {
        self.inner.evaluate()
    }

    /// Re-run an eager watcher and call the callback if the value changed.
    pub fn run(&self, shallow: bool) {
        self.inner.run(shallow);
    }

    /// Entry point for notifications; see [`Subscriber::update`].
    pub fn update(&self, shallow: bool) {
        self.inner.notified(shallow);
    }

    /// Register every dependency of this watcher on the active evaluator.
    pub fn depend(&self) {
        let deps: Vec<Arc<Dep>> = self.inner.state.lock().deps.values().cloned().collect();
        let context = self.inner.engine.context();
        for dep in deps {
            dep.depend(context);
        }
    }

    /// Unsubscribe from every dependency and stop reacting.
    pub fn teardown(&self) {
        let deps = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.new_deps.clear();
            std::mem::take(&mut state.deps)
        };
        for dep in deps.values() {
            dep.remove_sub(self.inner.id);
        }
        debug!(watcher = self.inner.id.raw(), deps = deps.len(), "watcher torn down");
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl WatcherInner {
    fn handle(&self) -> Option<Watcher> {
        self.this.upgrade().map(|inner| Watcher { inner })
    }

    /// Run the getter inside the engine's evaluation context and reconcile
    /// the dependency set.
    fn collect(&self) -> Value {
        let Some(me) = self.this.upgrade() else {
            return Value::Null;
        };
        {
            let mut state = self.state.lock();
            state.new_deps.clear();
            state.evaluating = true;
        }

        let value = {
            let subscriber: Arc<dyn Subscriber> = me;
            let _guard = self.engine.context().enter(subscriber);
            let value = (self.getter)();
            if self.options.deep {
                traverse(&self.engine, &value);
            }
            value
        };

        self.cleanup_deps();
        trace!(watcher = self.id.raw(), "evaluated");
        value
    }

    /// Swap the working set in and unsubscribe from what was not read.
    fn cleanup_deps(&self) {
        let stale: Vec<Arc<Dep>> = {
            let mut state = self.state.lock();
            state.evaluating = false;
            state.run_count += 1;
            let fresh = std::mem::take(&mut state.new_deps);
            let old = std::mem::replace(&mut state.deps, fresh);
            if !state.active {
                // Torn down mid-evaluation: drop everything.
                let mut all: Vec<Arc<Dep>> = old.into_values().collect();
                all.extend(std::mem::take(&mut state.deps).into_values());
                all
            } else {
                old.into_iter()
                    .filter(|(id, _)| !state.deps.contains_key(id))
                    .map(|(_, dep)| dep)
                    .collect()
            }
        };
        for dep in stale {
            dep.remove_sub(self.id);
        }
    }

    fn evaluate(&self) -> Value {
        let value = self.collect();
        let mut state = self.state.lock();
        state.value = value.clone();
        state.dirty = false;
        value
    }

    fn run(&self, shallow: bool) {
        {
            let state = self.state.lock();
            if !state.active || state.evaluating {
                return;
            }
        }

        let value = self.collect();
        let old = {
            let mut state = self.state.lock();
            if !state.active {
                return;
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        let changed = !value.strict_eq(&old)
            || ((value.is_container() || self.options.deep) && !shallow);
        if changed {
            if let Some(callback) = &self.callback {
                callback(&value, &old);
            }
        }
    }

    fn notified(&self, shallow: bool) {
        if self.options.lazy {
            self.state.lock().dirty = true;
            if shallow {
                self.evaluate();
            }
        } else if shallow || self.options.sync {
            self.run(shallow);
        } else if let Some(watcher) = self.handle() {
            self.engine.scheduler().schedule(watcher);
        }
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Arc<Dep>) {
        let subscribe = {
            let mut state = self.state.lock();
            if !state.active || state.new_deps.contains_key(&dep.id()) {
                return;
            }
            state.new_deps.insert(dep.id(), dep.clone());
            !state.deps.contains_key(&dep.id())
        };
        if subscribe {
            if let Some(me) = self.this.upgrade() {
                let me: Arc<dyn Subscriber> = me;
                dep.add_sub(&me);
            }
        }
    }

    fn update(&self, shallow: bool) {
        self.notified(shallow);
    }

    fn is_lazy(&self) -> bool {
        self.options.lazy
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Watcher")
            .field("id", &self.inner.id.raw())
            .field("options", &self.inner.options)
            .field("dirty", &state.dirty)
            .field("active", &state.active)
            .field("deps", &state.deps.len())
            .field("run_count", &state.run_count)
            .finish()
    }
}

/// Read every key and element reachable from `value` so the active
/// evaluator depends on all of it.
fn traverse(engine: &Engine, value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(engine, value, &mut seen);
}

fn traverse_inner(engine: &Engine, value: &Value, seen: &mut HashSet<ContainerId>) {
    let Some(id) = value.container_id() else {
        return;
    };
    if !seen.insert(id) {
        return;
    }
    let Some(observer) = engine.observer_of(value) else {
        return;
    };

    if let Some(object) = observer.as_object() {
        for key in object.keys() {
            let child = object.get(&key);
            traverse_inner(engine, &child, seen);
        }
    } else if let Some(array) = observer.as_array() {
        for item in array.to_vec() {
            traverse_inner(engine, &item, seen);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{MutableSequence, ObservedObject, PlainArray, PlainObject};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn observed(engine: &Engine, object: PlainObject) -> ObservedObject {
        engine
            .observe(&Value::from(object))
            .and_then(|observer| observer.as_object())
            .unwrap()
    }

    #[test]
    fn eager_watcher_runs_on_creation() {
        let engine = Engine::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let watcher = Watcher::new(
            &engine,
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Value::from(1)
            },
            WatcherOptions::default(),
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.run_count(), 1);
        assert!(!watcher.is_dirty());
    }

    #[test]
    fn lazy_watcher_starts_dirty() {
        let engine = Engine::new();
        let watcher = Watcher::new(&engine, || Value::from(7), WatcherOptions::computed());

        assert!(watcher.is_dirty());
        assert_eq!(watcher.run_count(), 0);
        assert_eq!(watcher.evaluate(), Value::from(7));
        assert!(!watcher.is_dirty());
    }

    #[test]
    fn conditional_reads_are_dropped() {
        let engine = Engine::new();
        let state = observed(
            &engine,
            PlainObject::new().with("flag", true).with("a", 1).with("b", 2),
        );
        let observer = state.observer().clone();

        let s = state.clone();
        let watcher = Watcher::new(
            &engine,
            move || {
                if s.get("flag").is_truthy() {
                    s.get("a")
                } else {
                    s.get("b")
                }
            },
            WatcherOptions::default(),
        );
        let a = observer.key_dep_id("a").unwrap();
        let b = observer.key_dep_id("b").unwrap();
        assert!(watcher.depends_on(a));
        assert!(!watcher.depends_on(b));

        state.set("flag", false);
        assert!(!watcher.depends_on(a));
        assert!(watcher.depends_on(b));

        let runs = watcher.run_count();
        state.set("a", 10);
        assert_eq!(watcher.run_count(), runs);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let engine = Engine::new();
        let state = observed(&engine, PlainObject::new().with("a", 1));

        let s = state.clone();
        let watcher = Watcher::new(
            &engine,
            move || {
                s.get("a");
                s.get("a");
                s.get("a")
            },
            WatcherOptions::default(),
        );

        assert_eq!(watcher.dependency_count(), 1);
        assert_eq!(state.observer().key_dep("a").subscriber_count(), 1);
    }

    #[test]
    fn callback_receives_new_and_old() {
        let engine = Engine::new();
        let state = observed(&engine, PlainObject::new().with("n", 1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let s = state.clone();
        let _watcher = Watcher::with_callback(
            &engine,
            move || s.get("n"),
            move |new, old| seen_clone.lock().push((new.clone(), old.clone())),
            WatcherOptions::default(),
        );

        state.set("n", 2);
        state.set("n", 3);
        assert_eq!(
            *seen.lock(),
            vec![
                (Value::from(2), Value::from(1)),
                (Value::from(3), Value::from(2))
            ]
        );
    }

    #[test]
    fn deep_watcher_sees_nested_writes() {
        let engine = Engine::new();
        let inner = PlainObject::new().with("x", 1);
        let state = observed(&engine, PlainObject::new().with("inner", inner.clone()));
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let s = state.clone();
        let _watcher = Watcher::with_callback(
            &engine,
            move || s.get("inner"),
            move |_, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatcherOptions::user().with_deep(true),
        );

        observed(&engine, inner).set("x", 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deep_traversal_handles_cycles() {
        let engine = Engine::new();
        let obj = PlainObject::new();
        obj.insert("me", obj.clone());
        engine.observe(&Value::from(obj.clone()));

        let o = obj.clone();
        let watcher = Watcher::new(
            &engine,
            move || Value::from(o.clone()),
            WatcherOptions::default().with_deep(true),
        );
        // The shape dependency and the `me` key, each once.
        assert_eq!(watcher.dependency_count(), 2);

        watcher.teardown();
        obj.0.entries.write().clear();
    }

    #[test]
    fn teardown_unsubscribes_everything() {
        let engine = Engine::new();
        let state = observed(
            &engine,
            PlainObject::new().with("a", 1).with("list", PlainArray::new()),
        );

        let s = state.clone();
        let watcher = Watcher::new(
            &engine,
            move || {
                s.get("a");
                s.get("list")
            },
            WatcherOptions::default(),
        );
        // `a`, `list`, and the shape of the list itself.
        assert_eq!(watcher.dependency_count(), 3);

        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(watcher.dependency_count(), 0);
        assert_eq!(state.observer().key_dep("a").subscriber_count(), 0);

        state.set("a", 2);
        state.child_array("list").unwrap().push(Value::from(1));
        assert_eq!(watcher.run_count(), 1);
        watcher.teardown();
    }

    #[test]
    fn shallow_update_forces_a_run() {
        let engine = Engine::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let watcher = Watcher::with_callback(
            &engine,
            || Value::from(1),
            move |_, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatcherOptions::default(),
        );

        watcher.update(true);
        assert_eq!(watcher.run_count(), 2);
        // Same primitive value: no callback.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn self_writes_do_not_recurse() {
        let engine = Engine::new();
        let state = observed(&engine, PlainObject::new().with("n", 0));

        let s = state.clone();
        let watcher = Watcher::new(
            &engine,
            move || {
                let n = s.get("n").as_f64().unwrap_or_default();
                s.set("n", n + 1.0);
                Value::from(n)
            },
            WatcherOptions::default().with_sync(true),
        );

        assert_eq!(watcher.run_count(), 1);
        assert_eq!(state.raw().get("n"), Some(Value::from(1)));
    }
}
