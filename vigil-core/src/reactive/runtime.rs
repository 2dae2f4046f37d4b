//! Reactive Runtime
//!
//! The [`Engine`] is the coordinator that ties dependencies, observers and
//! watchers together. Each engine owns:
//!
//! - an [`EvalContext`]: the stack of active evaluators;
//! - the observer registry: container identity → [`Observer`];
//! - the [`Scheduler`] eager watchers hand their re-runs to.
//!
//! Engines are independent. Two engines in the same thread never see each
//! other's evaluators or observers, which keeps tests isolated.
//!
//! # The Registry
//!
//! Observation is idempotent: observing a container that already has an
//! observer returns that observer. The registry is keyed by
//! [`ContainerId`] and observers only hold their container weakly, so the
//! registry never keeps state alive. Entries for dropped containers are
//! swept every [`EngineConfig::sweep_interval`] new observers, or on demand
//! with [`Engine::collect_garbage`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use super::cell::ReactiveCell;
use super::computed::Computed;
use super::context::EvalContext;
use super::observer::{Observer, Owner};
use super::path::{self, Path};
use super::subscriber::SubscriberId;
use super::value::{ContainerId, Value};
use super::watcher::{Watcher, WatcherOptions};
use crate::config::EngineConfig;
use crate::scheduler::{ImmediateScheduler, Scheduler};

pub(crate) struct EngineShared {
    context: EvalContext,
    registry: DashMap<ContainerId, Observer>,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
    created: AtomicUsize,
}

/// Handle to a reactive engine. Cloning shares the engine.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

/// Non-owning engine handle, held by observers and cells.
#[derive(Clone)]
pub(crate) struct WeakEngine(Weak<EngineShared>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<Engine> {
        self.0.upgrade().map(|shared| Engine { shared })
    }
}

impl Engine {
    /// Engine with default configuration; eager watchers re-run
    /// immediately when notified.
    pub fn new() -> Self {
        Self::with_scheduler(EngineConfig::default(), Arc::new(ImmediateScheduler))
    }

    /// Engine with custom configuration and the immediate scheduler.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_scheduler(config, Arc::new(ImmediateScheduler))
    }

    /// Engine that hands eager re-runs to `scheduler`.
    pub fn with_scheduler(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                context: EvalContext::new(),
                registry: DashMap::new(),
                scheduler,
                config,
                created: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine(Arc::downgrade(&self.shared))
    }

    /// The engine's evaluator stack.
    pub fn context(&self) -> &EvalContext {
        &self.shared.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.shared.scheduler
    }

    /// Whether a read right now would be recorded as a dependency.
    pub fn is_tracking(&self) -> bool {
        self.shared.context.is_tracking()
    }

    /// Id of the watcher currently evaluating, if any.
    pub fn current_evaluator(&self) -> Option<SubscriberId> {
        self.shared.context.current_id()
    }

    /// Run `f` without recording dependencies.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.shared.context.untracked(f)
    }

    /// Start tracking `value`.
    ///
    /// Returns the existing observer if the container is already observed,
    /// a new one if it is an unfrozen object or array that is not an
    /// instance root, and `None` otherwise.
    pub fn observe(&self, value: &Value) -> Option<Observer> {
        self.resolve(value)
    }

    /// Like [`observe`](Self::observe), also registering `owner` on the
    /// resolved observer.
    pub fn observe_with_owner(&self, value: &Value, owner: &Arc<dyn Owner>) -> Option<Observer> {
        let observer = self.resolve(value)?;
        observer.add_owner(owner);
        Some(observer)
    }

    /// The observer for `value`, without creating one.
    pub fn observer_of(&self, value: &Value) -> Option<Observer> {
        let id = value.container_id()?;
        self.shared.registry.get(&id).map(|entry| entry.value().clone())
    }

    fn resolve(&self, value: &Value) -> Option<Observer> {
        if let Some(existing) = self.observer_of(value) {
            return Some(existing);
        }

        let observer = match value {
            Value::Object(object) if !object.is_frozen() && !object.is_instance_root() => {
                Observer::for_object(object, self.downgrade())
            }
            Value::Array(array) if !array.is_frozen() && !array.is_instance_root() => {
                Observer::for_array(array, self.downgrade())
            }
            _ => return None,
        };

        // Register before walking so cyclic data terminates.
        self.shared.registry.insert(observer.id(), observer.clone());
        debug!(
            container = observer.id().raw(),
            array = observer.is_array(),
            "observing container"
        );
        observer.walk(self);

        self.maybe_sweep();
        Some(observer)
    }

    fn maybe_sweep(&self) {
        let interval = self.shared.config.sweep_interval;
        if interval == 0 {
            return;
        }
        let created = self.shared.created.fetch_add(1, Ordering::Relaxed) + 1;
        if created % interval == 0 {
            self.collect_garbage();
        }
    }

    /// Drop registry entries whose container no longer exists. Returns how
    /// many were removed.
    pub fn collect_garbage(&self) -> usize {
        let before = self.shared.registry.len();
        self.shared.registry.retain(|_, observer| observer.is_alive());
        let removed = before.saturating_sub(self.shared.registry.len());
        if removed > 0 {
            debug!(removed, "swept observer registry");
        }
        removed
    }

    /// Number of observers in the registry.
    pub fn observer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Register the dependencies that come with reading `value` from a
    /// reactive slot: the container's shape dependency and, for arrays, the
    /// shape dependency of every observed element.
    pub(crate) fn depend_on_value(&self, value: &Value) {
        let context = &self.shared.context;
        if !context.is_tracking() {
            return;
        }
        if let Some(child) = self.observer_of(value) {
            child.dep().depend(context);
        }
        if let Value::Array(array) = value {
            for item in array.to_vec() {
                if let Some(observer) = self.observer_of(&item) {
                    observer.dep().depend(context);
                }
            }
        }
    }

    /// Tracked read of `path` starting at `root`.
    pub fn read_path(&self, root: &Value, path: &Path) -> Value {
        path::resolve(self, root.clone(), path.segments())
    }

    /// Eager watcher that calls `callback(new, old)` when `getter`'s result
    /// changes.
    pub fn watch<G, C>(&self, getter: G, callback: C) -> Watcher
    where
        G: Fn() -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        Watcher::with_callback(self, getter, callback, WatcherOptions::default())
    }

    /// Cached derivation of `getter`.
    pub fn computed<G>(&self, getter: G) -> Computed
    where
        G: Fn() -> Value + Send + Sync + 'static,
    {
        Computed::new(self, getter)
    }

    /// Standalone reactive property.
    pub fn cell(&self, value: impl Into<Value>) -> ReactiveCell {
        ReactiveCell::new(self, value)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("observers", &self.observer_count())
            .field("depth", &self.shared.context.depth())
            .field("config", &self.shared.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
