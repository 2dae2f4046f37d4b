//! Observer Implementation
//!
//! An [`Observer`] instruments one container. It owns:
//!
//! - a shape dependency, notified when the container's structure changes
//!   (array mutation, key addition or removal);
//! - for objects, one dependency per key;
//! - the list of scopes that use the container as their root data.
//!
//! Tracked access goes through the typed wrappers [`ObservedObject`] and
//! [`ObservedArray`](super::ObservedArray), obtained with
//! [`Observer::as_object`] and [`Observer::as_array`].
//!
//! # Read and write paths
//!
//! Reading a key while a watcher evaluates registers the key's dependency,
//! the shape dependency of the value if it is an observed container, and the
//! shape dependency of every observed element if it is an array. A watcher
//! that reads `state.items` is thereby notified by `state.items = other`
//! and by `state.items.push(x)` alike.
//!
//! Writing a key is ignored when the new value is strictly equal to the old
//! one. Otherwise the value is stored, observed, and the key's dependency
//! notified.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::array::ObservedArray;
use super::dep::{Dep, DepId};
use super::runtime::{Engine, WeakEngine};
use super::value::{ArrayData, ContainerId, ObjectData, PlainArray, PlainObject, Value};

/// Something that uses an observed container as its root state.
///
/// Owners are told when keys are added to or removed from that container so
/// they can refresh whatever they derive from its key set.
pub trait Owner: Send + Sync {
    /// Stable identity, used for removal.
    fn owner_id(&self) -> u64;

    /// `key` was added to or removed from the owned container.
    fn root_keys_changed(&self, key: &str);
}

enum Target {
    Object(Weak<ObjectData>),
    Array(Weak<ArrayData>),
}

struct OwnerEntry {
    id: u64,
    owner: Weak<dyn Owner>,
}

struct ObserverInner {
    id: ContainerId,
    target: Target,
    dep: Arc<Dep>,
    keys: RwLock<IndexMap<String, Arc<Dep>>>,
    owners: Mutex<Vec<OwnerEntry>>,
    engine: WeakEngine,
}

/// Instrumentation attached to one container. Cloning shares it.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    fn new(id: ContainerId, target: Target, engine: WeakEngine) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                id,
                target,
                dep: Arc::new(Dep::new()),
                keys: RwLock::new(IndexMap::new()),
                owners: Mutex::new(Vec::new()),
                engine,
            }),
        }
    }

    pub(crate) fn for_object(object: &PlainObject, engine: WeakEngine) -> Self {
        Self::new(object.id(), Target::Object(object.downgrade()), engine)
    }

    pub(crate) fn for_array(array: &PlainArray, engine: WeakEngine) -> Self {
        Self::new(array.id(), Target::Array(array.downgrade()), engine)
    }

    /// Convert every key (objects) or element (arrays).
    pub(crate) fn walk(&self, engine: &Engine) {
        match self.value() {
            Some(Value::Object(object)) => {
                for (key, value) in object.entries() {
                    self.key_dep(&key);
                    engine.observe(&value);
                }
            }
            Some(Value::Array(array)) => {
                for item in array.to_vec() {
                    engine.observe(&item);
                }
            }
            _ => {}
        }
    }

    /// Identity of the observed container.
    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    /// The shape dependency.
    pub fn dep(&self) -> &Arc<Dep> {
        &self.inner.dep
    }

    pub fn is_array(&self) -> bool {
        matches!(self.inner.target, Target::Array(_))
    }

    /// Whether the observed container still exists.
    pub fn is_alive(&self) -> bool {
        match &self.inner.target {
            Target::Object(weak) => weak.strong_count() > 0,
            Target::Array(weak) => weak.strong_count() > 0,
        }
    }

    /// The observed container, if it still exists.
    pub fn value(&self) -> Option<Value> {
        match &self.inner.target {
            Target::Object(weak) => weak.upgrade().map(|data| Value::Object(PlainObject(data))),
            Target::Array(weak) => weak.upgrade().map(|data| Value::Array(PlainArray(data))),
        }
    }

    /// Tracked access to an observed object.
    pub fn as_object(&self) -> Option<ObservedObject> {
        match &self.inner.target {
            Target::Object(weak) => weak.upgrade().map(|data| ObservedObject {
                observer: self.clone(),
                object: PlainObject(data),
            }),
            Target::Array(_) => None,
        }
    }

    /// Tracked access to an observed array.
    pub fn as_array(&self) -> Option<ObservedArray> {
        match &self.inner.target {
            Target::Array(weak) => weak
                .upgrade()
                .map(|data| ObservedArray::new(self.clone(), PlainArray(data))),
            Target::Object(_) => None,
        }
    }

    /// Id of the dependency for `key`, if the key has been converted.
    pub fn key_dep_id(&self, key: &str) -> Option<DepId> {
        self.inner.keys.read().get(key).map(|dep| dep.id())
    }

    /// The dependency for `key`, converting the key if needed.
    pub(crate) fn key_dep(&self, key: &str) -> Arc<Dep> {
        if let Some(dep) = self.inner.keys.read().get(key) {
            return dep.clone();
        }
        self.inner
            .keys
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Dep::new()))
            .clone()
    }

    fn remove_key_dep(&self, key: &str) -> Option<Arc<Dep>> {
        self.inner.keys.write().shift_remove(key)
    }

    pub(crate) fn engine(&self) -> Option<Engine> {
        self.inner.engine.upgrade()
    }

    /// Register an owning scope. Registering the same owner twice is a no-op.
    pub fn add_owner(&self, owner: &Arc<dyn Owner>) {
        let id = owner.owner_id();
        let mut owners = self.inner.owners.lock();
        if owners.iter().any(|entry| entry.id == id) {
            return;
        }
        owners.push(OwnerEntry {
            id,
            owner: Arc::downgrade(owner),
        });
    }

    /// Remove an owning scope; no-op if it is not registered.
    pub fn remove_owner(&self, owner_id: u64) {
        self.inner.owners.lock().retain(|entry| entry.id != owner_id);
    }

    /// Ids of the live owners, in registration order.
    pub fn owner_ids(&self) -> Vec<u64> {
        self.inner
            .owners
            .lock()
            .iter()
            .filter(|entry| entry.owner.strong_count() > 0)
            .map(|entry| entry.id)
            .collect()
    }

    fn notify_owners(&self, key: &str) {
        let owners: Vec<Arc<dyn Owner>> = self
            .inner
            .owners
            .lock()
            .iter()
            .filter_map(|entry| entry.owner.upgrade())
            .collect();
        for owner in owners {
            owner.root_keys_changed(key);
        }
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.inner.id.raw())
            .field("array", &self.is_array())
            .field("alive", &self.is_alive())
            .field("keys", &self.inner.keys.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

/// Tracked view of an observed object.
#[derive(Clone, Debug)]
pub struct ObservedObject {
    observer: Observer,
    object: PlainObject,
}

impl ObservedObject {
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// The underlying container.
    pub fn raw(&self) -> &PlainObject {
        &self.object
    }

    /// Read `key`, registering dependencies on the active evaluator.
    ///
    /// A missing key reads as `Null` and registers the shape dependency, so
    /// adding the key later re-runs the reader.
    pub fn get(&self, key: &str) -> Value {
        let value = self.object.get(key);
        if let Some(engine) = self.observer.engine() {
            let context = engine.context();
            if context.is_tracking() {
                match &value {
                    Some(value) => {
                        self.observer.key_dep(key).depend(context);
                        engine.depend_on_value(value);
                    }
                    None => self.observer.dep().depend(context),
                }
            }
        }
        value.unwrap_or_default()
    }

    /// Whether `key` exists. Tracked like [`get`](Self::get).
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key);
        self.object.contains_key(key)
    }

    /// Write `key`.
    ///
    /// Writing a value strictly equal to the current one does nothing.
    /// Writing a new key converts it, notifies the shape dependency and asks
    /// every owner to refresh.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.object.is_frozen() {
            return;
        }

        let existed = {
            let mut entries = self.object.0.entries.write();
            match entries.get_mut(key) {
                Some(current) => {
                    if current.strict_eq(&value) {
                        return;
                    }
                    *current = value.clone();
                    true
                }
                None => {
                    entries.insert(key.to_string(), value.clone());
                    false
                }
            }
        };

        if let Some(engine) = self.observer.engine() {
            engine.observe(&value);
        }

        let dep = self.observer.key_dep(key);
        if existed {
            trace!(container = self.observer.id().raw(), key, "set");
            dep.notify();
        } else {
            trace!(container = self.observer.id().raw(), key, "add key");
            self.observer.dep().notify();
            self.observer.notify_owners(key);
        }
    }

    /// Remove `key`, notifying its readers, the shape dependency and owners.
    pub fn delete(&self, key: &str) -> Option<Value> {
        if self.object.is_frozen() {
            return None;
        }
        let removed = self.object.0.entries.write().shift_remove(key)?;

        trace!(container = self.observer.id().raw(), key, "delete key");
        if let Some(dep) = self.observer.remove_key_dep(key) {
            dep.notify();
        }
        self.observer.dep().notify();
        self.observer.notify_owners(key);
        Some(removed)
    }

    /// Keys in insertion order. Registers the shape dependency.
    pub fn keys(&self) -> Vec<String> {
        self.depend_on_shape();
        self.object.keys()
    }

    /// Number of keys. Registers the shape dependency.
    pub fn len(&self) -> usize {
        self.depend_on_shape();
        self.object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observer of the container stored at `key`.
    pub fn child(&self, key: &str) -> Option<Observer> {
        let value = self.get(key);
        self.observer.engine()?.observer_of(&value)
    }

    pub fn child_object(&self, key: &str) -> Option<ObservedObject> {
        self.child(key)?.as_object()
    }

    pub fn child_array(&self, key: &str) -> Option<ObservedArray> {
        self.child(key)?.as_array()
    }

    fn depend_on_shape(&self) {
        if let Some(engine) = self.observer.engine() {
            self.observer.dep().depend(engine.context());
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
