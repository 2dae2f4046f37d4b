//! Scopes
//!
//! A [`Scope`] is the state layer a component instance sits on: a root data
//! object, meta properties, computed properties and the watchers created
//! against them. It is the main consumer of the reactive core and the place
//! where watcher lifetimes are managed.
//!
//! # Property lookup
//!
//! [`Scope::get`] looks a name up in the meta properties first, then in the
//! computed properties, then in the root data. All three are tracked reads.
//!
//! # Digest
//!
//! The scope registers itself as an owner of its root data. When a key is
//! added to or removed from that object, or the root data is swapped with
//! [`Scope::set_data`], the scope digests: every watcher it owns receives a
//! forced shallow update. Eager watchers re-run synchronously; lazy
//! (computed) watchers are marked dirty and re-evaluated on the spot.
//!
//! # Ownership
//!
//! Getters bound to a scope hold it weakly, so a scope is dropped once its
//! last handle goes away even if watchers are still alive. Call
//! [`Scope::destroy`] to tear every watcher down explicitly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{ReactiveError, Result};
use crate::reactive::path::{self, Path, Segment};
use crate::reactive::{
    Computed, Engine, ObservedObject, Observer, Owner, PlainObject, ReactiveCell, Value, Watcher,
    WatcherOptions,
};

/// Getter of a computed property.
pub type ScopeGetter = Arc<dyn Fn(&Scope) -> Value + Send + Sync>;

/// Setter of a writable computed property.
pub type ScopeSetter = Arc<dyn Fn(&Scope, Value) + Send + Sync>;

/// Definition of a computed property.
#[derive(Clone)]
pub struct ComputedDef {
    get: ScopeGetter,
    set: Option<ScopeSetter>,
    cache: bool,
}

impl ComputedDef {
    /// Cached, read-only computed property.
    pub fn getter<G>(get: G) -> Self
    where
        G: Fn(&Scope) -> Value + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
            cache: true,
        }
    }

    /// Forward writes to `set`.
    pub fn with_setter<S>(mut self, set: S) -> Self
    where
        S: Fn(&Scope, Value) + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    /// Run the getter on every read instead of caching. The reader depends
    /// directly on whatever the getter touches.
    pub fn uncached(mut self) -> Self {
        self.cache = false;
        self
    }
}

impl std::fmt::Debug for ComputedDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedDef")
            .field("writable", &self.set.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

#[derive(Clone)]
enum Property {
    Cached(Computed),
    Uncached {
        get: ScopeGetter,
        set: Option<ScopeSetter>,
    },
}

struct ScopeInner {
    id: u64,
    engine: Engine,
    data: RwLock<PlainObject>,
    root: RwLock<Option<Observer>>,
    meta: RwLock<IndexMap<String, ReactiveCell>>,
    computed: RwLock<IndexMap<String, Property>>,
    watchers: Mutex<Vec<Watcher>>,
    destroyed: AtomicBool,
    this: Weak<ScopeInner>,
}

impl Owner for ScopeInner {
    fn owner_id(&self) -> u64 {
        self.id
    }

    fn root_keys_changed(&self, key: &str) {
        trace!(scope = self.id, key, "root keys changed");
        if let Some(inner) = self.this.upgrade() {
            Scope { inner }.digest();
        }
    }
}

/// Reactive state of one instance. Cloning shares the scope.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{Engine, PlainObject, Value};
/// use vigil_core::scope::{ComputedDef, Scope};
///
/// let engine = Engine::new();
/// let scope = Scope::new(&engine, PlainObject::new().with("first", "Ann"));
/// scope
///     .define_computed(
///         "greeting",
///         ComputedDef::getter(|scope| {
///             let first = scope.get("first");
///             Value::from(format!("Hi {}", first.as_str().unwrap_or_default()))
///         }),
///     )
///     .unwrap();
///
/// assert_eq!(scope.get("greeting"), Value::from("Hi Ann"));
/// scope.set("first", "Bob");
/// assert_eq!(scope.get("greeting"), Value::from("Hi Bob"));
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a scope over `data`, observing it with the scope as owner.
    pub fn new(engine: &Engine, data: PlainObject) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let inner = Arc::new_cyclic(|this| ScopeInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            engine: engine.clone(),
            data: RwLock::new(data.clone()),
            root: RwLock::new(None),
            meta: RwLock::new(IndexMap::new()),
            computed: RwLock::new(IndexMap::new()),
            watchers: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            this: this.clone(),
        });

        let scope = Self { inner };
        let root = engine.observe_with_owner(&Value::from(data), &scope.as_owner());
        *scope.inner.root.write() = root;
        debug!(scope = scope.inner.id, "scope created");
        scope
    }

    fn as_owner(&self) -> Arc<dyn Owner> {
        self.inner.clone()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// The current root data object.
    pub fn data(&self) -> PlainObject {
        self.inner.data.read().clone()
    }

    /// Tracked access to the root data, if it is observable.
    pub fn observed_data(&self) -> Option<ObservedObject> {
        self.inner.root.read().as_ref()?.as_object()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ReactiveError::ScopeDestroyed(self.inner.id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Read a meta, computed or data property. Unknown names read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        let cell = self.inner.meta.read().get(key).cloned();
        if let Some(cell) = cell {
            return cell.get();
        }

        let property = self.inner.computed.read().get(key).cloned();
        if let Some(property) = property {
            return match property {
                Property::Cached(computed) => computed.get(),
                Property::Uncached { get, .. } => get(self),
            };
        }

        match self.observed_data() {
            Some(data) => data.get(key),
            None => self.data().get(key).unwrap_or_default(),
        }
    }

    /// Write a meta, computed or data property.
    ///
    /// Writing an unknown name adds it to the root data, which digests the
    /// scope.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();

        let cell = self.inner.meta.read().get(key).cloned();
        if let Some(cell) = cell {
            cell.set(value);
            return;
        }

        let property = self.inner.computed.read().get(key).cloned();
        if let Some(property) = property {
            match property {
                Property::Cached(computed) => computed.set(value),
                Property::Uncached { set: Some(set), .. } => set(self, value),
                Property::Uncached { set: None, .. } => {
                    trace!(scope = self.inner.id, key, "write to read-only computed ignored");
                }
            }
            return;
        }

        match self.observed_data() {
            Some(data) => data.set(key, value),
            None => {
                self.data().insert(key, value);
            }
        }
    }

    /// Remove `key` from the root data.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.observed_data()?.delete(key)
    }

    /// Tracked read of a path expression such as `user.tags[0]`. The first
    /// segment is looked up like [`get`](Self::get).
    pub fn get_path(&self, expr: &str) -> Result<Value> {
        let path = Path::parse(expr)?;
        Ok(self.read_path(&path))
    }

    fn read_path(&self, path: &Path) -> Value {
        match path.segments().split_first() {
            Some((Segment::Key(key), rest)) => {
                let head = self.get(key);
                path::resolve(&self.inner.engine, head, rest)
            }
            _ => Value::Null,
        }
    }

    /// Define a reactive meta property that lives outside the root data.
    pub fn define_meta(&self, key: &str, value: impl Into<Value>) -> Result<ReactiveCell> {
        self.ensure_alive()?;
        self.ensure_free(key)?;
        let cell = self.inner.engine.cell(value);
        self.inner.meta.write().insert(key.to_string(), cell.clone());
        Ok(cell)
    }

    /// Define a computed property.
    pub fn define_computed(&self, key: &str, def: ComputedDef) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_free(key)?;

        let property = if def.cache {
            let getter = self.bind(def.get.clone());
            let computed = match def.set.clone() {
                Some(set) => {
                    let weak = Arc::downgrade(&self.inner);
                    Computed::with_setter(&self.inner.engine, getter, move |value| {
                        if let Some(inner) = weak.upgrade() {
                            set(&Scope { inner }, value);
                        }
                    })
                }
                None => Computed::new(&self.inner.engine, getter),
            };
            self.inner.watchers.lock().push(computed.watcher().clone());
            Property::Cached(computed)
        } else {
            Property::Uncached {
                get: def.get,
                set: def.set,
            }
        };

        self.inner.computed.write().insert(key.to_string(), property);
        Ok(())
    }

    fn ensure_free(&self, key: &str) -> Result<()> {
        if self.inner.meta.read().contains_key(key) || self.inner.computed.read().contains_key(key)
        {
            return Err(ReactiveError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    /// Wrap a scope getter into a plain getter that holds the scope weakly.
    fn bind(&self, get: ScopeGetter) -> impl Fn() -> Value + Send + Sync + 'static {
        let weak = Arc::downgrade(&self.inner);
        move || match weak.upgrade() {
            Some(inner) => get(&Scope { inner }),
            None => Value::Null,
        }
    }

    // ------------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------------

    /// Watch a path expression and call `callback(new, old)` when it changes.
    pub fn watch<C>(&self, expr: &str, callback: C) -> Result<Watcher>
    where
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.watch_with(expr, callback, WatcherOptions::user())
    }

    /// Like [`watch`](Self::watch), with explicit options.
    pub fn watch_with<C>(&self, expr: &str, callback: C, options: WatcherOptions) -> Result<Watcher>
    where
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        let path = Path::parse(expr)?;
        let getter: ScopeGetter = Arc::new(move |scope: &Scope| scope.read_path(&path));
        Ok(self.register(getter, callback, options))
    }

    /// Watch the result of a closure over the scope.
    pub fn watch_fn<G, C>(&self, getter: G, callback: C, options: WatcherOptions) -> Result<Watcher>
    where
        G: Fn(&Scope) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.ensure_alive()?;
        Ok(self.register(Arc::new(getter), callback, options))
    }

    fn register<C>(&self, getter: ScopeGetter, callback: C, options: WatcherOptions) -> Watcher
    where
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let watcher =
            Watcher::with_callback(&self.inner.engine, self.bind(getter), callback, options);
        self.inner.watchers.lock().push(watcher.clone());
        watcher
    }

    /// Number of live watchers owned by the scope, computed ones included.
    pub fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .lock()
            .iter()
            .filter(|watcher| watcher.is_active())
            .count()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Replace the root data object.
    ///
    /// The scope stops owning the old object, observes the new one with
    /// itself as owner, and digests so every watcher re-reads from the new
    /// data.
    pub fn set_data(&self, data: PlainObject) -> Result<()> {
        self.ensure_alive()?;

        if let Some(old) = self.inner.root.write().take() {
            old.remove_owner(self.inner.id);
        }
        *self.inner.data.write() = data.clone();
        let root = self
            .inner
            .engine
            .observe_with_owner(&Value::from(data), &self.as_owner());
        *self.inner.root.write() = root;

        debug!(scope = self.inner.id, "root data replaced");
        self.digest();
        Ok(())
    }

    /// Force a shallow update of every watcher owned by the scope.
    pub fn digest(&self) {
        if self.is_destroyed() {
            return;
        }
        let watchers: Vec<Watcher> = self.inner.watchers.lock().clone();
        trace!(scope = self.inner.id, watchers = watchers.len(), "digest");
        for watcher in watchers {
            watcher.update(true);
        }
    }

    /// Tear down every watcher and release the root data. Further watcher
    /// creation fails with [`ReactiveError::ScopeDestroyed`].
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let watchers = std::mem::take(&mut *self.inner.watchers.lock());
        for watcher in &watchers {
            watcher.teardown();
        }
        if let Some(root) = self.inner.root.write().take() {
            root.remove_owner(self.inner.id);
        }
        self.inner.computed.write().clear();
        self.inner.meta.write().clear();

        debug!(scope = self.inner.id, watchers = watchers.len(), "scope destroyed");
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("data", &self.data())
            .field("meta", &self.inner.meta.read().keys().collect::<Vec<_>>())
            .field("computed", &self.inner.computed.read().keys().collect::<Vec<_>>())
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
