//! Values and Plain Containers
//!
//! Observed state is dynamic: a [`Value`] is null, a boolean, a number, a
//! string, or a shared container. Containers ([`PlainObject`],
//! [`PlainArray`]) are reference types; cloning a `Value` that holds one
//! clones the handle, not the contents, so the same container can be reached
//! from several places in the state tree.
//!
//! Plain containers do no tracking of their own. Reads and writes that
//! should participate in dependency tracking go through the wrappers handed
//! out by [`Engine::observe`](super::Engine::observe).
//!
//! # Equality
//!
//! `PartialEq` on `Value` is strict equality: primitives compare by value
//! (so `NaN != NaN`), containers compare by identity.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

/// Largest integer an `f64` represents exactly.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Identity of a container. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A dynamically typed value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(PlainObject),
    Array(PlainArray),
}

impl Value {
    /// Strict equality: primitives by value, containers by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether this is an object or an array.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PlainObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PlainArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Identity of the container, if this is one.
    pub fn container_id(&self) -> Option<ContainerId> {
        match self {
            Value::Object(o) => Some(o.id()),
            Value::Array(a) => Some(a.id()),
            _ => None,
        }
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    /// Total order used by the default array sort.
    ///
    /// Values of different kinds sort null < bool < number < string < array
    /// < object. Numbers use `f64::total_cmp`; containers sort by identity.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.id().cmp(&b.id()),
            (Value::Object(a), Value::Object(b)) => a.id().cmp(&b.id()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Build a fresh value tree from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Snapshot as JSON. Untracked. A container reached again while it is
    /// still being exported (a cycle) becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut visiting = HashSet::new();
        self.to_json_inner(&mut visiting)
    }

    fn to_json_inner(&self, visiting: &mut HashSet<ContainerId>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(array) => {
                if !visiting.insert(array.id()) {
                    return serde_json::Value::Null;
                }
                let items = array
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(visiting))
                    .collect();
                visiting.remove(&array.id());
                serde_json::Value::Array(items)
            }
            Value::Object(object) => {
                if !visiting.insert(object.id()) {
                    return serde_json::Value::Null;
                }
                let map = object
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(visiting)))
                    .collect();
                visiting.remove(&object.id());
                serde_json::Value::Object(map)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<PlainObject> for Value {
    fn from(o: PlainObject) -> Self {
        Value::Object(o)
    }
}

impl From<PlainArray> for Value {
    fn from(a: PlainArray) -> Self {
        Value::Array(a)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

// ----------------------------------------------------------------------------
// Containers
// ----------------------------------------------------------------------------

/// Flags shared by both container kinds.
#[derive(Default)]
struct Flags {
    frozen: AtomicBool,
    instance_root: AtomicBool,
}

pub(crate) struct ObjectData {
    id: ContainerId,
    flags: Flags,
    pub(crate) entries: RwLock<IndexMap<String, Value>>,
}

pub(crate) struct ArrayData {
    id: ContainerId,
    flags: Flags,
    pub(crate) items: RwLock<Vec<Value>>,
}

/// A shared, insertion-ordered string-keyed map.
#[derive(Clone)]
pub struct PlainObject(pub(crate) Arc<ObjectData>);

/// A shared sequence of values.
#[derive(Clone)]
pub struct PlainArray(pub(crate) Arc<ArrayData>);

impl PlainObject {
    pub fn new() -> Self {
        Self::from_map(IndexMap::new())
    }

    fn from_map(entries: IndexMap<String, Value>) -> Self {
        Self(Arc::new(ObjectData {
            id: ContainerId::next(),
            flags: Flags::default(),
            entries: RwLock::new(entries),
        }))
    }

    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    /// Untracked read.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.entries.read().get(key).cloned()
    }

    /// Untracked write. Returns `false` and leaves the object unchanged if it
    /// is frozen. Writes made this way after the object has been observed do
    /// not notify anyone.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.entries.write().insert(key.into(), value.into());
        true
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.entries.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the object: it can no longer be written or observed.
    pub fn freeze(&self) {
        self.0.flags.frozen.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.flags.frozen.load(AtomicOrdering::SeqCst)
    }

    /// Tag the object as the root of a reactive instance. Tagged objects are
    /// never wrapped by an observer.
    pub fn mark_instance_root(&self) {
        self.0.flags.instance_root.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_instance_root(&self) -> bool {
        self.0.flags.instance_root.load(AtomicOrdering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &PlainObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectData> {
        Arc::downgrade(&self.0)
    }
}

impl Default for PlainObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PlainObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// Containers may be cyclic, so Debug never recurses.
impl fmt::Debug for PlainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainObject")
            .field("id", &self.0.id.0)
            .field("keys", &self.keys())
            .finish()
    }
}

impl PlainArray {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayData {
            id: ContainerId::next(),
            flags: Flags::default(),
            items: RwLock::new(items),
        }))
    }

    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    /// Untracked read.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.read().get(index).cloned()
    }

    /// Untracked append. Returns `false` if the array is frozen.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.items.write().push(value.into());
        true
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn freeze(&self) {
        self.0.flags.frozen.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.flags.frozen.load(AtomicOrdering::SeqCst)
    }

    pub fn mark_instance_root(&self) {
        self.0.flags.instance_root.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_instance_root(&self) -> bool {
        self.0.flags.instance_root.load(AtomicOrdering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &PlainArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayData> {
        Arc::downgrade(&self.0)
    }
}

impl Default for PlainArray {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for PlainArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for PlainArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainArray")
            .field("id", &self.0.id.0)
            .field("len", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
