//! Array Interception
//!
//! Arrays have no per-index dependencies. Every mutation goes through one of
//! the seven operations of [`MutableSequence`]; each delegates to the
//! matching `Vec` behaviour, then observes any inserted elements and
//! notifies the array's shape dependency. Readers of the array (through the
//! key that holds it, or directly through [`ObservedArray::get`]) are
//! therefore notified by any structural change.

use std::cmp::Ordering;

use tracing::trace;

use super::observer::Observer;
use super::value::{PlainArray, Value};

/// The seven mutating sequence operations.
pub trait MutableSequence {
    /// Append `value`. Returns the new length.
    fn push(&self, value: Value) -> usize;

    /// Remove and return the last element.
    fn pop(&self) -> Option<Value>;

    /// Insert `value` at the front. Returns the new length.
    fn unshift(&self, value: Value) -> usize;

    /// Remove and return the first element.
    fn shift(&self) -> Option<Value>;

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Both bounds are clamped to the array. Returns the removed elements.
    fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value>;

    /// Sort in place with `compare`. The comparator runs without any lock
    /// held, so it may read the array. If the array is mutated while the
    /// comparator runs, those mutations are kept and the sort is dropped.
    fn sort_by(&self, compare: &mut dyn FnMut(&Value, &Value) -> Ordering);

    /// Reverse in place.
    fn reverse(&self);
}

/// Tracked view of an observed array.
#[derive(Clone, Debug)]
pub struct ObservedArray {
    observer: Observer,
    array: PlainArray,
}

impl ObservedArray {
    pub(crate) fn new(observer: Observer, array: PlainArray) -> Self {
        Self { observer, array }
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// The underlying container.
    pub fn raw(&self) -> &PlainArray {
        &self.array
    }

    fn depend(&self) {
        if let Some(engine) = self.observer.engine() {
            self.observer.dep().depend(engine.context());
        }
    }

    /// Element at `index`, or `Null`. Registers the shape dependency.
    pub fn get(&self, index: usize) -> Value {
        self.depend();
        self.array.get(index).unwrap_or_default()
    }

    /// Registers the shape dependency.
    pub fn len(&self) -> usize {
        self.depend();
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements. Registers the shape dependency.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend();
        self.array.to_vec()
    }

    /// Position of the first element strictly equal to `value`.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.to_vec().iter().position(|item| item.strict_eq(value))
    }

    /// Append several values with a single notification.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate("extend", move |items| {
            items.extend(values.iter().cloned());
            (items.len(), values)
        })
        .unwrap_or_else(|| self.array.len())
    }

    /// Replace the element at `index`, growing the array with nulls if it
    /// is too short. Returns the previous element, or `None` for an index
    /// no array can reach.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let len = index.checked_add(1)?;
        let value = value.into();
        self.mutate("set", move |items| {
            if index >= items.len() {
                items.resize(len, Value::Null);
            }
            let previous = std::mem::replace(&mut items[index], value.clone());
            (Some(previous), vec![value])
        })
        .flatten()
    }

    /// Remove the first element strictly equal to `value`.
    pub fn remove(&self, value: &Value) -> Option<Value> {
        let index = self.array.to_vec().iter().position(|item| item.strict_eq(value))?;
        self.splice(index, 1, Vec::new()).into_iter().next()
    }

    /// Sort with [`Value::compare`].
    pub fn sort(&self) {
        self.sort_by(&mut |a, b| a.compare(b));
    }

    /// Apply `op` to the elements, then observe what it inserted and notify
    /// the shape dependency. `None` if the array has been frozen.
    fn mutate<R>(
        &self,
        method: &'static str,
        op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>),
    ) -> Option<R> {
        if self.array.is_frozen() {
            return None;
        }

        let (result, inserted) = {
            let mut items = self.array.0.items.write();
            op(&mut *items)
        };

        if let Some(engine) = self.observer.engine() {
            for value in &inserted {
                engine.observe(value);
            }
        }

        trace!(
            container = self.observer.id().raw(),
            method,
            inserted = inserted.len(),
            "array mutation"
        );
        self.observer.dep().notify();
        Some(result)
    }
}

impl MutableSequence for ObservedArray {
    fn push(&self, value: Value) -> usize {
        self.mutate("push", move |items| {
            items.push(value.clone());
            (items.len(), vec![value])
        })
        .unwrap_or_else(|| self.array.len())
    }

    fn pop(&self) -> Option<Value> {
        self.mutate("pop", |items| (items.pop(), Vec::new()))
            .flatten()
    }

    fn unshift(&self, value: Value) -> usize {
        self.mutate("unshift", move |items| {
            items.insert(0, value.clone());
            (items.len(), vec![value])
        })
        .unwrap_or_else(|| self.array.len())
    }

    fn shift(&self) -> Option<Value> {
        self.mutate("shift", |items| {
            let first = (!items.is_empty()).then(|| items.remove(0));
            (first, Vec::new())
        })
        .flatten()
    }

    fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        self.mutate("splice", move |current| {
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            let removed: Vec<Value> = current.splice(start..end, items.iter().cloned()).collect();
            (removed, items)
        })
        .unwrap_or_default()
    }

    fn sort_by(&self, compare: &mut dyn FnMut(&Value, &Value) -> Ordering) {
        if self.array.is_frozen() {
            return;
        }
        let original = self.array.to_vec();
        let mut sorted = original.clone();
        sorted.sort_by(|a, b| compare(a, b));

        let applied = {
            let mut items = self.array.0.items.write();
            let untouched = items.len() == original.len()
                && items.iter().zip(&original).all(|(a, b)| a.strict_eq(b));
            if untouched {
                *items = sorted;
            }
            untouched
        };
        if !applied {
            trace!(
                container = self.observer.id().raw(),
                "array changed during sort, sort dropped"
            );
            return;
        }
        trace!(container = self.observer.id().raw(), method = "sort", "array mutation");
        self.observer.dep().notify();
    }

    fn reverse(&self) {
        self.mutate("reverse", |items| {
            items.reverse();
            ((), Vec::new())
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
