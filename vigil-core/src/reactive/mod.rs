//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: dependencies,
//! observers and watchers, tied together by an [`Engine`].
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dep`] stands for one observable slot: a key of an object, or the
//! shape of an object or array. It keeps the list of watchers that read the
//! slot and notifies them when it changes.
//!
//! ## Observers
//!
//! An [`Observer`] is attached to each plain container the engine tracks.
//! Reads and writes go through [`ObservedObject`] and [`ObservedArray`],
//! which register and notify the right dependencies. Nested containers are
//! observed recursively, and observing a container twice returns the same
//! observer.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter while installed as the active evaluator,
//! records every dependency touched, and re-evaluates (or, if lazy, marks
//! itself dirty) when one of them changes. [`Computed`] wraps a lazy watcher
//! as a cached derived value.
//!
//! # Implementation Notes
//!
//! The active evaluator is the top of the engine's [`EvalContext`] stack.
//! Nested evaluations push and pop in strict call order, so a computed value
//! read inside another watcher always hands control back to its caller.

mod array;
mod cell;
mod computed;
mod context;
mod dep;
mod observer;
pub(crate) mod path;
mod runtime;
mod subscriber;
mod value;
mod watcher;

pub use array::{MutableSequence, ObservedArray};
pub use cell::ReactiveCell;
pub use computed::{Computed, Setter};
pub use context::{ContextGuard, EvalContext};
pub use dep::{Dep, DepId};
pub use observer::{ObservedObject, Observer, Owner};
pub use path::{Path, Segment};
pub use runtime::Engine;
pub use subscriber::{Subscriber, SubscriberId};
pub use value::{ContainerId, PlainArray, PlainObject, Value, MAX_SAFE_INTEGER};
pub use watcher::{Callback, Getter, Watcher, WatcherOptions};
