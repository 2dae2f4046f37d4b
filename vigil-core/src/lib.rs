//! Vigil Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Observation of plain objects and arrays (recursive, idempotent)
//! - Per-key and per-container dependency tracking
//! - Eager and lazy (computed) watchers with nested evaluation
//! - Scopes that own root data, computed properties and watchers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: values, dependencies, observers, watchers and the engine
//! - `scheduler`: where eager watcher re-runs are sent
//! - `scope`: the instance/state layer built on top of the engine
//! - `config`, `error`: settings and the crate error type
//!
//! # Example
//!
//! ```rust
//! use vigil_core::reactive::{Engine, MutableSequence, PlainArray, PlainObject, Value};
//!
//! let engine = Engine::new();
//! let state = engine
//!     .observe(&Value::from(
//!         PlainObject::new()
//!             .with("user", PlainObject::new().with("name", "Ann"))
//!             .with("tags", PlainArray::new()),
//!     ))
//!     .and_then(|observer| observer.as_object())
//!     .unwrap();
//!
//! // Re-runs whenever `user.name` changes.
//! let s = state.clone();
//! let name = engine.watch(
//!     move || {
//!         s.child_object("user")
//!             .map(|user| user.get("name"))
//!             .unwrap_or_default()
//!     },
//!     |new, old| println!("{old:?} -> {new:?}"),
//! );
//!
//! state.child_object("user").unwrap().set("name", "Bob");
//! assert_eq!(name.value(), Value::from("Bob"));
//!
//! // Pushing to a sibling key does not touch the name watcher.
//! state.child_array("tags").unwrap().push(Value::from("new"));
//! assert_eq!(name.run_count(), 2);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod scope;

pub use config::{EngineConfig, QueueConfig};
pub use error::{ReactiveError, Result};
pub use reactive::{Computed, Engine, PlainArray, PlainObject, Value, Watcher, WatcherOptions};
pub use scheduler::{ImmediateScheduler, Scheduler, UpdateQueue};
pub use scope::{ComputedDef, Scope};
