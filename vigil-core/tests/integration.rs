//! Integration Tests for the Reactive Engine
//!
//! These tests verify that observers, watchers, computed values and scopes
//! work together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use vigil_core::reactive::{
    Engine, MutableSequence, ObservedObject, PlainArray, PlainObject, Value, Watcher,
    WatcherOptions,
};
use vigil_core::scope::{ComputedDef, Scope};
use vigil_core::{EngineConfig, QueueConfig, UpdateQueue};

fn observed(engine: &Engine, object: PlainObject) -> ObservedObject {
    engine
        .observe(&Value::from(object))
        .and_then(|observer| observer.as_object())
        .unwrap()
}

fn counting_watcher(
    engine: &Engine,
    getter: impl Fn() -> Value + Send + Sync + 'static,
) -> (Watcher, Arc<AtomicI32>) {
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let watcher = Watcher::new(
        engine,
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            getter()
        },
        WatcherOptions::default(),
    );
    (watcher, runs)
}

/// The reference scenario: a watcher on `user.name` reacts to a real change
/// only, and ignores pushes into a sibling array.
#[test]
fn user_name_scenario() {
    let engine = Engine::new();
    let state = observed(
        &engine,
        PlainObject::new()
            .with("user", PlainObject::new().with("name", "Ann"))
            .with("tags", PlainArray::new()),
    );

    let s = state.clone();
    let (watcher, runs) = counting_watcher(&engine, move || {
        s.child_object("user")
            .map(|user| user.get("name"))
            .unwrap_or_default()
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let user = state.child_object("user").unwrap();
    user.set("name", "Bob");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.value(), Value::from("Bob"));

    user.set("name", "Bob");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.child_array("tags").unwrap().push(Value::from("x"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Observing the same container twice yields the same observer and the same
/// per-key dependencies.
#[test]
fn observation_is_idempotent() {
    let engine = Engine::new();
    let data = Value::from(PlainObject::new().with("a", 1).with("b", 2));

    let first = engine.observe(&data).unwrap();
    let second = engine.observe(&data).unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(first.key_dep_id("a"), second.key_dep_id("a"));
    assert_eq!(first.key_dep_id("b"), second.key_dep_id("b"));
}

/// A conditional read that is no longer taken stops notifying.
#[test]
fn dependencies_follow_the_taken_branch() {
    let engine = Engine::new();
    let state = observed(
        &engine,
        PlainObject::new()
            .with("show", true)
            .with("a", "a")
            .with("b", "b"),
    );

    let s = state.clone();
    let (watcher, runs) = counting_watcher(&engine, move || {
        if s.get("show").is_truthy() {
            s.get("a")
        } else {
            s.get("b")
        }
    });

    state.set("show", false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.value(), Value::from("b"));

    state.set("a", "changed");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("b", "changed");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Writing a strictly equal value notifies nobody.
#[test]
fn equal_writes_are_suppressed() {
    let engine = Engine::new();
    let shared = PlainObject::new();
    let state = observed(
        &engine,
        PlainObject::new().with("n", 1).with("obj", shared.clone()),
    );

    let s = state.clone();
    let (_watcher, runs) = counting_watcher(&engine, move || {
        s.get("n");
        s.get("obj")
    });

    state.set("n", 1);
    state.set("obj", shared);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Same content, different identity.
    state.set("obj", PlainObject::new());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Pushing an object observes it, and readers of the array re-run.
#[test]
fn array_push_observes_and_notifies() {
    let engine = Engine::new();
    let state = observed(&engine, PlainObject::new().with("items", PlainArray::new()));

    let s = state.clone();
    let (_watcher, runs) = counting_watcher(&engine, move || s.get("items"));

    let item = PlainObject::new().with("done", false);
    state
        .child_array("items")
        .unwrap()
        .push(Value::from(item.clone()));

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(engine.observer_of(&Value::from(item.clone())).is_some());

    // The array reader also depends on the shape of each element.
    observed(&engine, item).set("note", "added");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// A computed getter runs once until one of its dependencies changes.
#[test]
fn computed_caches_between_changes() {
    let engine = Engine::new();
    let state = observed(&engine, PlainObject::new().with("price", 3).with("qty", 2));
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();

    let s = state.clone();
    let total = engine.computed(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        let price = s.get("price").as_f64().unwrap_or_default();
        let qty = s.get("qty").as_f64().unwrap_or_default();
        Value::from(price * qty)
    });

    assert_eq!(total.get(), Value::from(6));
    assert_eq!(total.get(), Value::from(6));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    state.set("qty", 4);
    state.set("price", 5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(total.get(), Value::from(20));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A watcher that reads a computed's source before the computed itself still
/// sees the recomputed value after a write.
#[test]
fn computed_is_fresh_for_watchers_reading_its_source_first() {
    let engine = Engine::new();
    let state = observed(&engine, PlainObject::new().with("price", 3).with("qty", 2));
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();

    let s = state.clone();
    let total = engine.computed(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        let price = s.get("price").as_f64().unwrap_or_default();
        let qty = s.get("qty").as_f64().unwrap_or_default();
        Value::from(price * qty)
    });

    let (s, t) = (state.clone(), total.clone());
    let (watcher, runs) = counting_watcher(&engine, move || {
        let qty = s.get("qty").as_f64().unwrap_or_default();
        let total = t.get().as_f64().unwrap_or_default();
        Value::from(format!("{qty} -> {total}"))
    });
    assert_eq!(watcher.value(), Value::from("2 -> 6"));

    state.set("qty", 4);
    assert_eq!(watcher.value(), Value::from("4 -> 12"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Cached for readers outside any evaluation.
    assert_eq!(total.get(), Value::from(12));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Reading a computed inside a watcher restores the watcher as the active
/// evaluator, and the watcher inherits the computed's dependencies.
#[test]
fn nested_evaluation_restores_the_evaluator() {
    let engine = Engine::new();
    let state = observed(&engine, PlainObject::new().with("n", 2));

    let s = state.clone();
    let squared = engine.computed(move || {
        let n = s.get("n").as_f64().unwrap_or_default();
        Value::from(n * n)
    });

    let e = engine.clone();
    let sq = squared.clone();
    let (watcher, runs) = counting_watcher(&engine, move || {
        let me = e.current_evaluator();
        assert!(me.is_some());
        let value = sq.get();
        assert_eq!(e.current_evaluator(), me);
        value
    });
    assert_eq!(watcher.value(), Value::from(4));
    assert_eq!(engine.current_evaluator(), None);

    state.set("n", 3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.value(), Value::from(9));
}

/// Engines do not share evaluators or observers.
#[test]
fn engines_are_independent() {
    let a = Engine::new();
    let b = Engine::new();
    let data = Value::from(PlainObject::new().with("x", 1));

    let observer = a.observe(&data).unwrap();
    assert!(b.observer_of(&data).is_none());

    let state = observer.as_object().unwrap();
    let s = state.clone();
    let (_watcher, runs) = counting_watcher(&b, move || s.get("x"));

    // The read happened under engine `b`, which `a`'s observer never sees.
    state.set("x", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Deep watchers see writes anywhere under the watched value.
#[test]
fn deep_watch_sees_nested_changes() {
    let engine = Engine::new();
    let leaf = PlainObject::new().with("v", 1);
    let state = observed(
        &engine,
        PlainObject::new().with(
            "tree",
            PlainObject::new().with("list", PlainArray::from_iter([leaf.clone()])),
        ),
    );
    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();

    let s = state.clone();
    let _watcher = Watcher::with_callback(
        &engine,
        move || s.get("tree"),
        move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatcherOptions::user().with_deep(true),
    );

    observed(&engine, leaf).set("v", 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// JSON state can be loaded, observed and exported again.
#[test]
fn json_state_round_trip() {
    let engine = Engine::new();
    let json = serde_json::json!({
        "title": "todo",
        "items": [{ "text": "a", "done": false }],
    });
    let value = Value::from_json(json);
    let root = engine.observe(&value).unwrap().as_object().unwrap();

    root.child_array("items")
        .unwrap()
        .push(Value::from_json(serde_json::json!({ "text": "b", "done": true })));

    assert_eq!(
        value.to_json(),
        serde_json::json!({
            "title": "todo",
            "items": [
                { "text": "a", "done": false },
                { "text": "b", "done": true },
            ],
        })
    );
}

/// A scope with computed properties, batched through an update queue.
#[test]
fn scope_with_update_queue() {
    let queue = Arc::new(UpdateQueue::new(QueueConfig::default()));
    let engine = Engine::with_scheduler(EngineConfig::default(), queue.clone());
    let scope = Scope::new(
        &engine,
        PlainObject::new()
            .with("todos", PlainArray::new())
            .with("filter", "all"),
    );

    scope
        .define_computed(
            "count",
            ComputedDef::getter(|scope| {
                let todos = scope.get("todos");
                let len = todos.as_array().map(PlainArray::len).unwrap_or_default();
                Value::from(len as f64)
            }),
        )
        .unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    scope
        .watch("count", move |new, _| seen_clone.lock().push(new.clone()))
        .unwrap();

    let todos = scope
        .observed_data()
        .and_then(|data| data.child_array("todos"))
        .unwrap();
    todos.push(Value::from("a"));
    todos.push(Value::from("b"));
    assert!(seen.lock().is_empty());

    assert_eq!(queue.flush(), Ok(1));
    assert_eq!(*seen.lock(), vec![Value::from(2)]);

    scope.destroy();
    todos.push(Value::from("c"));
    assert!(queue.is_empty());
}
