//! Integration Tests for Key-Value Observing
//!
//! These tests verify that key paths, parent links, dependent keys and
//! delivery isolation work together correctly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rstest::rstest;
use tether_core::kvo::{ChangeNotification, ChangeType, ClassBuilder, ObservableObject, ObserverId};
use tether_core::Value;

/// Register a counting observer and return its counter.
fn count_changes(object: &ObservableObject, key_path: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    object
        .add_observer_for_key_path(
            ObserverId::new(),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            key_path,
            None,
        )
        .unwrap();
    calls
}

/// Register an observer that records new values.
fn record_values(object: &ObservableObject, key_path: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    object
        .add_observer_for_key_path(
            ObserverId::new(),
            move |change: &ChangeNotification, _: &str, _: Option<&Value>| {
                seen_clone.lock().unwrap().push(change.new_value().clone());
            },
            key_path,
            None,
        )
        .unwrap();
    seen
}

fn person_class() -> Arc<tether_core::kvo::ObjectClass> {
    ClassBuilder::new("Person")
        .getter("fullName", |person| {
            let first = person.value_for_key("firstName");
            let last = person.value_for_key("lastName");
            Value::from(format!(
                "{} {}",
                first.as_str().unwrap_or(""),
                last.as_str().unwrap_or("")
            ))
        })
        .getter("zebra", |_| Value::from(123))
        .depends_on("fullName", ["firstName", "lastName"])
        .build()
        .unwrap()
}

/// A getter-only key keeps returning its getter's value.
#[test]
fn getter_only_key_ignores_writes() {
    let person = ObservableObject::with_class(person_class());
    let calls = count_changes(&person, "zebra");

    person.set_value_for_key(456, "zebra").unwrap();

    assert_eq!(person.value_for_key("zebra"), Value::from(123));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Changing a trigger notifies observers of the dependent key once.
#[rstest]
#[case("firstName")]
#[case("lastName")]
fn dependent_key_is_notified_once(#[case] trigger: &str) {
    let person = ObservableObject::with_class(person_class());
    person.set_value_for_key("Ada", "firstName").unwrap();
    person.set_value_for_key("Lovelace", "lastName").unwrap();
    let calls = count_changes(&person, "fullName");

    person.set_value_for_key("X", trigger).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// The dependent change carries the recomputed value and the value before
/// the trigger changed.
#[test]
fn dependent_change_has_old_and_new_values() {
    let person = ObservableObject::with_class(person_class());
    person.set_value_for_key("Ada", "firstName").unwrap();
    person.set_value_for_key("Lovelace", "lastName").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    person
        .add_observer_for_key_path(
            ObserverId::new(),
            move |change, _, _| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((change.old_value().clone(), change.new_value().clone()));
            },
            "fullName",
            None,
        )
        .unwrap();

    person.set_value_for_key("Grace", "firstName").unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(Value::from("Ada Lovelace"), Value::from("Grace Lovelace"))]
    );
}

/// Direct observers of the trigger run before observers of dependents.
#[test]
fn dependents_are_notified_after_direct_observers() {
    let person = ObservableObject::with_class(person_class());
    let order = Arc::new(Mutex::new(Vec::new()));

    for key in ["fullName", "firstName"] {
        let order = order.clone();
        person
            .add_observer_for_key_path(
                ObserverId::new(),
                move |_, key_path, _| order.lock().unwrap().push(key_path.to_string()),
                key,
                None,
            )
            .unwrap();
    }

    person.set_value_for_key("Ada", "firstName").unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["firstName", "fullName"]);
}

/// Keys that depend on each other are processed once per mutation.
#[test]
fn mutually_dependent_keys_terminate() {
    let class = ClassBuilder::new("Loop")
        .depends_on("a", ["b"])
        .depends_on("b", ["a"])
        .build()
        .unwrap();
    let object = ObservableObject::with_class(class);
    let a_calls = count_changes(&object, "a");
    let b_calls = count_changes(&object, "b");

    object.set_value_for_key(1, "a").unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(object.info_for_key("a").unwrap().change_count(), 0);
    assert_eq!(object.info_for_key("b").unwrap().change_count(), 0);
}

fn labelled_person_class() -> Arc<tether_core::kvo::ObjectClass> {
    ClassBuilder::new("Person")
        .getter("label", |person| {
            person
                .value_for_key_path("address.city")
                .unwrap_or_default()
        })
        .depends_on("label", ["address.city"])
        .build()
        .unwrap()
}

fn address_in(city: &str) -> ObservableObject {
    let address = ObservableObject::new();
    address.set_value_for_key(city, "city").unwrap();
    address
}

/// Register an observer that records (old, new) pairs.
fn record_pairs(object: &ObservableObject, key_path: &str) -> Arc<Mutex<Vec<(Value, Value)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    object
        .add_observer_for_key_path(
            ObserverId::new(),
            move |change: &ChangeNotification, _: &str, _: Option<&Value>| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((change.old_value().clone(), change.new_value().clone()));
            },
            key_path,
            None,
        )
        .unwrap();
    seen
}

/// A dependency on a nested key path fires when the nested object changes.
#[test]
fn nested_trigger_path_notifies_dependent() {
    let person = ObservableObject::with_class(labelled_person_class());
    let address = address_in("Paris");
    person.set_value_for_key(address.clone(), "address").unwrap();

    let seen = record_values(&person, "label");
    address.set_value_for_key("Lyon", "city").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Value::from("Lyon")]);
}

/// The dependent's old value is the one it had before the nested change.
#[test]
fn nested_trigger_dependent_carries_old_value() {
    let person = ObservableObject::with_class(labelled_person_class());
    let address = address_in("Paris");
    person.set_value_for_key(address.clone(), "address").unwrap();

    let seen = record_pairs(&person, "label");
    address.set_value_for_key("Lyon", "city").unwrap();
    address.set_value_for_key("Nice", "city").unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Value::from("Paris"), Value::from("Lyon")),
            (Value::from("Lyon"), Value::from("Nice")),
        ]
    );
}

/// Replacing the object in the middle of a trigger path changes the
/// dependent too, exactly once.
#[test]
fn replacing_intermediate_notifies_nested_dependent() {
    let person = ObservableObject::with_class(labelled_person_class());
    let paris = address_in("Paris");
    person.set_value_for_key(paris.clone(), "address").unwrap();
    let seen = record_pairs(&person, "label");

    let lyon = address_in("Lyon");
    person.set_value_for_key(lyon.clone(), "address").unwrap();
    assert_eq!(person.value_for_key("label"), Value::from("Lyon"));
    assert_eq!(*seen.lock().unwrap(), vec![(Value::from("Paris"), Value::from("Lyon"))]);

    // Only the new address is followed.
    paris.set_value_for_key("Rome", "city").unwrap();
    lyon.set_value_for_key("Nice", "city").unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Value::from("Paris"), Value::from("Lyon")),
            (Value::from("Lyon"), Value::from("Nice")),
        ]
    );
}

/// Observing a key path links only the objects along that path.
#[test]
fn key_path_observer_leaves_siblings_unlinked() {
    let root = ObservableObject::new();
    let a = ObservableObject::new();
    let b = ObservableObject::new();
    let before = ObservableObject::new();
    a.set_value_for_key(b.clone(), "b").unwrap();
    a.set_value_for_key(before.clone(), "unrelated").unwrap();
    root.set_value_for_key(a.clone(), "a").unwrap();

    let observer = ObserverId::new();
    root.add_observer_for_key_path(observer, |_, _, _| {}, "a.b", None)
        .unwrap();
    let after = ObservableObject::new();
    a.set_value_for_key(after.clone(), "other").unwrap();

    assert_eq!(a.observer_count(), 1);
    assert_eq!(b.observer_count(), 0);
    assert_eq!(before.observer_count(), 0);
    assert_eq!(after.observer_count(), 0);

    // A deeper path links the next level, and only while it is observed.
    let deeper = root
        .add_observer_for_key_path(ObserverId::new(), |_, _, _| {}, "a.b.c", None)
        .unwrap();
    assert_eq!(b.observer_count(), 1);
    assert_eq!(before.observer_count(), 0);

    assert!(root.remove_observer_registration(deeper, "a.b.c"));
    assert_eq!(b.observer_count(), 0);
    assert_eq!(a.observer_count(), 1);

    root.remove_observer_for_key_path(observer, "a.b");
    assert_eq!(a.observer_count(), 0);
}

/// Each mutation reaches a key-path observer exactly once, however many
/// routes lead to it.
#[test]
fn key_path_observer_hears_each_mutation_once() {
    let root = ObservableObject::new();
    let middle = ObservableObject::new();
    let leaf = ObservableObject::new();
    leaf.set_value_for_key(1, "c").unwrap();
    middle.set_value_for_key(leaf.clone(), "b").unwrap();
    root.set_value_for_key(middle.clone(), "a").unwrap();

    // Extra routes: all-properties observers on the root and the middle.
    let _everything = count_changes(&root, "*");
    let _middle_everything = count_changes(&middle, "*");
    let calls = count_changes(&root, "a.b.c");

    leaf.set_value_for_key(2, "c").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let other_leaf = ObservableObject::new();
    other_leaf.set_value_for_key(3, "c").unwrap();
    middle.set_value_for_key(other_leaf.clone(), "b").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let other_middle = ObservableObject::new();
    other_middle.set_value_for_key(leaf.clone(), "b").unwrap();
    root.set_value_for_key(other_middle.clone(), "a").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// The same object held under two keys is observable through both.
#[test]
fn shared_child_forwards_under_each_key() {
    let root = ObservableObject::new();
    let shared = ObservableObject::new();
    root.set_value_for_key(shared.clone(), "left").unwrap();
    root.set_value_for_key(shared.clone(), "right").unwrap();

    let left = count_changes(&root, "left.name");
    let right = count_changes(&root, "right.name");
    shared.set_value_for_key("x", "name").unwrap();

    assert_eq!(left.load(Ordering::SeqCst), 1);
    assert_eq!(right.load(Ordering::SeqCst), 1);
}

/// Replacing an intermediate object delivers one change for the full key
/// path, with values resolved through the new and the old object.
#[test]
fn replacing_intermediate_rewires_key_path() {
    let root = ObservableObject::new();
    let old_child = ObservableObject::new();
    old_child.set_value_for_key("old", "name").unwrap();
    root.set_value_for_key(old_child.clone(), "child").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    root.add_observer_for_key_path(
        ObserverId::new(),
        move |change, key_path, _| {
            seen_clone.lock().unwrap().push((
                key_path.to_string(),
                change.old_value().clone(),
                change.new_value().clone(),
            ));
        },
        "child.name",
        None,
    )
    .unwrap();

    let new_child = ObservableObject::new();
    new_child.set_value_for_key("new", "name").unwrap();
    root.set_value_for_key(new_child.clone(), "child").unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("child.name".to_string(), Value::from("old"), Value::from("new"))]
    );
}

/// A replaced child no longer reports to its former owner.
#[test]
fn replaced_child_sends_no_stale_notifications() {
    let root = ObservableObject::new();
    let old_child = ObservableObject::new();
    root.set_value_for_key(old_child.clone(), "child").unwrap();
    let seen = record_values(&root, "child.name");

    let new_child = ObservableObject::new();
    root.set_value_for_key(new_child.clone(), "child").unwrap();
    seen.lock().unwrap().clear();

    old_child.set_value_for_key("stale", "name").unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(old_child.observer_count(), 0);

    new_child.set_value_for_key("fresh", "name").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Value::from("fresh")]);

    // A non-observable value tears the link down too.
    root.set_value_for_key("plain", "child").unwrap();
    assert_eq!(new_child.observer_count(), 0);
    assert!(root.info_for_key("child").unwrap().parent_link().is_none());
}

/// Reference cycles between objects do not forward forever.
#[test]
fn cyclic_objects_deliver_once() {
    let a = ObservableObject::new();
    let b = ObservableObject::new();
    a.set_value_for_key(b.clone(), "x").unwrap();
    b.set_value_for_key(a.clone(), "y").unwrap();

    let calls = count_changes(&a, "*");
    a.set_value_for_key(1, "k").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    b.set_value_for_key(Value::Null, "y").unwrap();
}

/// The all-properties observer sees every key, including nested ones.
#[test]
fn all_properties_observer_sees_key_paths() {
    let root = ObservableObject::new();
    let child = ObservableObject::new();
    root.set_value_for_key(child.clone(), "child").unwrap();

    let paths = Arc::new(Mutex::new(Vec::new()));
    let paths_clone = paths.clone();
    root.add_observer_for_key_path(
        ObserverId::new(),
        move |_, key_path, _| paths_clone.lock().unwrap().push(key_path.to_string()),
        "*",
        None,
    )
    .unwrap();

    root.set_value_for_key(1, "count").unwrap();
    child.set_value_for_key("x", "name").unwrap();

    assert_eq!(*paths.lock().unwrap(), vec!["count", "child.name"]);
}

/// An observer that writes during delivery completes its own bracket.
#[test]
fn reentrant_writes_keep_brackets_balanced() {
    let object = ObservableObject::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let target = object.downgrade();
    object
        .add_observer_for_key_path(
            ObserverId::new(),
            move |change, _, _| {
                let value = change.new_value().as_f64().unwrap_or(0.0);
                seen_clone.lock().unwrap().push(value);
                if value < 3.0 {
                    if let Some(object) = target.upgrade() {
                        object.set_value_for_key(value + 1.0, "count").unwrap();
                    }
                }
            },
            "count",
            None,
        )
        .unwrap();

    object.set_value_for_key(1, "count").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(object.value_for_key("count"), Value::from(3));
    assert_eq!(object.info_for_key("count").unwrap().change_count(), 0);
}

/// A panicking observer does not keep later observers from running; the
/// panic reaches the caller afterwards.
#[test]
fn panicking_observer_is_isolated() {
    let object = ObservableObject::new();
    let first = count_changes(&object, "name");
    object
        .add_observer_for_key_path(
            ObserverId::new(),
            |_, _, _| panic!("observer failure"),
            "name",
            None,
        )
        .unwrap();
    let third = count_changes(&object, "name");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        object.set_value_for_key("x", "name").unwrap();
    }));

    assert!(outcome.is_err());
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);
    assert_eq!(object.value_for_key("name"), Value::from("x"));
    assert_eq!(object.info_for_key("name").unwrap().change_count(), 0);
}

/// A rejected write notifies nobody and leaves no bracket open.
#[test]
fn rejected_write_is_not_notified() {
    let class = ClassBuilder::new("Strict")
        .accessor(
            "age",
            |object| object.value_for_key("storedAge"),
            |_, value| match value {
                Value::Number(_) => Ok(()),
                _ => Err(tether_core::Error::TypeValidation {
                    key: "age".to_string(),
                }),
            },
        )
        .build()
        .unwrap();
    let object = ObservableObject::with_class(class);
    let calls = count_changes(&object, "age");

    let err = object.set_value_for_key("old", "age").unwrap_err();

    assert_eq!(err.to_string(), "Invalid type for age");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(object.info_for_key("age").unwrap().change_count(), 0);
}

/// Key paths through arrays map over the elements.
#[test]
fn key_path_through_array_collects_values() {
    let team = ObservableObject::new();
    let members: Vec<Value> = ["Ada", "Grace"]
        .into_iter()
        .map(|name| {
            let member = ObservableObject::new();
            member.set_value_for_key(name, "name").unwrap();
            Value::from(member)
        })
        .collect();
    team.set_value_for_key(members, "members").unwrap();

    assert_eq!(
        team.value_for_key_path("members.name").unwrap(),
        Value::Array(vec![Value::from("Ada"), Value::from("Grace")])
    );
}

/// Array mutations carry their type and indexes to key-path observers.
#[test]
fn array_mutation_reaches_key_path_observer() {
    let root = ObservableObject::new();
    let list = ObservableObject::new();
    root.set_value_for_key(list.clone(), "list").unwrap();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let kinds_clone = kinds.clone();
    root.add_observer_for_key_path(
        ObserverId::new(),
        move |change, _, _| kinds_clone.lock().unwrap().push(change.change_type()),
        "list.items",
        None,
    )
    .unwrap();

    list.insert_object_at_index_for_key("a", 0, "items").unwrap();
    list.remove_object_at_index_for_key(0, "items").unwrap();

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![ChangeType::Insertion, ChangeType::Deletion]
    );
}

/// Objects can be shared across threads; delivery happens on the writer's
/// thread.
#[test]
fn objects_are_shared_across_threads() {
    let object = ObservableObject::new();
    let calls = count_changes(&object, "*");

    std::thread::scope(|scope| {
        for value in 0..4 {
            let object = object.clone();
            scope.spawn(move || {
                object
                    .set_value_for_key(value, &format!("slot{value}"))
                    .unwrap()
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(object.keys().len(), 4);
}
