//! Integration Tests for Bindings
//!
//! Bindings over nested key paths, sets of bindings driving a form, and
//! validation feedback.

use std::sync::{Arc, Mutex};

use tether_core::binding::{
    transformer_with_name, Binding, BindingOptions, BindingSet, GenericTransformer, ValueTransformer,
};
use tether_core::kvo::{ChangeNotification, ChangeType, ClassBuilder, ObservableObject, ObserverId};
use tether_core::{Error, ValidationFailure, Value};

fn recording(
    object: &ObservableObject,
    keypath: &str,
    name: &str,
) -> (Binding, Arc<Mutex<Vec<(ChangeType, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let binding = Binding::new(
        BindingOptions::new(object.clone(), keypath, move |change: &ChangeNotification| {
            seen_clone
                .lock()
                .unwrap()
                .push((change.change_type(), change.new_value().clone()));
        })
        .with_name(name),
    )
    .unwrap();
    (binding, seen)
}

#[test]
fn binding_follows_replaced_intermediate() {
    let window = ObservableObject::new();
    let first = ObservableObject::new();
    first.set_value_for_key("Draft", "title").unwrap();
    window.set_value_for_key(first.clone(), "document").unwrap();

    let (binding, seen) = recording(&window, "document.title", "title");
    binding.bind().unwrap();

    let second = ObservableObject::new();
    second.set_value_for_key("Report", "title").unwrap();
    window.set_value_for_key(second.clone(), "document").unwrap();
    first.set_value_for_key("ignored", "title").unwrap();
    second.set_value_for_key("Final", "title").unwrap();

    let values: Vec<Value> = seen.lock().unwrap().iter().map(|(_, value)| value.clone()).collect();
    assert_eq!(values, vec![Value::from("Report"), Value::from("Final")]);
    assert_eq!(binding.value(), Value::from("Final"));
}

#[test]
fn unbinding_releases_nested_links() {
    let window = ObservableObject::new();
    let document = ObservableObject::new();
    window.set_value_for_key(document.clone(), "document").unwrap();

    let (binding, _) = recording(&window, "document.title", "title");
    binding.bind().unwrap();
    assert_eq!(document.observer_count(), 1);

    binding.unbind();
    binding.unbind();
    assert!(!binding.is_bound());
    assert_eq!(window.observer_count(), 0);
    assert_eq!(document.observer_count(), 0);
}

#[test]
fn write_through_nested_binding() {
    let window = ObservableObject::new();
    let document = ObservableObject::new();
    window.set_value_for_key(document.clone(), "document").unwrap();

    let (binding, seen) = recording(&window, "document.title", "title");
    binding.bind().unwrap();

    assert!(binding.mutable());
    binding.set_value("Typed").unwrap();

    assert_eq!(document.value_for_key("title"), Value::from("Typed"));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn binding_set_drives_a_form() {
    let settings = ObservableObject::new();
    settings.set_value_for_key("dark", "theme").unwrap();
    settings.set_value_for_key(true, "enabled").unwrap();

    let (theme, theme_seen) = recording(&settings, "theme", "theme");
    let (enabled, enabled_seen) = recording(&settings, "enabled", "enabled");

    let mut form = BindingSet::new();
    form.insert(theme);
    form.insert(enabled);
    form.bind_all().unwrap();
    form.update_all();

    assert_eq!(
        *theme_seen.lock().unwrap(),
        vec![(ChangeType::Setting, Value::from("dark"))]
    );
    assert_eq!(
        *enabled_seen.lock().unwrap(),
        vec![(ChangeType::Setting, Value::Bool(true))]
    );

    form.unbind_all();
    settings.set_value_for_key("light", "theme").unwrap();
    assert_eq!(theme_seen.lock().unwrap().len(), 1);
    assert_eq!(settings.observer_count(), 0);
}

#[test]
fn generic_transformer_maps_codes_to_labels() {
    let order = ObservableObject::new();
    order.set_value_for_key(1, "status").unwrap();

    let transformer = GenericTransformer::new(
        vec![Value::from(1), Value::from(2)],
        vec![Value::from("Open"), Value::from("Shipped")],
    )
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let binding = Binding::new(
        BindingOptions::new(order.clone(), "status", move |change| {
            seen_clone.lock().unwrap().push(change.new_value().clone());
        })
        .with_transformer(Arc::new(transformer)),
    )
    .unwrap();
    binding.bind().unwrap();

    assert_eq!(binding.value(), Value::from("Open"));
    order.set_value_for_key(2, "status").unwrap();
    binding.set_value("Open").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Value::from("Shipped")]);
    assert_eq!(order.value_for_key("status"), Value::from(1));
}

/// Shows a temperature stored in Celsius as Fahrenheit.
struct Fahrenheit;

impl ValueTransformer for Fahrenheit {
    fn transformed_value(&self, value: &Value) -> Value {
        match value.as_f64() {
            Some(celsius) => Value::from(celsius * 9.0 / 5.0 + 32.0),
            None => Value::Null,
        }
    }

    fn reverse_transformed_value(&self, value: &Value) -> tether_core::Result<Value> {
        value
            .as_f64()
            .map(|fahrenheit| Value::from((fahrenheit - 32.0) * 5.0 / 9.0))
            .ok_or_else(|| Error::InvalidArgument("temperature must be a number".into()))
    }

    fn can_reverse(&self) -> bool {
        true
    }
}

#[test]
fn custom_reversible_transformer_writes_through() {
    let thermostat = ObservableObject::new();
    thermostat.set_value_for_key(20, "target").unwrap();

    let binding = Binding::new(
        BindingOptions::new(thermostat.clone(), "target", |_| {})
            .with_transformer(Arc::new(Fahrenheit)),
    )
    .unwrap();

    assert!(binding.mutable());
    assert_eq!(binding.value(), Value::from(68));
    binding.set_value(212).unwrap();
    assert_eq!(thermostat.value_for_key("target"), Value::from(100));
}

#[test]
fn unbinding_one_of_two_bindings_sharing_an_observer() {
    let window = ObservableObject::new();
    let document = ObservableObject::new();
    window.set_value_for_key(document.clone(), "document").unwrap();

    let controller = ObserverId::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let make = |name: &'static str| {
        let seen = seen.clone();
        Binding::new(
            BindingOptions::new(window.clone(), "document.title", move |change| {
                seen.lock().unwrap().push((name, change.new_value().clone()));
            })
            .with_observer(controller)
            .with_name(name),
        )
        .unwrap()
    };
    let heading = make("heading");
    let tab = make("tab");
    heading.bind().unwrap();
    tab.bind().unwrap();

    heading.unbind();
    document.set_value_for_key("Notes", "title").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("tab", Value::from("Notes"))]);
    assert!(tab.is_bound());
    assert_eq!(document.observer_count(), 1);
}

#[test]
fn named_transformer_is_resolved() {
    let panel = ObservableObject::new();
    panel.set_value_for_key(false, "visible").unwrap();

    let not = transformer_with_name("Not").unwrap();
    let binding = Binding::new(
        BindingOptions::new(panel.clone(), "visible", |_| {}).with_transformer(not),
    )
    .unwrap();

    assert_eq!(binding.value(), Value::Bool(true));
    assert!(transformer_with_name("nonexistent").is_none());
}

#[test]
fn validation_failure_is_delivered_to_callback() {
    let class = ClassBuilder::new("Person")
        .validator("age", |_, value| match value {
            Value::Number(n) if *n >= 0.0 => Ok(value.clone()),
            _ => Err(ValidationFailure::new("age", "age must be a positive number")),
        })
        .build()
        .unwrap();
    let person = ObservableObject::with_class(class);
    person.set_value_for_key(30, "age").unwrap();
    let form = ObservableObject::new();
    form.set_value_for_key(person.clone(), "person").unwrap();

    let (binding, seen) = recording(&form, "person.age", "age");

    assert_eq!(binding.validate_proposed_value(31), Ok(Value::from(31)));
    let failure = binding.validate_proposed_value(-1).unwrap_err();

    assert_eq!(failure.description, "age must be a positive number");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ChangeType::ValidationError, Value::from(-1))]
    );
    // Validation never writes.
    assert_eq!(person.value_for_key("age"), Value::from(30));
}
