//! Model Instances
//!
//! A [`ModelObject`] is an observable object whose values live in two
//! snapshots: `original`, the hash it was constructed from, and `changes`,
//! the keys written since. A key whose value is written back to its
//! original value drops out of `changes`, so `change_count` counts net
//! changes only.

use std::ops::Deref;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::class::{Field, ModelClass};
use crate::error::{Error, Result};
use crate::kvo::{ArrayChange, Observable, ObservableObject, PropertyStore};
use crate::value::Value;

#[derive(Debug, Default)]
struct Snapshot {
    original: IndexMap<String, Value>,
    changes: IndexMap<String, Value>,
}

/// Per-instance model state, carried as the object's extension.
pub(crate) struct ModelState {
    class: Arc<ModelClass>,
    snapshot: Mutex<Snapshot>,
}

impl ModelState {
    pub(crate) fn new(class: Arc<ModelClass>, original: IndexMap<String, Value>) -> Self {
        Self {
            class,
            snapshot: Mutex::new(Snapshot {
                original,
                changes: IndexMap::new(),
            }),
        }
    }
}

/// Routes keys without accessors into the instance snapshots, so
/// undeclared keys are tracked like declared ones.
pub(crate) struct ModelStore;

impl PropertyStore for ModelStore {
    fn value(&self, object: &ObservableObject, key: &str) -> Value {
        ModelObject::from_object(object)
            .map(|model| model.primitive_value_for_key(key))
            .unwrap_or_default()
    }

    fn set_value(&self, object: &ObservableObject, key: &str, value: Value) -> Result<()> {
        ModelObject::require(object)?.write_primitive(key, value);
        Ok(())
    }

    fn keys(&self, object: &ObservableObject) -> Vec<String> {
        ModelObject::from_object(object)
            .map(|model| model.primitive_keys())
            .unwrap_or_default()
    }
}

/// Whether `value` is exactly `target`, or both are absent.
pub(crate) fn is_same_object(value: &Value, target: &Value) -> bool {
    match (value, target) {
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// An instance of a model.
#[derive(Clone)]
pub struct ModelObject {
    object: ObservableObject,
    state: Arc<ModelState>,
}

impl ModelObject {
    pub(crate) fn instantiate(class: &Arc<ModelClass>, original: IndexMap<String, Value>) -> Self {
        let state = Arc::new(ModelState::new(Arc::clone(class), original));
        let object = ObservableObject::with_extension(Arc::clone(class.object_class()), state.clone());
        Self { object, state }
    }

    /// View `object` as a model instance, if it is one.
    pub fn from_object(object: &ObservableObject) -> Option<ModelObject> {
        object.extension::<ModelState>().map(|state| ModelObject {
            object: object.clone(),
            state,
        })
    }

    pub(crate) fn require(object: &ObservableObject) -> Result<ModelObject> {
        Self::from_object(object)
            .ok_or_else(|| Error::InvalidArgument(format!("object {} is not a model instance", object.uid())))
    }

    pub fn class(&self) -> &Arc<ModelClass> {
        &self.state.class
    }

    pub fn model_name(&self) -> &str {
        self.state.class.name()
    }

    pub fn into_observable(self) -> ObservableObject {
        self.object
    }

    /// The unique id of this instance, read through the id key.
    pub fn id(&self) -> Value {
        self.object.value_for_key(self.state.class.id_key())
    }

    /// The stored value of `key`, bypassing accessors: the pending change
    /// if any, else the original value.
    pub fn primitive_value_for_key(&self, key: &str) -> Value {
        let snapshot = self.state.snapshot.lock();
        snapshot
            .changes
            .get(key)
            .or_else(|| snapshot.original.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Type-check `value` against the declaration of `key` and store it,
    /// bypassing accessors and relation maintenance. Observers are
    /// notified.
    pub fn set_primitive_value_for_key(&self, value: impl Into<Value>, key: &str) -> Result<()> {
        let value = self.state.class.coerce_field(key, value.into())?;
        self.set_primitive_unchecked(key, value);
        Ok(())
    }

    pub(crate) fn set_primitive_unchecked(&self, key: &str, value: Value) {
        self.object.will_change_value_for_key(key);
        self.write_primitive(key, value);
        self.object.did_change_value_for_key(key);
    }

    /// Record `value` as the current value of `key`, without notification.
    pub(crate) fn write_primitive(&self, key: &str, value: Value) {
        let displaced = {
            let mut snapshot = self.state.snapshot.lock();
            let unchanged = snapshot.original.get(key).unwrap_or(&Value::Null) == &value;
            if unchanged {
                snapshot.changes.shift_remove(key)
            } else {
                snapshot.changes.insert(key.to_string(), value)
            }
        };
        drop(displaced);
    }

    /// Replace the stored value of `key` wherever it currently lives,
    /// without touching change tracking or observers. Used to cache lazily
    /// instantiated nested models.
    pub(crate) fn replace_primitive_silently(&self, key: &str, value: Value) {
        let displaced = {
            let mut snapshot = self.state.snapshot.lock();
            if let Some(slot) = snapshot.changes.get_mut(key) {
                Some(std::mem::replace(slot, value))
            } else {
                snapshot.original.insert(key.to_string(), value)
            }
        };
        drop(displaced);
    }

    /// Keys present in either snapshot.
    pub(crate) fn primitive_keys(&self) -> Vec<String> {
        let snapshot = self.state.snapshot.lock();
        let keys: IndexSet<&String> = snapshot.original.keys().chain(snapshot.changes.keys()).collect();
        keys.into_iter().cloned().collect()
    }

    /// True iff the id key is absent from the original snapshot.
    pub fn is_new(&self) -> bool {
        self.state
            .snapshot
            .lock()
            .original
            .get(self.state.class.id_key())
            .map_or(true, Value::is_null)
    }

    pub fn is_updated(&self) -> bool {
        self.change_count() > 0
    }

    /// Number of keys whose value differs from the original.
    pub fn change_count(&self) -> usize {
        self.state.snapshot.lock().changes.len()
    }

    pub fn changes(&self) -> IndexMap<String, Value> {
        self.state.snapshot.lock().changes.clone()
    }

    pub fn original(&self) -> IndexMap<String, Value> {
        self.state.snapshot.lock().original.clone()
    }

    /// Discard every pending change at once. Observers of each changed key
    /// are notified after all of them have been reverted. Relations with
    /// an inverse are reverted on both sides.
    pub fn reset(&self) {
        let keys: Vec<String> = self.state.snapshot.lock().changes.keys().cloned().collect();
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            self.object.will_change_value_for_key(key);
        }
        let reverted: Vec<(String, Value, Value)> = {
            let mut snapshot = self.state.snapshot.lock();
            let discarded = std::mem::take(&mut snapshot.changes);
            discarded
                .into_iter()
                .map(|(key, current)| {
                    let restored = snapshot.original.get(&key).cloned().unwrap_or_default();
                    (key, current, restored)
                })
                .collect()
        };
        for (key, current, restored) in &reverted {
            self.restore_inverse(key, current, restored);
        }
        drop(reverted);
        for key in keys.iter().rev() {
            self.object.did_change_value_for_key(key);
        }
    }

    /// Point the far side of relation `key` back at this instance as the
    /// restored value has it: partners only in `current` let go, partners
    /// only in `restored` are attached again.
    fn restore_inverse(&self, key: &str, current: &Value, restored: &Value) {
        let inverse = match self.state.class.field(key) {
            Some(Field::One(relation)) => relation.inverse.clone(),
            Some(Field::Many(relation)) => relation.inverse.clone(),
            _ => None,
        };
        let Some(inverse) = inverse else {
            return;
        };
        let partners = |value: &Value| match value {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        let current = partners(current);
        let restored = partners(restored);
        let contains = |list: &[Value], item: &Value| list.iter().any(|other| is_same_object(other, item));

        for gone in current.iter().filter(|item| !contains(&restored, item)) {
            if let Some(related) = gone.as_object().and_then(ModelObject::from_object) {
                related.detach_related(&inverse, self);
            }
        }
        for back in restored.iter().filter(|item| !contains(&current, item)) {
            if let Some(related) = back.as_object().and_then(ModelObject::from_object) {
                related.attach_related(&inverse, self);
            }
        }
    }

    /// Render the current values as a JSON hash.
    pub fn to_json(&self) -> serde_json::Value {
        self.object.to_json()
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Items of a to-many key. `Null` reads as empty.
    pub(crate) fn related_items(&self, key: &str) -> Vec<Value> {
        match self.primitive_value_for_key(key) {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    fn to_many_key(&self, key: &str) -> Result<()> {
        match self.state.class.field(key) {
            Some(Field::Many(_)) => Ok(()),
            Some(_) => Err(Error::InvalidArgument(format!(
                "{key} is not a to-many relation of {}",
                self.model_name()
            ))),
            None => Err(Error::UnknownKey {
                model: self.model_name().to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Append `related` to the to-many relation `key`. Adding an instance
    /// that is already related does nothing. The inverse side is updated.
    pub fn add_related(&self, related: &ModelObject, key: &str) -> Result<()> {
        self.to_many_key(key)?;
        let target = Value::Object(related.object.clone());
        let items = self.related_items(key);
        if items.iter().any(|item| is_same_object(item, &target)) {
            return Ok(());
        }
        self.object.insert_object_at_index_for_key(target, items.len(), key)
    }

    /// Remove `related` from the to-many relation `key`. The inverse side
    /// is updated.
    pub fn remove_related(&self, related: &ModelObject, key: &str) -> Result<()> {
        self.to_many_key(key)?;
        let target = Value::Object(related.object.clone());
        match self
            .related_items(key)
            .iter()
            .position(|item| is_same_object(item, &target))
        {
            Some(index) => self.object.remove_object_at_index_for_key(index, key).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Make this side of relation `key` point at `target`, without
    /// maintaining any inverse except clearing a displaced to-one partner.
    pub(crate) fn attach_related(&self, key: &str, target: &ModelObject) {
        let target_value = Value::Object(target.object.clone());
        match self.state.class.field(key) {
            Some(Field::One(relation)) => {
                let previous = self.primitive_value_for_key(key);
                if is_same_object(&previous, &target_value) {
                    return;
                }
                self.set_primitive_unchecked(key, target_value);
                let displaced = previous.as_object().and_then(ModelObject::from_object);
                if let (Some(displaced), Some(back)) = (displaced, relation.inverse.as_deref()) {
                    if !displaced.object.ptr_eq(&self.object) {
                        displaced.detach_related(back, self);
                    }
                }
            }
            Some(Field::Many(_)) => {
                let mut items = self.related_items(key);
                if items.iter().any(|item| is_same_object(item, &target_value)) {
                    return;
                }
                let index = items.len();
                items.push(target_value.clone());
                self.object.will_change_value_for_key(key);
                self.write_primitive(key, Value::Array(items));
                self.object
                    .did_change_array_for_key(key, ArrayChange::insertion(vec![index], vec![target_value]));
            }
            _ => {}
        }
    }

    /// Make this side of relation `key` stop pointing at `target`.
    pub(crate) fn detach_related(&self, key: &str, target: &ModelObject) {
        let target_value = Value::Object(target.object.clone());
        match self.state.class.field(key) {
            Some(Field::One(_)) => {
                if is_same_object(&self.primitive_value_for_key(key), &target_value) {
                    self.set_primitive_unchecked(key, Value::Null);
                }
            }
            Some(Field::Many(_)) => {
                let mut items = self.related_items(key);
                let Some(index) = items.iter().position(|item| is_same_object(item, &target_value)) else {
                    return;
                };
                let removed = items.remove(index);
                self.object.will_change_value_for_key(key);
                self.write_primitive(key, Value::Array(items));
                self.object
                    .did_change_array_for_key(key, ArrayChange::deletion(vec![index], vec![removed]));
            }
            _ => {}
        }
    }
}

impl Deref for ModelObject {
    type Target = ObservableObject;

    fn deref(&self) -> &ObservableObject {
        &self.object
    }
}

impl Observable for ModelObject {
    fn observable(&self) -> &ObservableObject {
        &self.object
    }
}

impl PartialEq for ModelObject {
    fn eq(&self, other: &Self) -> bool {
        self.object.ptr_eq(&other.object)
    }
}

impl Eq for ModelObject {}

impl From<ModelObject> for Value {
    fn from(model: ModelObject) -> Self {
        Value::Object(model.object)
    }
}

impl From<&ModelObject> for Value {
    fn from(model: &ModelObject) -> Self {
        Value::Object(model.object.clone())
    }
}

impl std::fmt::Debug for ModelObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelObject")
            .field("model", &self.model_name())
            .field("uid", &self.object.uid())
            .field("change_count", &self.change_count())
            .finish()
    }
}
