//! Observable Objects
//!
//! [`ObservableObject`] is the object every view, controller and model
//! builds on. It provides key-value coding (`value_for_key`,
//! `set_value_for_key` and their key-path forms), observer registration,
//! and change notification.
//!
//! # How Notifications Flow
//!
//! 1. A write goes through `set_value_for_key`, which brackets the mutation
//!    with `will_change_value_for_key` / `did_change_value_for_key`.
//!
//! 2. When the outermost bracket closes, a [`ChangeNotification`] is built
//!    and delivered by `notify_observers_of_change_for_key_path`:
//!    a. observers of exactly that key path, in registration order
//!    b. observers of longer paths through the key, each with a derived
//!       notification resolved through the new and old values
//!    c. all-properties observers
//!    d. the parent links of every object holding this one
//!
//! 3. Parent links forward the notification to the owner under
//!    `owner_key.key_path`, and the owner repeats step 2.
//!
//! 4. Dependent keys opened by the bracket are closed last, so their
//!    observers hear about the change after the trigger's observers.
//!    Dependents of a key-path trigger are notified when the forwarded
//!    change reaches the owner.
//!
//! # Parent Links
//!
//! An owner links only the keys whose values something actually looks
//! into: a longer observed key path, an all-properties observer, a
//! key-path trigger of a dependent key, or the same need on an owner
//! further up.
//!
//! # Reentrancy
//!
//! No lock is held while getters, setters or observer callbacks run. An
//! observer that mutates an object completes its own bracket before the
//! outer delivery continues.
//!
//! # Observer Failures
//!
//! Each callback runs under `catch_unwind`. A panicking observer is
//! logged, the remaining observers (and the dependent-key cascade) still
//! run, and the first panic is resumed once delivery has finished.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::change::{ChangeNotification, ChangeType};
use super::class::ObjectClass;
use super::descriptor::{InstalledLink, ParentLink, PropertyDescriptor};
use super::keypath::{self, KeyPath, ALL_PROPERTIES};
use super::observer::{ObserverEntry, ObserverFn, ObserverId, ObserverRegistry, RegistrationId};
use crate::error::{Error, Result, ValidationFailure};
use crate::value::Value;

/// Counter for generating unique object uids.
static OBJECT_UID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_object_uid() -> u64 {
    OBJECT_UID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct ObjectInner {
    uid: u64,
    class: Arc<ObjectClass>,

    /// Values of keys without accessors, when the class has no store.
    storage: Mutex<IndexMap<String, Value>>,

    /// Descriptors, created on first access.
    descriptors: Mutex<IndexMap<String, Arc<PropertyDescriptor>>>,

    observers: Mutex<ObserverRegistry>,

    /// Typed per-instance state owned by a layer built on top (models).
    extension: Option<Arc<dyn Any + Send + Sync>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let links: Vec<InstalledLink> = self
            .descriptors
            .get_mut()
            .values()
            .filter_map(|info| info.replace_link(None))
            .collect();
        for installed in links {
            if let Some(child) = installed.child.upgrade() {
                child.detach_parent_link(installed.link.observer);
            }
        }
    }
}

/// An array-shaped mutation, delivered as an insertion, deletion or
/// replacement notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChange {
    change_type: ChangeType,
    indexes: Vec<usize>,
    new_values: Vec<Value>,
    old_values: Vec<Value>,
}

impl ArrayChange {
    pub fn insertion(indexes: Vec<usize>, inserted: Vec<Value>) -> Self {
        Self {
            change_type: ChangeType::Insertion,
            indexes,
            new_values: inserted,
            old_values: Vec::new(),
        }
    }

    pub fn deletion(indexes: Vec<usize>, removed: Vec<Value>) -> Self {
        Self {
            change_type: ChangeType::Deletion,
            indexes,
            new_values: Vec::new(),
            old_values: removed,
        }
    }

    pub fn replacement(indexes: Vec<usize>, new_values: Vec<Value>, old_values: Vec<Value>) -> Self {
        Self {
            change_type: ChangeType::Replacement,
            indexes,
            new_values,
            old_values,
        }
    }
}

/// Holds the first panic raised while delivering a change so delivery can
/// continue and the panic can be resumed afterwards.
#[derive(Default)]
struct DeferredPanic(Option<Box<dyn Any + Send + 'static>>);

impl DeferredPanic {
    fn run(&mut self, f: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            self.0.get_or_insert(payload);
        }
    }

    fn deliver(&mut self, entries: &[Arc<ObserverEntry>], change: &ChangeNotification, key_path: &str) {
        for entry in entries {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                entry.observe(change, key_path);
            }));
            if let Err(payload) = outcome {
                error!(
                    observer = entry.observer().raw(),
                    key_path,
                    "observer panicked while handling a change"
                );
                self.0.get_or_insert(payload);
            }
        }
    }

    fn resume(self) {
        if let Some(payload) = self.0 {
            panic::resume_unwind(payload);
        }
    }
}

/// Takes an owner off a change's forwarding route, also when delivery on
/// the owner unwinds.
struct RouteGuard<'a> {
    change: &'a ChangeNotification,
    uid: u64,
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        self.change.leave_route(self.uid);
    }
}

/// A shared handle to an observable object.
///
/// Cloning the handle does not copy the object. Equality is identity.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Arc<ObjectInner>,
}

/// A non-owning handle to an observable object.
#[derive(Clone, Default)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<ObservableObject> {
        self.inner.upgrade().map(|inner| ObservableObject { inner })
    }
}

impl std::fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakObject({})", object.uid()),
            None => write!(f, "WeakObject(<dropped>)"),
        }
    }
}

impl Default for ObservableObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableObject {
    /// Create a plain object: no accessors, direct property storage.
    pub fn new() -> Self {
        Self::with_class(ObjectClass::plain())
    }

    /// Create an instance of `class`.
    pub fn with_class(class: Arc<ObjectClass>) -> Self {
        Self::build(class, IndexMap::new(), None)
    }

    /// Create an instance of `class` carrying typed per-instance state.
    pub fn with_extension(class: Arc<ObjectClass>, extension: Arc<dyn Any + Send + Sync>) -> Self {
        Self::build(class, IndexMap::new(), Some(extension))
    }

    /// Create a plain object whose storage starts out with `hash`.
    pub fn from_hash(hash: IndexMap<String, Value>) -> Self {
        Self::build(ObjectClass::plain(), hash, None)
    }

    fn build(
        class: Arc<ObjectClass>,
        storage: IndexMap<String, Value>,
        extension: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                uid: next_object_uid(),
                class,
                storage: Mutex::new(storage),
                descriptors: Mutex::new(IndexMap::new()),
                observers: Mutex::new(ObserverRegistry::default()),
                extension,
            }),
        }
    }

    /// Process-unique identity of this object.
    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn class(&self) -> &Arc<ObjectClass> {
        &self.inner.class
    }

    /// The typed extension state, if it is a `T`.
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.extension.clone()?.downcast::<T>().ok()
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &ObservableObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn stored_value(&self, key: &str) -> Value {
        self.inner
            .storage
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn store_value(&self, key: &str, value: Value) {
        // The replaced value may be the last handle to another object; let
        // it drop after the lock is released.
        let previous = self.inner.storage.lock().insert(key.to_string(), value);
        drop(previous);
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// The descriptor for `key`, created on first access.
    ///
    /// Returns `None` for the all-properties sentinel and the empty key.
    pub fn info_for_key(&self, key: &str) -> Option<Arc<PropertyDescriptor>> {
        if key.is_empty() || key == ALL_PROPERTIES {
            return None;
        }
        if let Some(info) = self.inner.descriptors.lock().get(key) {
            return Some(Arc::clone(info));
        }

        let accessors = self
            .inner
            .class
            .accessors(key)
            .cloned()
            .unwrap_or_default();
        let info = Arc::new(PropertyDescriptor::new(
            key,
            accessors,
            self.inner.class.store().cloned(),
        ));
        trace!(object = self.uid(), key, mutable = info.is_mutable(), "created descriptor");

        Some(Arc::clone(
            self.inner
                .descriptors
                .lock()
                .entry(key.to_string())
                .or_insert(info),
        ))
    }

    /// The descriptor for the last key of `path` on the object that owns
    /// it. `None` when an intermediate object is missing.
    pub fn info_for_key_path(&self, path: &str) -> Option<Arc<PropertyDescriptor>> {
        let path = KeyPath::parse(path).ok()?;
        if path.is_simple() {
            return self.info_for_key(path.last());
        }
        match Value::Object(self.clone()).resolve_path(path.owner_segments().iter().copied())? {
            Value::Object(owner) => owner.info_for_key(path.last()),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Key-value coding
    // ------------------------------------------------------------------

    /// Read a key. Absent keys read as `Null`.
    pub fn value_for_key(&self, key: &str) -> Value {
        let Some(info) = self.info_for_key(key) else {
            return Value::Null;
        };
        let value = info.get(self);
        self.sync_child_link(&info, &value);
        value
    }

    /// Write a key, notifying observers.
    ///
    /// Writes to immutable keys are ignored. Errors come only from
    /// setters that reject the value; in that case nothing is written and
    /// nothing is notified.
    pub fn set_value_for_key(&self, value: impl Into<Value>, key: &str) -> Result<()> {
        if key.is_empty() || key == ALL_PROPERTIES {
            return Err(Error::InvalidArgument(format!("cannot set key {key:?}")));
        }
        let Some(info) = self.info_for_key(key) else {
            return Ok(());
        };
        if !info.is_mutable() {
            debug!(object = self.uid(), key, "ignoring write to immutable key");
            return Ok(());
        }

        self.will_change_value_for_key(key);
        if let Err(err) = info.set(self, value.into()) {
            self.abort_change_for_key(key);
            return Err(err);
        }
        self.did_change_value_for_key(key);
        Ok(())
    }

    /// Read a dot-separated key path. A missing intermediate object yields
    /// `Null`.
    pub fn value_for_key_path(&self, path: &str) -> Result<Value> {
        let path = KeyPath::parse(path)?;
        Ok(Value::Object(self.clone())
            .resolve_path(path.segments().iter().copied())
            .unwrap_or_default())
    }

    /// Write through a key path. Silently does nothing when an
    /// intermediate object is missing.
    pub fn set_value_for_key_path(&self, value: impl Into<Value>, path: &str) -> Result<()> {
        let key_path = KeyPath::parse(path)?;
        if key_path.is_simple() {
            return self.set_value_for_key(value, path);
        }
        match Value::Object(self.clone()).resolve_path(key_path.owner_segments().iter().copied()) {
            Some(Value::Object(owner)) => owner.set_value_for_key(value, key_path.last()),
            _ => {
                debug!(object = self.uid(), path, "no owner for key path; write ignored");
                Ok(())
            }
        }
    }

    /// Run the advisory validator of `key` against a proposed value.
    pub fn validate_value_for_key(
        &self,
        value: &Value,
        key: &str,
    ) -> std::result::Result<Value, ValidationFailure> {
        match self.info_for_key(key) {
            Some(info) => info.validate(self, value),
            None => Err(ValidationFailure::new(key, "not a valid key")),
        }
    }

    /// Every key known to hold a value: declared accessor keys followed by
    /// stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: IndexSet<String> = self
            .inner
            .class
            .declared_keys()
            .map(str::to_string)
            .collect();
        match self.inner.class.store() {
            Some(store) => keys.extend(store.keys(self)),
            None => keys.extend(self.inner.storage.lock().keys().cloned()),
        }
        keys.into_iter().collect()
    }

    /// Render the object as a JSON hash of its keys.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_guarded(&mut HashSet::new())
    }

    pub(crate) fn to_json_guarded(&self, visiting: &mut HashSet<u64>) -> serde_json::Value {
        if !visiting.insert(self.uid()) {
            return serde_json::Value::Null;
        }
        let mut map = serde_json::Map::new();
        for key in self.keys() {
            let value = self.value_for_key(&key);
            map.insert(key, value.to_json_guarded(visiting));
        }
        visiting.remove(&self.uid());
        serde_json::Value::Object(map)
    }

    // ------------------------------------------------------------------
    // Array mutation
    // ------------------------------------------------------------------

    fn array_for_mutation(&self, key: &str) -> Result<Option<(Arc<PropertyDescriptor>, Vec<Value>)>> {
        let Some(info) = self.info_for_key(key) else {
            return Err(Error::InvalidArgument(format!("cannot mutate key {key:?}")));
        };
        if !info.is_mutable() {
            debug!(object = self.uid(), key, "ignoring array mutation of immutable key");
            return Ok(None);
        }
        match info.get(self) {
            Value::Array(items) => Ok(Some((info, items))),
            Value::Null => Ok(Some((info, Vec::new()))),
            other => Err(Error::InvalidArgument(format!(
                "{key} holds a {}, not an array",
                other.type_name()
            ))),
        }
    }

    fn commit_array(
        &self,
        info: &PropertyDescriptor,
        key: &str,
        items: Vec<Value>,
        change: ArrayChange,
    ) -> Result<()> {
        self.will_change_value_for_key(key);
        if let Err(err) = info.set(self, Value::Array(items)) {
            self.abort_change_for_key(key);
            return Err(err);
        }
        self.did_change_array_for_key(key, change);
        Ok(())
    }

    /// Insert into the array held by `key`, delivering an insertion.
    pub fn insert_object_at_index_for_key(
        &self,
        value: impl Into<Value>,
        index: usize,
        key: &str,
    ) -> Result<()> {
        let Some((info, mut items)) = self.array_for_mutation(key)? else {
            return Ok(());
        };
        if index > items.len() {
            return Err(Error::InvalidArgument(format!(
                "insertion index {index} out of bounds for {key} (length {})",
                items.len()
            )));
        }
        let value = value.into();
        items.insert(index, value.clone());
        self.commit_array(&info, key, items, ArrayChange::insertion(vec![index], vec![value]))
    }

    /// Remove from the array held by `key`, delivering a deletion.
    /// Returns the removed element.
    pub fn remove_object_at_index_for_key(&self, index: usize, key: &str) -> Result<Value> {
        let Some((info, mut items)) = self.array_for_mutation(key)? else {
            return Ok(Value::Null);
        };
        if index >= items.len() {
            return Err(Error::InvalidArgument(format!(
                "removal index {index} out of bounds for {key} (length {})",
                items.len()
            )));
        }
        let removed = items.remove(index);
        self.commit_array(&info, key, items, ArrayChange::deletion(vec![index], vec![removed.clone()]))?;
        Ok(removed)
    }

    /// Replace an element of the array held by `key`, delivering a
    /// replacement. Returns the previous element.
    pub fn replace_object_at_index_for_key(
        &self,
        value: impl Into<Value>,
        index: usize,
        key: &str,
    ) -> Result<Value> {
        let Some((info, mut items)) = self.array_for_mutation(key)? else {
            return Ok(Value::Null);
        };
        if index >= items.len() {
            return Err(Error::InvalidArgument(format!(
                "replacement index {index} out of bounds for {key} (length {})",
                items.len()
            )));
        }
        let value = value.into();
        let previous = std::mem::replace(&mut items[index], value.clone());
        self.commit_array(
            &info,
            key,
            items,
            ArrayChange::replacement(vec![index], vec![value], vec![previous.clone()]),
        )?;
        Ok(previous)
    }

    // ------------------------------------------------------------------
    // Change bracketing
    // ------------------------------------------------------------------

    /// Open a change bracket for `key`.
    ///
    /// The first call captures the current value. Dependent keys that are
    /// not already pending are opened too and closed by the matching
    /// `did_change_value_for_key`. That includes keys depending on a key
    /// path through `key`, since replacing the value replaces the path.
    pub fn will_change_value_for_key(&self, key: &str) {
        let Some(info) = self.info_for_key(key) else {
            return;
        };
        if !info.begin_change() {
            return;
        }
        let prior = info.get(self);

        let mut opened = Vec::new();
        let class = Arc::clone(&self.inner.class);
        for dependent in class.dependencies().dependents_through(key) {
            let pending = self
                .info_for_key(&dependent)
                .map(|dep| dep.change_count() > 0)
                .unwrap_or(true);
            if !pending {
                self.will_change_value_for_key(&dependent);
                opened.push(dependent);
            }
        }
        info.record_pending(prior, opened);
    }

    /// Close a change bracket for `key`, delivering a setting notification
    /// when it was the outermost one.
    pub fn did_change_value_for_key(&self, key: &str) {
        self.finish_change(key, None);
    }

    /// Close a change bracket for `key` describing an array mutation.
    pub fn did_change_array_for_key(&self, key: &str, change: ArrayChange) {
        self.finish_change(key, Some(change));
    }

    fn finish_change(&self, key: &str, array: Option<ArrayChange>) {
        let Some(info) = self.info_for_key(key) else {
            return;
        };
        let Some(pending) = info.end_change() else {
            return;
        };

        let new_value = self.value_for_key(key);
        if self.inner.class.dependencies().has_nested_triggers(key) {
            info.remember(new_value.clone());
        }
        let change = match array {
            None => ChangeNotification::new(self.clone(), ChangeType::Setting, new_value, pending.prior),
            Some(array) => ChangeNotification::new(
                self.clone(),
                array.change_type,
                Value::Array(array.new_values),
                Value::Array(array.old_values),
            )
            .with_indexes(array.indexes),
        };

        let mut panics = DeferredPanic::default();
        panics.run(|| self.notify_observers_of_change_for_key_path(&change, key));
        for dependent in pending.opened_dependents {
            panics.run(|| self.did_change_value_for_key(&dependent));
        }
        panics.resume();
    }

    /// Close a bracket without notifying, after a rejected write.
    fn abort_change_for_key(&self, key: &str) {
        let Some(info) = self.info_for_key(key) else {
            return;
        };
        if let Some(pending) = info.end_change() {
            trace!(object = self.uid(), key, "aborted change");
            for dependent in pending.opened_dependents {
                self.abort_change_for_key(&dependent);
            }
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register `callback` for changes at `key_path`.
    ///
    /// `key_path` may be any depth, or `"*"` for every property. The
    /// callback receives `(change, key_path, context)`. The returned id
    /// removes this registration alone through
    /// [`remove_observer_registration`](Self::remove_observer_registration).
    pub fn add_observer_for_key_path<F>(
        &self,
        observer: ObserverId,
        callback: F,
        key_path: &str,
        context: Option<Value>,
    ) -> Result<RegistrationId>
    where
        F: Fn(&ChangeNotification, &str, Option<&Value>) + Send + Sync + 'static,
    {
        let all_properties = key_path == ALL_PROPERTIES;
        let parsed = if all_properties {
            None
        } else {
            Some(KeyPath::parse(key_path)?)
        };

        let entry = ObserverEntry::new(observer, Arc::new(callback), context);
        let registration = entry.registration();
        self.inner.observers.lock().add(key_path, entry);
        trace!(object = self.uid(), observer = observer.raw(), key_path, "added observer");

        match parsed {
            // Reading through the path installs parent links on every
            // intermediate owner.
            Some(path) if !path.is_simple() => {
                let _ = self.value_for_key_path(key_path);
            }
            Some(_) => self.link_trigger_paths(key_path),
            None => self.link_needed_children(),
        }
        Ok(registration)
    }

    /// Remove every registration of `observer` for `key_path`.
    ///
    /// Removed registrations are never called again, even by a delivery
    /// already in progress. Parent links that no longer serve any observer
    /// are torn down.
    pub fn remove_observer_for_key_path(&self, observer: ObserverId, key_path: &str) {
        let removed = self.inner.observers.lock().remove(observer, key_path);
        if removed.is_empty() {
            return;
        }
        for entry in &removed {
            entry.deactivate();
        }
        trace!(object = self.uid(), observer = observer.raw(), key_path, "removed observer");
        self.prune_child_links();
    }

    /// Remove the one registration `registration` made for `key_path`.
    ///
    /// Other registrations of the same observer stay. Returns whether
    /// anything was removed.
    pub fn remove_observer_registration(&self, registration: RegistrationId, key_path: &str) -> bool {
        let removed = self
            .inner
            .observers
            .lock()
            .remove_registration(registration, key_path);
        let Some(entry) = removed else {
            return false;
        };
        entry.deactivate();
        trace!(object = self.uid(), observer = entry.observer().raw(), key_path, "removed registration");
        self.prune_child_links();
        true
    }

    /// Remove every observer registration on this object. Parent links
    /// installed by the objects holding this one stay.
    pub fn remove_all_observers(&self) {
        let removed = self.inner.observers.lock().clear();
        for entry in &removed {
            entry.deactivate();
        }
        self.prune_child_links();
    }

    /// Key paths that currently have at least one observer registration.
    pub fn observed_key_paths(&self) -> Vec<String> {
        self.inner.observers.lock().key_paths()
    }

    /// Total number of registrations, parent links included.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Deliver `change` to everything observing `key_path` on this object.
    pub fn notify_observers_of_change_for_key_path(&self, change: &ChangeNotification, key_path: &str) {
        let (exact, longer, all, parents) = {
            let registry = self.inner.observers.lock();
            (
                registry.entries(key_path),
                registry.paths_beneath(key_path),
                registry.entries(ALL_PROPERTIES),
                registry.parent_link_entries(),
            )
        };
        trace!(
            object = self.uid(),
            key_path,
            exact = exact.len(),
            longer = longer.len(),
            all = all.len(),
            parents = parents.len(),
            "delivering change"
        );

        let mut panics = DeferredPanic::default();
        panics.deliver(&exact, change, key_path);

        for path in longer {
            let Some(sub_path) = keypath::strip_key_prefix(&path, key_path) else {
                continue;
            };
            let entries = self.inner.observers.lock().entries(&path);
            if entries.is_empty() {
                continue;
            }
            let new_value = self.value_for_key_path(&path).unwrap_or_default();
            let old_value = if change.change_type() == ChangeType::Setting {
                change
                    .old_value()
                    .resolve_path(sub_path.split('.'))
                    .unwrap_or_default()
            } else {
                Value::Null
            };
            let derived = change.derive(new_value, old_value);
            panics.deliver(&entries, &derived, &path);
        }

        panics.deliver(&all, change, key_path);
        panics.deliver(&parents, change, key_path);

        if key_path.contains('.') {
            let class = Arc::clone(&self.inner.class);
            for dependent in class.dependencies().dependents_through(key_path) {
                let Some(info) = self.info_for_key(&dependent) else {
                    continue;
                };
                // An open bracket delivers the dependent when it closes.
                if info.change_count() > 0 {
                    continue;
                }
                let value = self.value_for_key(&dependent);
                let old_value = info.take_remembered(value.clone()).unwrap_or_default();
                let dependent_change =
                    ChangeNotification::new(self.clone(), ChangeType::Setting, value, old_value);
                panics.run(|| self.notify_observers_of_change_for_key_path(&dependent_change, &dependent));
            }
        }

        panics.resume();
    }

    // ------------------------------------------------------------------
    // Parent links
    // ------------------------------------------------------------------

    /// Whether changes inside the object held by `key` must be forwarded
    /// to this object.
    fn needs_child_link(&self, key: &str) -> bool {
        self.needs_path(key, &mut HashSet::new())
    }

    /// Whether anything looks beneath `path` (relative to this object):
    /// an observer here, a key-path trigger here, or the same need on an
    /// owner, with `path` extended by the key the owner holds us under.
    ///
    /// `route` holds the objects already asked along this walk up, so
    /// reference cycles end.
    fn needs_path(&self, path: &str, route: &mut HashSet<u64>) -> bool {
        if !route.insert(self.uid()) {
            return false;
        }
        let links = {
            let registry = self.inner.observers.lock();
            if registry.has_entries(ALL_PROPERTIES) || registry.has_paths_beneath(path) {
                route.remove(&self.uid());
                return true;
            }
            registry.parent_links()
        };
        let needed = self.inner.class.dependencies().has_nested_trigger_under(path)
            || links.iter().any(|link| {
                link.owner
                    .upgrade()
                    .is_some_and(|owner| owner.needs_path(&keypath::join(&link.key, path), route))
            });
        route.remove(&self.uid());
        needed
    }

    /// Make the installed parent link for `info` match `value`.
    fn sync_child_link(&self, info: &PropertyDescriptor, value: &Value) {
        let wanted = match value {
            Value::Object(child) if !child.ptr_eq(self) && self.needs_child_link(info.key()) => Some(child),
            _ => None,
        };
        let current = info.installed_link();
        let current_child = current.as_ref().and_then(|installed| installed.child.upgrade());

        match (&current_child, wanted) {
            (Some(linked), Some(wanted)) if linked.ptr_eq(wanted) => return,
            (None, None) if current.is_none() => return,
            _ => {}
        }

        if let Some(stale) = info.replace_link(None) {
            self.unlink(stale);
        }

        if let Some(child) = wanted {
            let link = ParentLink {
                owner: self.downgrade(),
                key: info.key().to_string(),
                observer: ObserverId::new(),
            };
            info.replace_link(Some(InstalledLink {
                link: link.clone(),
                child: child.downgrade(),
            }));
            debug!(owner = self.uid(), child = child.uid(), key = info.key(), "installed parent link");

            let forward = Self::forwarder(&link);
            child.attach_parent_link(link, forward);
            self.remember_dependents_through(info.key());
        }
    }

    /// Record the current value of every dependent reached through `key`,
    /// so the first change forwarded from the new child has an old value.
    fn remember_dependents_through(&self, key: &str) {
        let class = Arc::clone(&self.inner.class);
        for dependent in class.dependencies().dependents_through(key) {
            if !class.dependencies().has_nested_triggers(&dependent) {
                continue;
            }
            if let Some(info) = self.info_for_key(&dependent) {
                let value = self.value_for_key(&dependent);
                info.remember(value);
            }
        }
    }

    fn forwarder(link: &ParentLink) -> ObserverFn {
        let owner = link.owner.clone();
        let key = link.key.clone();
        Arc::new(move |change: &ChangeNotification, sub_path: &str, _context: Option<&Value>| {
            let Some(owner) = owner.upgrade() else {
                return;
            };
            if !change.enter_route(owner.uid()) {
                trace!(owner = owner.uid(), key = %key, "change already passed through owner");
                return;
            }
            let _route = RouteGuard {
                change,
                uid: owner.uid(),
            };
            owner.notify_observers_of_change_for_key_path(change, &keypath::join(&key, sub_path));
        })
    }

    /// Register the forwarder of an owner on this object, then link
    /// whatever the owner now needs beneath us.
    fn attach_parent_link(&self, link: ParentLink, forward: ObserverFn) {
        let entry = ObserverEntry::new(link.observer, forward, None);
        self.inner.observers.lock().add_parent_link(link, entry);
        self.link_needed_children();
    }

    fn detach_parent_link(&self, observer: ObserverId) {
        let removed = self.inner.observers.lock().remove_parent_link(observer);
        if let Some(entry) = removed {
            entry.deactivate();
            self.prune_child_links();
        }
    }

    fn unlink(&self, installed: InstalledLink) {
        debug!(owner = self.uid(), key = %installed.link.key, "removed parent link");
        if let Some(child) = installed.child.upgrade() {
            child.detach_parent_link(installed.link.observer);
        }
    }

    /// Tear down parent links no remaining observer needs, here and in
    /// the children still linked.
    fn prune_child_links(&self) {
        self.prune_child_links_guarded(&mut HashSet::new());
    }

    fn prune_child_links_guarded(&self, visited: &mut HashSet<u64>) {
        if !visited.insert(self.uid()) {
            return;
        }
        let descriptors: Vec<Arc<PropertyDescriptor>> =
            self.inner.descriptors.lock().values().cloned().collect();
        for info in descriptors {
            let Some(installed) = info.installed_link() else {
                continue;
            };
            if self.needs_child_link(info.key()) {
                if let Some(child) = installed.child.upgrade() {
                    child.prune_child_links_guarded(visited);
                }
            } else if let Some(stale) = info.replace_link(None) {
                self.unlink(stale);
            }
        }
    }

    /// Link every object-valued key something looks into, down through
    /// children that were linked already.
    fn link_needed_children(&self) {
        self.link_needed_children_guarded(&mut HashSet::new());
    }

    fn link_needed_children_guarded(&self, visited: &mut HashSet<u64>) {
        if !visited.insert(self.uid()) {
            return;
        }
        for key in self.keys() {
            if !self.needs_child_link(&key) {
                continue;
            }
            if let Value::Object(child) = self.value_for_key(&key) {
                child.link_needed_children_guarded(visited);
            }
        }
    }

    /// Link the intermediate objects of the key-path triggers of `key`, so
    /// an observer of a dependent key hears about nested changes even when
    /// the path was filled in without notification.
    fn link_trigger_paths(&self, key: &str) {
        let class = Arc::clone(&self.inner.class);
        for trigger in class.dependencies().triggers_of(key) {
            if trigger.contains('.') {
                let _ = self.value_for_key_path(trigger);
            }
        }
    }
}

impl PartialEq for ObservableObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObservableObject {}

impl std::hash::Hash for ObservableObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uid().hash(state);
    }
}

impl std::fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableObject")
            .field("uid", &self.uid())
            .field("class", &self.inner.class.name())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
