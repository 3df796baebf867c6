//! Change Notifications
//!
//! A [`ChangeNotification`] describes one mutation: what kind of change it
//! was, the value before and after, and for array-shaped changes the
//! affected indexes. It is created immediately before delivery and dropped
//! once every observer has seen it.
//!
//! # Deduplication
//!
//! A single physical mutation can reach the same registration along more
//! than one route (exact key, forwarded through parent links, rewired
//! longer key paths). Every notification carries the set of (registration,
//! key path) pairs that already received it; notifications derived from
//! the same mutation share that set, so each pair hears about a mutation
//! at most once.
//!
//! # Forwarding Route
//!
//! While a change is forwarded up through parent links it also records the
//! objects it is currently being delivered on. A parent link never forwards
//! into an object already on that route, which stops reference cycles
//! between objects from forwarding forever.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::observer::RegistrationId;
use super::ObservableObject;
use crate::error::ValidationFailure;
use crate::value::Value;

/// The kind of mutation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// The whole value was replaced.
    Setting,
    /// Elements were inserted into an array value.
    Insertion,
    /// Elements were removed from an array value.
    Deletion,
    /// Elements of an array value were replaced in place.
    Replacement,
    /// A proposed value failed advisory validation.
    ValidationError,
}

/// An immutable description of a single change.
#[derive(Clone)]
pub struct ChangeNotification {
    object: Option<ObservableObject>,
    change_type: ChangeType,
    new_value: Value,
    old_value: Value,
    indexes: Option<Vec<usize>>,
    validation_error: Option<ValidationFailure>,
    notified: Arc<Mutex<HashSet<(RegistrationId, String)>>>,
    route: Arc<Mutex<Vec<u64>>>,
}

impl ChangeNotification {
    /// Create a notification for a mutation of `object`.
    pub fn new(
        object: ObservableObject,
        change_type: ChangeType,
        new_value: Value,
        old_value: Value,
    ) -> Self {
        let route = vec![object.uid()];
        Self {
            object: Some(object),
            change_type,
            new_value,
            old_value,
            indexes: None,
            validation_error: None,
            notified: Arc::new(Mutex::new(HashSet::new())),
            route: Arc::new(Mutex::new(route)),
        }
    }

    /// Create a setting notification that is not tied to an object.
    pub fn detached(new_value: Value, old_value: Value) -> Self {
        Self {
            object: None,
            change_type: ChangeType::Setting,
            new_value,
            old_value,
            indexes: None,
            validation_error: None,
            notified: Arc::new(Mutex::new(HashSet::new())),
            route: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach the affected array indexes.
    pub fn with_indexes(mut self, indexes: Vec<usize>) -> Self {
        self.indexes = Some(indexes);
        self
    }

    /// Attach an advisory validation failure.
    pub fn with_validation_error(mut self, failure: ValidationFailure) -> Self {
        self.validation_error = Some(failure);
        self
    }

    /// A setting notification belonging to the same physical mutation.
    ///
    /// Used when an intermediate object of an observed key path is
    /// replaced: the observer of the longer path gets values resolved
    /// through the new and old objects, but shares the delivery set.
    pub fn derive(&self, new_value: Value, old_value: Value) -> Self {
        Self {
            object: self.object.clone(),
            change_type: ChangeType::Setting,
            new_value,
            old_value,
            indexes: None,
            validation_error: None,
            notified: Arc::clone(&self.notified),
            route: Arc::clone(&self.route),
        }
    }

    /// The same notification with substituted values. Keeps type, indexes
    /// and the delivery set.
    pub fn with_values(&self, new_value: Value, old_value: Value) -> Self {
        Self {
            new_value,
            old_value,
            ..self.clone()
        }
    }

    /// The mutated owner, if any.
    pub fn object(&self) -> Option<&ObservableObject> {
        self.object.as_ref()
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn new_value(&self) -> &Value {
        &self.new_value
    }

    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    pub fn indexes(&self) -> Option<&[usize]> {
        self.indexes.as_deref()
    }

    pub fn validation_error(&self) -> Option<&ValidationFailure> {
        self.validation_error.as_ref()
    }

    /// Record delivery to a registration under a key path.
    ///
    /// Returns `true` if the pair had not yet received this change.
    pub(crate) fn mark_notified(&self, registration: RegistrationId, key_path: &str) -> bool {
        self.notified.lock().insert((registration, key_path.to_string()))
    }

    /// Put `uid` on the forwarding route. Returns `false`, leaving the
    /// route unchanged, if the object is already on it.
    pub(crate) fn enter_route(&self, uid: u64) -> bool {
        let mut route = self.route.lock();
        if route.contains(&uid) {
            return false;
        }
        route.push(uid);
        true
    }

    pub(crate) fn leave_route(&self, uid: u64) {
        let mut route = self.route.lock();
        if let Some(position) = route.iter().rposition(|entry| *entry == uid) {
            route.remove(position);
        }
    }

    /// Number of (registration, key path) pairs that have received this
    /// change so far.
    pub fn notified_count(&self) -> usize {
        self.notified.lock().len()
    }
}

impl std::fmt::Debug for ChangeNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotification")
            .field("object", &self.object.as_ref().map(|o| o.uid()))
            .field("change_type", &self.change_type)
            .field("new_value", &self.new_value)
            .field("old_value", &self.old_value)
            .field("indexes", &self.indexes)
            .finish()
    }
}
