//! Property Descriptors
//!
//! A [`PropertyDescriptor`] is the per-instance, per-key metadata behind
//! every observable key: how to read and write it, whether it is mutable,
//! the advisory validator, the will/did change bracket state, and the
//! parent link installed on an observable value held by the key.
//!
//! # Change Bracketing
//!
//! `will_change_value_for_key` increments the change count and
//! `did_change_value_for_key` decrements it. The value before the mutation
//! is captured only on the 0 → 1 transition; nested brackets never
//! overwrite it. The notification is built only when the count returns to
//! zero.
//!
//! # Parent Links
//!
//! When the key holds another observable object and the owner has
//! observers that care about what happens inside it, the descriptor
//! registers an all-properties observer on that child. The registration
//! holds only a weak reference to the owner, so the child never keeps its
//! parent alive.

use std::sync::Arc;

use parking_lot::Mutex;

use super::class::{Getter, KeyAccessors, PropertyStore, Setter, Validator};
use super::object::WeakObject;
use super::observer::ObserverId;
use super::ObservableObject;
use crate::error::{Result, ValidationFailure};
use crate::value::Value;

/// Weak back-reference from a nested observable value to the (owner, key)
/// holding it.
#[derive(Clone, Debug)]
pub struct ParentLink {
    /// The object that holds the child under `key`.
    pub owner: WeakObject,
    /// Key on the owner.
    pub key: String,
    /// Observer id of the forwarding registration on the child.
    pub observer: ObserverId,
}

/// Link currently installed for this key.
#[derive(Clone, Debug)]
pub(crate) struct InstalledLink {
    pub(crate) link: ParentLink,
    pub(crate) child: WeakObject,
}

/// State of a bracket whose count just returned to zero.
#[derive(Debug)]
pub(crate) struct PendingChange {
    pub(crate) prior: Value,
    pub(crate) opened_dependents: Vec<String>,
}

#[derive(Debug, Default)]
struct BracketState {
    change_count: usize,
    prior: Option<Value>,
    opened_dependents: Vec<String>,
    link: Option<InstalledLink>,
    /// Last value delivered for a key with key-path triggers; the old
    /// value of the next change forwarded from a nested object.
    remembered: Option<Value>,
}

/// Metadata for one key on one object.
pub struct PropertyDescriptor {
    key: String,
    getter: Option<Getter>,
    setter: Option<Setter>,
    validator: Option<Validator>,
    store: Option<Arc<dyn PropertyStore>>,
    state: Mutex<BracketState>,
}

impl PropertyDescriptor {
    pub(crate) fn new(
        key: &str,
        accessors: KeyAccessors,
        store: Option<Arc<dyn PropertyStore>>,
    ) -> Self {
        Self {
            key: key.to_string(),
            getter: accessors.getter,
            setter: accessors.setter,
            validator: accessors.validator,
            store,
            state: Mutex::new(BracketState::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// A key is mutable iff it has a setter, or has neither getter nor
    /// setter (direct storage).
    pub fn is_mutable(&self) -> bool {
        self.setter.is_some() || self.getter.is_none()
    }

    /// True when the key is backed by accessor closures rather than
    /// storage.
    pub fn has_accessors(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Current nesting depth of will/did brackets.
    pub fn change_count(&self) -> usize {
        self.state.lock().change_count
    }

    /// The parent link installed on the value held by this key, if any.
    pub fn parent_link(&self) -> Option<ParentLink> {
        self.state.lock().link.as_ref().map(|l| l.link.clone())
    }

    /// Read the raw value. Never returns anything but a value; absent keys
    /// read as `Null`.
    pub(crate) fn get(&self, object: &ObservableObject) -> Value {
        if let Some(getter) = &self.getter {
            return getter(object);
        }
        if let Some(store) = &self.store {
            return store.value(object, &self.key);
        }
        object.stored_value(&self.key)
    }

    /// Write the raw value without any notification.
    pub(crate) fn set(&self, object: &ObservableObject, value: Value) -> Result<()> {
        if let Some(setter) = &self.setter {
            return setter(object, value);
        }
        if self.getter.is_some() {
            // Read-only accessor key.
            return Ok(());
        }
        if let Some(store) = &self.store {
            return store.set_value(object, &self.key, value);
        }
        object.store_value(&self.key, value);
        Ok(())
    }

    /// Run the advisory validator. Keys without one accept any value.
    pub fn validate(
        &self,
        object: &ObservableObject,
        value: &Value,
    ) -> std::result::Result<Value, ValidationFailure> {
        match &self.validator {
            Some(validator) => validator(object, value),
            None => Ok(value.clone()),
        }
    }

    /// Open a bracket. Returns `true` on the 0 → 1 transition, when the
    /// caller must capture the prior value.
    pub(crate) fn begin_change(&self) -> bool {
        let mut state = self.state.lock();
        state.change_count += 1;
        state.change_count == 1
    }

    /// Record what the outermost bracket captured.
    pub(crate) fn record_pending(&self, prior: Value, opened_dependents: Vec<String>) {
        let mut state = self.state.lock();
        state.prior = Some(prior);
        state.opened_dependents = opened_dependents;
    }

    /// Close a bracket. Returns the pending change when the count reaches
    /// zero.
    pub(crate) fn end_change(&self) -> Option<PendingChange> {
        let mut state = self.state.lock();
        if state.change_count == 0 {
            tracing::warn!(key = %self.key, "did_change_value_for_key without matching will_change");
            return None;
        }
        state.change_count -= 1;
        if state.change_count > 0 {
            return None;
        }
        Some(PendingChange {
            prior: state.prior.take().unwrap_or_default(),
            opened_dependents: std::mem::take(&mut state.opened_dependents),
        })
    }

    pub(crate) fn remember(&self, value: Value) {
        self.state.lock().remembered = Some(value);
    }

    /// Swap in `value` as the remembered value, returning the previous one.
    pub(crate) fn take_remembered(&self, value: Value) -> Option<Value> {
        self.state.lock().remembered.replace(value)
    }

    pub(crate) fn installed_link(&self) -> Option<InstalledLink> {
        self.state.lock().link.clone()
    }

    pub(crate) fn replace_link(&self, link: Option<InstalledLink>) -> Option<InstalledLink> {
        std::mem::replace(&mut self.state.lock().link, link)
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("key", &self.key)
            .field("mutable", &self.is_mutable())
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("validator", &self.validator.is_some())
            .field("change_count", &self.change_count())
            .finish()
    }
}
