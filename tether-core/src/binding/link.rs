//! Binding Implementation
//!
//! A [`Binding`] connects an observer's callback to a key path on a target
//! object. It is the unit views and controllers use to stay in sync with
//! models.
//!
//! # Lifecycle
//!
//! 1. `Binding::new` validates the options. Nothing is registered yet.
//!
//! 2. `bind` registers an observer for the key path. Registering a
//!    multi-segment path installs parent links along the chain.
//!
//! 3. `update` pushes the current value to the callback. Binding never
//!    does this implicitly, so wiring up and syncing are separate steps.
//!
//! 4. `unbind` (or dropping the binding) removes the registration. Parent
//!    links that no other observer needs are torn down with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::transformer::ValueTransformer;
use crate::error::{Error, Result, ValidationFailure};
use crate::kvo::{ChangeNotification, ChangeType, KeyPath, ObservableObject, ObserverId, RegistrationId};
use crate::value::Value;

/// Callback invoked with each (transformed) change.
pub type BindingFn = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

/// Construction parameters for a [`Binding`].
pub struct BindingOptions {
    /// Target object.
    pub object: ObservableObject,
    /// Key path on the target.
    pub keypath: String,
    /// Identity the registration is made under. Several bindings may
    /// share one; each still removes only its own registration.
    pub observer: ObserverId,
    /// Called with every change at the key path.
    pub observer_fn: BindingFn,
    /// Optional model <-> presentation conversion.
    pub transformer: Option<Arc<dyn ValueTransformer>>,
    /// Name of the binding on its observer, e.g. `"value"` or `"visible"`.
    pub name: String,
}

impl BindingOptions {
    /// Options with a fresh observer id, no transformer, and the key path
    /// as name.
    pub fn new<F>(object: ObservableObject, keypath: impl Into<String>, observer_fn: F) -> Self
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        let keypath = keypath.into();
        Self {
            object,
            name: keypath.clone(),
            keypath,
            observer: ObserverId::new(),
            observer_fn: Arc::new(observer_fn),
            transformer: None,
        }
    }

    pub fn with_observer(mut self, observer: ObserverId) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Debug for BindingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingOptions")
            .field("object", &self.object)
            .field("keypath", &self.keypath)
            .field("observer", &self.observer)
            .field("transformer", &self.transformer.is_some())
            .field("name", &self.name)
            .finish()
    }
}

struct BindingShared {
    object: ObservableObject,
    keypath: String,
    observer: ObserverId,
    observer_fn: BindingFn,
    transformer: Option<Arc<dyn ValueTransformer>>,
    name: String,

    bound: AtomicBool,
    registration: Mutex<Option<RegistrationId>>,

    /// Set while the binding writes through to its target, so its own
    /// write is not echoed back to its callback.
    updating: AtomicBool,
}

impl BindingShared {
    fn transform(&self, value: &Value) -> Value {
        match &self.transformer {
            Some(transformer) => transformer.transformed_value(value),
            None => value.clone(),
        }
    }

    fn deliver(&self, change: &ChangeNotification) {
        if self.updating.load(Ordering::SeqCst) {
            trace!(binding = %self.name, "skipping echo of own write");
            return;
        }
        let change = match change.change_type() {
            ChangeType::Setting => {
                change.with_values(self.transform(change.new_value()), self.transform(change.old_value()))
            }
            _ => change.clone(),
        };
        (self.observer_fn)(&change);
    }
}

/// Clears the updating flag on every exit path.
struct UpdatingGuard<'a>(&'a AtomicBool);

impl<'a> UpdatingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A managed, revocable link between a callback and a key path.
///
/// Dropping the binding unbinds it.
pub struct Binding {
    shared: Arc<BindingShared>,
}

impl Binding {
    /// Create an unbound binding.
    pub fn new(options: BindingOptions) -> Result<Self> {
        KeyPath::parse(&options.keypath)?;
        Ok(Self {
            shared: Arc::new(BindingShared {
                object: options.object,
                keypath: options.keypath,
                observer: options.observer,
                observer_fn: options.observer_fn,
                transformer: options.transformer,
                name: options.name,
                bound: AtomicBool::new(false),
                registration: Mutex::new(None),
                updating: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn keypath(&self) -> &str {
        &self.shared.keypath
    }

    pub fn object(&self) -> &ObservableObject {
        &self.shared.object
    }

    pub fn observer(&self) -> ObserverId {
        self.shared.observer
    }

    pub fn is_bound(&self) -> bool {
        self.shared.bound.load(Ordering::SeqCst)
    }

    /// Start observing the key path. Does not push the current value.
    pub fn bind(&self) -> Result<()> {
        if self.shared.bound.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let weak: Weak<BindingShared> = Arc::downgrade(&self.shared);
        let registered = self.shared.object.add_observer_for_key_path(
            self.shared.observer,
            move |change, _key_path, _context| {
                if let Some(shared) = weak.upgrade() {
                    shared.deliver(change);
                }
            },
            &self.shared.keypath,
            None,
        );
        match registered {
            Ok(registration) => *self.shared.registration.lock() = Some(registration),
            Err(err) => {
                self.shared.bound.store(false, Ordering::SeqCst);
                return Err(err);
            }
        }
        debug!(binding = %self.shared.name, keypath = %self.shared.keypath, "bound");
        Ok(())
    }

    /// Stop observing. Safe to call more than once.
    pub fn unbind(&self) {
        if !self.shared.bound.swap(false, Ordering::SeqCst) {
            return;
        }
        let registration = self.shared.registration.lock().take();
        if let Some(registration) = registration {
            self.shared
                .object
                .remove_observer_registration(registration, &self.shared.keypath);
        }
        debug!(binding = %self.shared.name, keypath = %self.shared.keypath, "unbound");
    }

    /// Push the current value to the callback as a setting change.
    pub fn update(&self) {
        let change = ChangeNotification::new(
            self.shared.object.clone(),
            ChangeType::Setting,
            self.value(),
            Value::Null,
        );
        (self.shared.observer_fn)(&change);
    }

    /// The current (transformed) value at the key path.
    pub fn value(&self) -> Value {
        let raw = self
            .shared
            .object
            .value_for_key_path(&self.shared.keypath)
            .unwrap_or_default();
        self.shared.transform(&raw)
    }

    /// Whether writes through this binding reach the target.
    ///
    /// The target key must be mutable, and a transformer, if any, must be
    /// able to reverse.
    pub fn mutable(&self) -> bool {
        let target_mutable = self
            .shared
            .object
            .info_for_key_path(&self.shared.keypath)
            .map(|info| info.is_mutable())
            .unwrap_or(false);
        let reversible = self
            .shared
            .transformer
            .as_ref()
            .map_or(true, |transformer| transformer.can_reverse());
        target_mutable && reversible
    }

    /// Write a presentation value through to the target. Does nothing when
    /// the binding is not mutable.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        match self.try_set_value(value) {
            Err(Error::ImmutableKey(keypath)) => {
                debug!(binding = %self.shared.name, %keypath, "ignoring write through read-only binding");
                Ok(())
            }
            other => other,
        }
    }

    /// Like [`Binding::set_value`], but reports a read-only binding as
    /// [`Error::ImmutableKey`].
    pub fn try_set_value(&self, value: impl Into<Value>) -> Result<()> {
        if !self.mutable() {
            return Err(Error::ImmutableKey(self.shared.keypath.clone()));
        }
        let value = self.reverse(value.into())?;
        let _guard = UpdatingGuard::set(&self.shared.updating);
        self.shared
            .object
            .set_value_for_key_path(value, &self.shared.keypath)
    }

    fn reverse(&self, value: Value) -> Result<Value> {
        match &self.shared.transformer {
            Some(transformer) => transformer.reverse_transformed_value(&value),
            None => Ok(value),
        }
    }

    /// Run the target key's advisory validator against a presentation
    /// value.
    ///
    /// A failure is also delivered to the callback as a
    /// [`ChangeType::ValidationError`] change.
    pub fn validate_proposed_value(
        &self,
        value: impl Into<Value>,
    ) -> std::result::Result<Value, ValidationFailure> {
        let proposed = value.into();
        let model_value = self.reverse(proposed.clone()).unwrap_or_else(|_| proposed.clone());

        let Some((owner, key)) = self.owner_and_key() else {
            return Ok(model_value);
        };
        let outcome = owner.validate_value_for_key(&model_value, &key);
        if let Err(failure) = &outcome {
            let change = ChangeNotification::new(
                owner.clone(),
                ChangeType::ValidationError,
                proposed,
                self.value(),
            )
            .with_validation_error(failure.clone());
            (self.shared.observer_fn)(&change);
        }
        outcome
    }

    fn owner_and_key(&self) -> Option<(ObservableObject, String)> {
        let path = KeyPath::parse(&self.shared.keypath).ok()?;
        if path.is_simple() {
            return Some((self.shared.object.clone(), path.last().to_string()));
        }
        let owner_path = path.owner_segments().join(".");
        let owner = self.shared.object.value_for_key_path(&owner_path).ok()?;
        owner.as_object().map(|owner| (owner.clone(), path.last().to_string()))
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.shared.name)
            .field("keypath", &self.shared.keypath)
            .field("bound", &self.is_bound())
            .finish()
    }
}
