//! Key-Value Observing
//!
//! This module contains the observing core:
//!
//! - [`ObservableObject`] - key-value coding and change notification
//! - [`ObjectClass`] / [`ClassBuilder`] - per-class accessor tables
//! - [`PropertyDescriptor`] - per-key metadata and bracket state
//! - [`ChangeNotification`] - what observers receive
//! - [`DependencyGraph`] - dependent keys
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tether_core::kvo::{ClassBuilder, ObservableObject, ObserverId};
//! use tether_core::Value;
//!
//! let class = ClassBuilder::new("Person")
//!     .getter("fullName", |person| {
//!         let first = person.value_for_key("firstName");
//!         let last = person.value_for_key("lastName");
//!         Value::from(format!(
//!             "{} {}",
//!             first.as_str().unwrap_or(""),
//!             last.as_str().unwrap_or("")
//!         ))
//!     })
//!     .depends_on("fullName", ["firstName", "lastName"])
//!     .build()
//!     .unwrap();
//!
//! let person = ObservableObject::with_class(class);
//! let calls = Arc::new(AtomicUsize::new(0));
//! let calls_clone = calls.clone();
//! person
//!     .add_observer_for_key_path(
//!         ObserverId::new(),
//!         move |_, _, _| {
//!             calls_clone.fetch_add(1, Ordering::SeqCst);
//!         },
//!         "fullName",
//!         None,
//!     )
//!     .unwrap();
//!
//! person.set_value_for_key("Ada", "firstName").unwrap();
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! ```

mod change;
mod class;
mod dependency;
mod descriptor;
pub mod keypath;
mod object;
mod observer;

pub use change::{ChangeNotification, ChangeType};
pub use class::{ClassBuilder, Getter, KeyAccessors, ObjectClass, PropertyStore, Setter, Validator};
pub use dependency::DependencyGraph;
pub use descriptor::{ParentLink, PropertyDescriptor};
pub use keypath::{KeyPath, ALL_PROPERTIES};
pub use object::{ArrayChange, ObservableObject, WeakObject};
pub use observer::{ObserverEntry, ObserverFn, ObserverId, RegistrationId};

/// Capability of exposing an observable object.
///
/// Anything that wraps an [`ObservableObject`] (models, controllers)
/// implements this so generic code can observe it without knowing the
/// concrete type.
pub trait Observable {
    fn observable(&self) -> &ObservableObject;

    fn value_for_key_path(&self, path: &str) -> crate::Result<crate::Value> {
        self.observable().value_for_key_path(path)
    }
}

impl Observable for ObservableObject {
    fn observable(&self) -> &ObservableObject {
        self
    }
}
