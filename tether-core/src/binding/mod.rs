//! Bindings
//!
//! Managed, revocable links between a callback and a key path on an
//! observable object, with optional value transformation.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use tether_core::binding::{Binding, BindingOptions};
//! use tether_core::kvo::ObservableObject;
//! use tether_core::Value;
//!
//! let person = ObservableObject::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//!
//! let binding = Binding::new(BindingOptions::new(person.clone(), "name", move |change| {
//!     seen_clone.lock().unwrap().push(change.new_value().clone());
//! }))
//! .unwrap();
//! binding.bind().unwrap();
//!
//! person.set_value_for_key("Ada", "name").unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![Value::from("Ada")]);
//! ```

mod link;
mod set;
mod transformer;

pub use link::{Binding, BindingFn, BindingOptions};
pub use set::BindingSet;
pub use transformer::{
    transformer_with_name, BooleanTransformer, GenericTransformer, NotTransformer,
    TruncatedTransformer, ValueTransformer,
};
