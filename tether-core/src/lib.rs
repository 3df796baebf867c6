//! Tether Core
//!
//! This crate provides the observing core of the Tether UI framework.
//! It implements:
//!
//! - Key-value coding and change notification on observable objects
//! - Key-path observation with automatic rewiring through nested objects
//! - Dependent (computed) keys
//! - Bindings between an observer and a key path, with value transformers
//! - A schema-driven model layer with dirty tracking and relations
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `kvo`: Observable objects, descriptors, change notifications
//! - `trie`: Prefix tree addressed by dotted key paths
//! - `binding`: Managed, revocable links from key paths to callbacks
//! - `model`: Model declarations, instances and per-class collections
//! - `value`: The dynamic value type carried by keys
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use tether_core::kvo::{ObservableObject, ObserverId};
//! use tether_core::Value;
//!
//! let person = ObservableObject::new();
//! let address = ObservableObject::new();
//! address.set_value_for_key("Paris", "city").unwrap();
//! person.set_value_for_key(address.clone(), "address").unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//! person
//!     .add_observer_for_key_path(
//!         ObserverId::new(),
//!         move |change, _, _| seen_clone.lock().unwrap().push(change.new_value().clone()),
//!         "address.city",
//!         None,
//!     )
//!     .unwrap();
//!
//! address.set_value_for_key("Lyon", "city").unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![Value::from("Lyon")]);
//! ```

pub mod binding;
pub mod error;
pub mod kvo;
pub mod model;
pub mod trie;
pub mod value;

pub use error::{Error, Result, ValidationFailure};
pub use value::Value;
