//! Models
//!
//! Schema-driven observable objects. A model is defined once, by name, in
//! a [`ModelRegistry`]; its [`ModelDeclaration`] is compiled into typed
//! accessors. Instances ([`ModelObject`]) track their changes against the
//! hash they were created from.
//!
//! # Example
//!
//! ```rust
//! use tether_core::model::{ModelDeclaration, ModelRegistry, PropertyType};
//! use tether_core::{Error, Value};
//!
//! let registry = ModelRegistry::new();
//! let person = registry
//!     .define("Person", ModelDeclaration::new().field("name", PropertyType::String))
//!     .unwrap();
//!
//! let bob = person
//!     .create_from_json(serde_json::json!({ "name": "Bob" }))
//!     .unwrap();
//!
//! let err = bob.set_value_for_key(123, "name").unwrap_err();
//! assert_eq!(err, Error::TypeValidation { key: "name".to_string() });
//! assert_eq!(err.to_string(), "Invalid type for name");
//! assert_eq!(bob.value_for_key("name"), Value::from("Bob"));
//! assert!(!bob.is_updated());
//! ```

mod class;
mod config;
mod declaration;
mod object;
mod registry;
mod types;

pub use class::ModelClass;
pub use config::RegistryConfig;
pub use declaration::{Declared, ModelDeclaration, Property, ToMany, ToOne};
pub use object::ModelObject;
pub use registry::ModelRegistry;
pub use types::PropertyType;
