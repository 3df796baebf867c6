//! Model Declarations
//!
//! A [`ModelDeclaration`] lists the keys of a model and what each one is:
//! a typed field, a [`Property`] with custom accessors, a computed key, or
//! a relation to another model. The registry compiles a declaration into
//! an accessor table once, when the model is defined.

use std::sync::Arc;

use indexmap::IndexMap;

use super::types::PropertyType;
use crate::error::{Result, ValidationFailure};
use crate::kvo::{Getter, ObservableObject, Setter, Validator};
use crate::value::Value;

/// A typed key with optional custom accessors.
///
/// Writes are type-checked and coerced before the custom setter (or the
/// primitive store) sees them.
#[derive(Clone)]
pub struct Property {
    pub(crate) ty: PropertyType,
    pub(crate) getter: Option<Getter>,
    pub(crate) setter: Option<Setter>,
    pub(crate) validator: Option<Validator>,
}

impl Property {
    pub fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            getter: None,
            setter: None,
            validator: None,
        }
    }

    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Receives the already coerced value.
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&ObservableObject, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Advisory validator, consulted only through
    /// `validate_value_for_key`.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ObservableObject, &Value) -> std::result::Result<Value, ValidationFailure>
            + Send
            + Sync
            + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.ty
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("ty", &self.ty)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// A single related instance of `model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToOne {
    pub model: String,
    /// Key on the related model that points back.
    pub inverse: Option<String>,
}

impl ToOne {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            inverse: None,
        }
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }
}

/// An array of related instances of `model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToMany {
    pub model: String,
    /// Key on the related model that points back.
    pub inverse: Option<String>,
}

impl ToMany {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            inverse: None,
        }
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }
}

/// One entry of a declaration.
#[derive(Clone)]
pub enum Declared {
    Type(PropertyType),
    Property(Property),
    Computed {
        getter: Getter,
        setter: Option<Setter>,
    },
    ToOne(ToOne),
    ToMany(ToMany),
}

impl std::fmt::Debug for Declared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Declared::Type(ty) => f.debug_tuple("Type").field(ty).finish(),
            Declared::Property(property) => f.debug_tuple("Property").field(property).finish(),
            Declared::Computed { setter, .. } => f
                .debug_struct("Computed")
                .field("setter", &setter.is_some())
                .finish(),
            Declared::ToOne(relation) => f.debug_tuple("ToOne").field(relation).finish(),
            Declared::ToMany(relation) => f.debug_tuple("ToMany").field(relation).finish(),
        }
    }
}

/// The schema of a model.
///
/// ```rust
/// use tether_core::model::{ModelDeclaration, PropertyType, ToMany};
///
/// let person = ModelDeclaration::new()
///     .field("name", PropertyType::String)
///     .field("born", PropertyType::Date)
///     .to_many("pets", ToMany::new("Pet").with_inverse("owner"));
/// assert_eq!(person.keys().count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelDeclaration {
    pub(crate) entries: IndexMap<String, Declared>,
    pub(crate) dependencies: Vec<(String, Vec<String>)>,
    pub(crate) id_key: Option<String>,
}

impl ModelDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// A key type-checked against `ty`.
    pub fn field(mut self, key: &str, ty: PropertyType) -> Self {
        self.entries.insert(key.to_string(), Declared::Type(ty));
        self
    }

    pub fn property(mut self, key: &str, property: Property) -> Self {
        self.entries.insert(key.to_string(), Declared::Property(property));
        self
    }

    /// A read-only computed key.
    pub fn computed<G>(mut self, key: &str, getter: G) -> Self
    where
        G: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
    {
        self.entries.insert(
            key.to_string(),
            Declared::Computed {
                getter: Arc::new(getter),
                setter: None,
            },
        );
        self
    }

    /// A computed key with a setter.
    pub fn computed_with_setter<G, S>(mut self, key: &str, getter: G, setter: S) -> Self
    where
        G: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
        S: Fn(&ObservableObject, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.entries.insert(
            key.to_string(),
            Declared::Computed {
                getter: Arc::new(getter),
                setter: Some(Arc::new(setter)),
            },
        );
        self
    }

    pub fn to_one(mut self, key: &str, relation: ToOne) -> Self {
        self.entries.insert(key.to_string(), Declared::ToOne(relation));
        self
    }

    pub fn to_many(mut self, key: &str, relation: ToMany) -> Self {
        self.entries.insert(key.to_string(), Declared::ToMany(relation));
        self
    }

    /// Declare that `dependent` changes whenever any of `triggers` does.
    pub fn depends_on<I, S>(mut self, dependent: &str, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.push((
            dependent.to_string(),
            triggers.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Use `key` instead of the registry default as the unique id.
    pub fn id_key(mut self, key: &str) -> Self {
        self.id_key = Some(key.to_string());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Declared> {
        self.entries.get(key)
    }
}
