//! Model Classes
//!
//! Defining a model compiles its declaration into an [`ObjectClass`]:
//! each declared key becomes a fixed set of accessor closures, and keys
//! without accessors are routed into the instance snapshots. A
//! [`ModelClass`] also keeps the collection of instances added to it.
//!
//! # Accessors per declaration
//!
//! - typed field: reads the stored value (instantiating a nested model
//!   from a raw hash on first read); writes type-check and coerce first
//! - property: like a typed field, with optional custom getter/setter and
//!   an advisory validator
//! - computed: the declared closures, unchanged
//! - to-one / to-many: typed like a model field; writes also update the
//!   inverse key on the related instances

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::declaration::{Declared, ModelDeclaration, Property, ToMany, ToOne};
use super::object::{is_same_object, ModelObject, ModelStore};
use super::registry::RegistryInner;
use super::types::PropertyType;
use crate::error::{Error, Result};
use crate::kvo::{ClassBuilder, Getter, KeyAccessors, ObjectClass, ObservableObject, Setter};
use crate::value::Value;

/// A compiled declaration entry.
#[derive(Debug, Clone)]
pub(crate) enum Field {
    Typed(PropertyType),
    Property(PropertyType),
    Computed,
    One(ToOne),
    Many(ToMany),
}

/// A defined model: its compiled accessor table and its collection.
pub struct ModelClass {
    name: String,
    id_key: String,
    coerce_dates: bool,
    fields: IndexMap<String, Field>,
    object_class: Arc<ObjectClass>,
    registry: Weak<RegistryInner>,
    collection: Mutex<Vec<ModelObject>>,
}

impl ModelClass {
    pub(crate) fn compile(
        name: &str,
        declaration: ModelDeclaration,
        id_key: String,
        coerce_dates: bool,
        registry: Weak<RegistryInner>,
    ) -> Result<Arc<ModelClass>> {
        let mut builder = ClassBuilder::new(name).store(Arc::new(ModelStore));
        let mut fields = IndexMap::new();

        for (key, declared) in declaration.entries {
            let (field, accessors) = match declared {
                Declared::Type(ty) => {
                    let accessors = KeyAccessors {
                        getter: Some(typed_getter(&key, ty.clone())),
                        setter: Some(typed_setter(&key, None)),
                        validator: None,
                    };
                    (Field::Typed(ty), accessors)
                }
                Declared::Property(Property {
                    ty,
                    getter,
                    setter,
                    validator,
                }) => {
                    let accessors = KeyAccessors {
                        getter: Some(getter.unwrap_or_else(|| typed_getter(&key, ty.clone()))),
                        setter: Some(typed_setter(&key, setter)),
                        validator,
                    };
                    (Field::Property(ty), accessors)
                }
                Declared::Computed { getter, setter } => {
                    let accessors = KeyAccessors {
                        getter: Some(getter),
                        setter,
                        validator: None,
                    };
                    (Field::Computed, accessors)
                }
                Declared::ToOne(relation) => {
                    let accessors = KeyAccessors {
                        getter: Some(typed_getter(&key, PropertyType::Model(relation.model.clone()))),
                        setter: Some(to_one_setter(&key, relation.clone())),
                        validator: None,
                    };
                    (Field::One(relation), accessors)
                }
                Declared::ToMany(relation) => {
                    let accessors = KeyAccessors {
                        getter: Some(to_many_getter(&key)),
                        setter: Some(to_many_setter(&key, relation.clone())),
                        validator: None,
                    };
                    (Field::Many(relation), accessors)
                }
            };
            builder = builder.accessors(&key, accessors);
            fields.insert(key, field);
        }

        for (dependent, triggers) in declaration.dependencies {
            builder = builder.depends_on(&dependent, triggers);
        }
        let object_class = builder.build()?;

        debug!(model = name, keys = fields.len(), id_key = %id_key, "compiled model");

        Ok(Arc::new(ModelClass {
            name: name.to_string(),
            id_key,
            coerce_dates,
            fields,
            object_class,
            registry,
            collection: Mutex::new(Vec::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key holding the unique id of an instance.
    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    pub fn object_class(&self) -> &Arc<ObjectClass> {
        &self.object_class
    }

    /// Declared keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The declared type of `key`, for typed fields and properties.
    pub fn property_type(&self, key: &str) -> Option<&PropertyType> {
        match self.fields.get(key)? {
            Field::Typed(ty) | Field::Property(ty) => Some(ty),
            _ => None,
        }
    }

    pub(crate) fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    fn resolve(&self, name: &str) -> Result<Arc<ModelClass>> {
        self.registry
            .upgrade()
            .and_then(|registry| registry.lookup(name))
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create an instance from a raw hash.
    ///
    /// Declared keys are coerced (dates parsed, nested models
    /// instantiated); undeclared keys are kept as given. The hash becomes
    /// the original snapshot; there are no pending changes.
    pub fn create(self: &Arc<Self>, hash: IndexMap<String, Value>) -> Result<ModelObject> {
        let mut original = IndexMap::with_capacity(hash.len());
        for (key, value) in hash {
            let value = self.coerce_field(&key, value)?;
            original.insert(key, value);
        }
        Ok(ModelObject::instantiate(self, original))
    }

    /// Create an instance from a JSON object.
    pub fn create_from_json(self: &Arc<Self>, json: serde_json::Value) -> Result<ModelObject> {
        match Value::from(json) {
            Value::Hash(hash) => self.create(hash),
            other => Err(Error::InvalidArgument(format!(
                "{} instances are created from a hash, not a {}",
                self.name,
                other.type_name()
            ))),
        }
    }

    /// Check and convert a value written to `key`.
    pub(crate) fn coerce_field(&self, key: &str, value: Value) -> Result<Value> {
        match self.fields.get(key) {
            None | Some(Field::Computed) => Ok(value),
            Some(Field::Typed(ty)) | Some(Field::Property(ty)) => self.coerce_typed(key, ty, value),
            Some(Field::One(relation)) => {
                self.coerce_typed(key, &PropertyType::Model(relation.model.clone()), value)
            }
            Some(Field::Many(relation)) => {
                let ty = PropertyType::Model(relation.model.clone());
                match value {
                    Value::Null => Ok(Value::Array(Vec::new())),
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| self.coerce_typed(key, &ty, item))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Array),
                    _ => Err(Error::TypeValidation { key: key.to_string() }),
                }
            }
        }
    }

    fn coerce_typed(&self, key: &str, ty: &PropertyType, value: Value) -> Result<Value> {
        let value = ty.coerce(key, value, self.coerce_dates)?;
        let PropertyType::Model(model) = ty else {
            return Ok(value);
        };
        match value {
            Value::Object(object) => match ModelObject::from_object(&object) {
                Some(instance) if instance.model_name() == model => Ok(Value::Object(object)),
                _ => Err(Error::TypeValidation { key: key.to_string() }),
            },
            // The nested model may not be defined yet; keep the raw hash
            // and instantiate it on first read.
            Value::Hash(hash) => match self.resolve(model) {
                Ok(class) => class.create(hash).map(Value::from),
                Err(_) => Ok(Value::Hash(hash)),
            },
            other => Ok(other),
        }
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Add an instance to this model's collection. Adding an instance
    /// twice does nothing.
    pub fn add(&self, instance: &ModelObject) -> Result<()> {
        if instance.model_name() != self.name {
            return Err(Error::InvalidArgument(format!(
                "cannot add a {} to the {} collection",
                instance.model_name(),
                self.name
            )));
        }
        let mut collection = self.collection.lock();
        if !collection.iter().any(|existing| existing == instance) {
            collection.push(instance.clone());
        }
        Ok(())
    }

    /// The first instance whose id equals `id`.
    pub fn find(&self, id: impl Into<Value>) -> Option<ModelObject> {
        let id = id.into();
        self.find_by(|instance| instance.id() == id)
    }

    /// The first instance satisfying `predicate`.
    pub fn find_by<F>(&self, predicate: F) -> Option<ModelObject>
    where
        F: Fn(&ModelObject) -> bool,
    {
        // Predicates read values, which may run accessors; iterate over a
        // copy so they can touch the collection.
        self.all().into_iter().find(|instance| predicate(instance))
    }

    pub fn all(&self) -> Vec<ModelObject> {
        self.collection.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.collection.lock().len()
    }

    /// Object uids of the collected instances, in insertion order.
    pub fn uids(&self) -> Vec<u64> {
        self.collection.lock().iter().map(|instance| instance.uid()).collect()
    }

    /// Remove an instance. Returns whether it was present.
    pub fn remove(&self, instance: &ModelObject) -> bool {
        let removed = {
            let mut collection = self.collection.lock();
            collection
                .iter()
                .position(|existing| existing == instance)
                .map(|index| collection.remove(index))
        };
        removed.is_some()
    }

    /// Empty the collection.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.collection.lock());
        drop(drained);
    }
}

impl std::fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("id_key", &self.id_key)
            .field("fields", &self.fields)
            .field("count", &self.count())
            .finish()
    }
}

fn typed_getter(key: &str, ty: PropertyType) -> Getter {
    let key = key.to_string();
    Arc::new(move |object: &ObservableObject| {
        let Some(model) = ModelObject::from_object(object) else {
            return Value::Null;
        };
        let value = model.primitive_value_for_key(&key);
        let (PropertyType::Model(name), Value::Hash(hash)) = (&ty, &value) else {
            return value;
        };
        let Ok(class) = model.class().resolve(name) else {
            return value;
        };
        match class.create(hash.clone()) {
            Ok(nested) => {
                let nested = Value::from(nested);
                model.replace_primitive_silently(&key, nested.clone());
                nested
            }
            Err(_) => value,
        }
    })
}

fn typed_setter(key: &str, custom: Option<Setter>) -> Setter {
    let key = key.to_string();
    Arc::new(move |object: &ObservableObject, value: Value| {
        let model = ModelObject::require(object)?;
        let value = model.class().coerce_field(&key, value)?;
        match &custom {
            Some(setter) => setter(object, value),
            None => {
                model.write_primitive(&key, value);
                Ok(())
            }
        }
    })
}

fn to_one_setter(key: &str, relation: ToOne) -> Setter {
    let key = key.to_string();
    Arc::new(move |object: &ObservableObject, value: Value| {
        let model = ModelObject::require(object)?;
        let value = model.class().coerce_field(&key, value)?;
        let previous = model.primitive_value_for_key(&key);
        if is_same_object(&previous, &value) {
            return Ok(());
        }
        model.write_primitive(&key, value.clone());

        if let Some(inverse) = &relation.inverse {
            if let Some(old) = previous.as_object().and_then(ModelObject::from_object) {
                old.detach_related(inverse, &model);
            }
            if let Some(new) = value.as_object().and_then(ModelObject::from_object) {
                new.attach_related(inverse, &model);
            }
        }
        Ok(())
    })
}

fn to_many_getter(key: &str) -> Getter {
    let key = key.to_string();
    Arc::new(move |object: &ObservableObject| match ModelObject::from_object(object) {
        Some(model) => Value::Array(model.related_items(&key)),
        None => Value::Null,
    })
}

fn to_many_setter(key: &str, relation: ToMany) -> Setter {
    let key = key.to_string();
    Arc::new(move |object: &ObservableObject, value: Value| {
        let model = ModelObject::require(object)?;
        let Value::Array(items) = model.class().coerce_field(&key, value)? else {
            return Err(Error::TypeValidation { key: key.clone() });
        };
        let previous = model.related_items(&key);
        model.write_primitive(&key, Value::Array(items.clone()));

        let Some(inverse) = &relation.inverse else {
            return Ok(());
        };
        let contains = |list: &[Value], item: &Value| list.iter().any(|other| is_same_object(other, item));
        for removed in previous.iter().filter(|item| !contains(&items, item)) {
            if let Some(related) = removed.as_object().and_then(ModelObject::from_object) {
                related.detach_related(inverse, &model);
            }
        }
        for added in items.iter().filter(|item| !contains(&previous, item)) {
            if let Some(related) = added.as_object().and_then(ModelObject::from_object) {
                related.attach_related(inverse, &model);
            }
        }
        Ok(())
    })
}
