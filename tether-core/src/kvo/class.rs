//! Object Classes
//!
//! An [`ObjectClass`] is the per-class metadata shared by every instance:
//! the accessor table (getter, setter and validator closures per key), the
//! dependent-key graph, and optionally a [`PropertyStore`] that replaces
//! the default per-instance storage for keys without accessors.
//!
//! Classes are assembled once with a [`ClassBuilder`] and are immutable
//! afterwards. Instances hold them behind an `Arc`.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::dependency::DependencyGraph;
use super::keypath::ALL_PROPERTIES;
use super::ObservableObject;
use crate::error::{Error, Result, ValidationFailure};
use crate::value::Value;

/// Reads a key.
pub type Getter = Arc<dyn Fn(&ObservableObject) -> Value + Send + Sync>;

/// Writes a key. May reject the value.
pub type Setter = Arc<dyn Fn(&ObservableObject, Value) -> Result<()> + Send + Sync>;

/// Advisory validation hook. Returns the (possibly coerced) value or a
/// failure description; never invoked by the set path.
pub type Validator =
    Arc<dyn Fn(&ObservableObject, &Value) -> std::result::Result<Value, ValidationFailure> + Send + Sync>;

/// Accessor closures declared for one key.
#[derive(Clone, Default)]
pub struct KeyAccessors {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    pub validator: Option<Validator>,
}

impl std::fmt::Debug for KeyAccessors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAccessors")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Backing storage for keys that have no accessors.
///
/// Plain objects keep such values in a per-instance map. A class can
/// install a store to route them elsewhere (the model layer routes them
/// into its original/changes snapshots).
pub trait PropertyStore: Send + Sync {
    fn value(&self, object: &ObservableObject, key: &str) -> Value;

    fn set_value(&self, object: &ObservableObject, key: &str, value: Value) -> Result<()>;

    /// Keys currently holding a value.
    fn keys(&self, object: &ObservableObject) -> Vec<String>;
}

/// Per-class accessor table and dependency graph.
pub struct ObjectClass {
    name: String,
    accessors: IndexMap<String, KeyAccessors>,
    dependencies: DependencyGraph,
    store: Option<Arc<dyn PropertyStore>>,
}

impl ObjectClass {
    /// The shared class of plain objects: no accessors, direct storage.
    pub fn plain() -> Arc<ObjectClass> {
        static PLAIN: OnceLock<Arc<ObjectClass>> = OnceLock::new();
        PLAIN
            .get_or_init(|| {
                Arc::new(ObjectClass {
                    name: "Object".to_string(),
                    accessors: IndexMap::new(),
                    dependencies: DependencyGraph::new(),
                    store: None,
                })
            })
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accessors declared for `key`, if any.
    pub fn accessors(&self, key: &str) -> Option<&KeyAccessors> {
        self.accessors.get(key)
    }

    /// Keys with declared accessors, in declaration order.
    pub fn declared_keys(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn store(&self) -> Option<&Arc<dyn PropertyStore>> {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("accessors", &self.accessors)
            .field("dependencies", &self.dependencies)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Builder for [`ObjectClass`].
///
/// ```rust
/// use tether_core::kvo::{ClassBuilder, ObservableObject};
/// use tether_core::Value;
///
/// let class = ClassBuilder::new("Person")
///     .getter("zebra", |_| Value::from(123))
///     .depends_on("fullName", ["firstName", "lastName"])
///     .build()
///     .unwrap();
///
/// let person = ObservableObject::with_class(class);
/// assert_eq!(person.value_for_key("zebra"), Value::from(123));
/// ```
pub struct ClassBuilder {
    name: String,
    accessors: IndexMap<String, KeyAccessors>,
    dependencies: Vec<(String, Vec<String>)>,
    store: Option<Arc<dyn PropertyStore>>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessors: IndexMap::new(),
            dependencies: Vec::new(),
            store: None,
        }
    }

    fn entry(&mut self, key: &str) -> &mut KeyAccessors {
        self.accessors.entry(key.to_string()).or_default()
    }

    /// Declare a read accessor. A key with a getter and no setter is
    /// immutable.
    pub fn getter<F>(mut self, key: &str, getter: F) -> Self
    where
        F: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
    {
        self.entry(key).getter = Some(Arc::new(getter));
        self
    }

    /// Declare a write accessor.
    pub fn setter<F>(mut self, key: &str, setter: F) -> Self
    where
        F: Fn(&ObservableObject, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.entry(key).setter = Some(Arc::new(setter));
        self
    }

    /// Declare both accessors at once.
    pub fn accessor<G, S>(self, key: &str, getter: G, setter: S) -> Self
    where
        G: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
        S: Fn(&ObservableObject, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.getter(key, getter).setter(key, setter)
    }

    /// Declare an advisory validator.
    pub fn validator<F>(mut self, key: &str, validator: F) -> Self
    where
        F: Fn(&ObservableObject, &Value) -> std::result::Result<Value, ValidationFailure>
            + Send
            + Sync
            + 'static,
    {
        self.entry(key).validator = Some(Arc::new(validator));
        self
    }

    /// Install prepared accessors for a key, replacing earlier ones.
    pub fn accessors(mut self, key: &str, accessors: KeyAccessors) -> Self {
        self.accessors.insert(key.to_string(), accessors);
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

    /// Route accessor-less keys through `store`.
    pub fn store(mut self, store: Arc<dyn PropertyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Arc<ObjectClass>> {
        if self.accessors.keys().any(|key| key.is_empty() || key == ALL_PROPERTIES || key.contains('.')) {
            return Err(Error::InvalidArgument(format!(
                "class {} declares an accessor for a reserved or malformed key",
                self.name
            )));
        }

        let mut dependencies = DependencyGraph::new();
        for (dependent, triggers) in self.dependencies {
            dependencies.add(&dependent, triggers)?;
        }

        tracing::debug!(
            class = %self.name,
            keys = self.accessors.len(),
            "built object class"
        );

        Ok(Arc::new(ObjectClass {
            name: self.name,
            accessors: self.accessors,
            dependencies,
            store: self.store,
        }))
    }
}
