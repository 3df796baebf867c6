//! Model Registry
//!
//! Owns the models of an application by name. Names are unique within a
//! registry; defining a name twice fails. Tests create their own registry
//! or call [`ModelRegistry::reset`] between cases.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::class::ModelClass;
use super::config::RegistryConfig;
use super::declaration::ModelDeclaration;
use crate::error::{Error, Result};

pub(crate) struct RegistryInner {
    classes: DashMap<String, Arc<ModelClass>>,
    config: RegistryConfig,
}

impl RegistryInner {
    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<ModelClass>> {
        self.classes.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

/// Models by name. Cloning shares the registry.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                classes: DashMap::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Define a model.
    ///
    /// ```rust
    /// use tether_core::model::{ModelDeclaration, ModelRegistry, PropertyType};
    /// use tether_core::Error;
    ///
    /// let registry = ModelRegistry::new();
    /// registry
    ///     .define("Person", ModelDeclaration::new().field("name", PropertyType::String))
    ///     .unwrap();
    ///
    /// let again = registry.define("Person", ModelDeclaration::new());
    /// assert_eq!(again.err(), Some(Error::DuplicateModel("Person".to_string())));
    /// ```
    pub fn define(&self, name: &str, declaration: ModelDeclaration) -> Result<Arc<ModelClass>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("model name must not be empty".to_string()));
        }
        if self.inner.classes.contains_key(name) {
            return Err(Error::DuplicateModel(name.to_string()));
        }

        let id_key = declaration
            .id_key
            .clone()
            .unwrap_or_else(|| self.inner.config.id_key.clone());
        let class = ModelClass::compile(
            name,
            declaration,
            id_key,
            self.inner.config.coerce_dates,
            Arc::downgrade(&self.inner),
        )?;

        match self.inner.classes.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateModel(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&class));
                debug!(model = name, "defined model");
                Ok(class)
            }
        }
    }

    /// The model called `name`.
    pub fn class(&self, name: &str) -> Result<Arc<ModelClass>> {
        self.inner
            .lookup(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.classes.contains_key(name)
    }

    /// Names of every defined model, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .classes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Forget every model and empty their collections.
    pub fn reset(&self) {
        let classes: Vec<Arc<ModelClass>> = self
            .inner
            .classes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.inner.classes.clear();
        for class in classes {
            class.clear();
        }
        debug!("reset model registry");
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .field("config", &self.inner.config)
            .finish()
    }
}
