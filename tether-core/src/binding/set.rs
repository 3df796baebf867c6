//! Named bindings owned by one observer.

use indexmap::IndexMap;

use super::link::Binding;
use crate::error::Result;

/// The bindings of one observer (a view or controller), keyed by binding
/// name. Dropping the set unbinds everything in it.
#[derive(Debug, Default)]
pub struct BindingSet {
    bindings: IndexMap<String, Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding under its name. A binding previously stored under the
    /// same name is returned; dropping it unbinds it.
    pub fn insert(&mut self, binding: Binding) -> Option<Binding> {
        self.bindings.insert(binding.name().to_string(), binding)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        self.bindings.shift_remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind every binding, stopping at the first failure.
    pub fn bind_all(&self) -> Result<()> {
        for binding in self.bindings.values() {
            binding.bind()?;
        }
        Ok(())
    }

    /// Push current values to every callback.
    pub fn update_all(&self) {
        for binding in self.bindings.values() {
            binding.update();
        }
    }

    pub fn unbind_all(&self) {
        for binding in self.bindings.values() {
            binding.unbind();
        }
    }
}
