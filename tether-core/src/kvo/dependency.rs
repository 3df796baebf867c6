//! Dependent Keys
//!
//! A class may declare that a computed key depends on other keys, e.g.
//! `fullName` depends on `firstName` and `lastName`. Whenever a trigger
//! key changes, observers of its dependent keys are notified as well.
//!
//! The graph keeps both directions, like any dependency graph: for each
//! trigger the keys that depend on it, and for each dependent key the
//! triggers it was declared with. It is populated while a class is being
//! built and only read afterwards.

use indexmap::IndexMap;

use super::keypath::{self, KeyPath};
use crate::error::{Error, Result};

/// Mapping from trigger keys to the keys that depend on them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Trigger key (or key path) -> dependent keys, in declaration order.
    dependents: IndexMap<String, Vec<String>>,

    /// Dependent key -> triggers it was declared with.
    triggers: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `dependent` changes whenever any of `triggers` does.
    ///
    /// Declarations are additive. Triggers may be key paths into nested
    /// objects (`"address.city"`); dependents are plain keys.
    pub fn add<I, S>(&mut self, dependent: &str, triggers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if dependent.is_empty() || dependent.contains('.') {
            return Err(Error::InvalidArgument(format!(
                "dependent key must be a plain key: {dependent:?}"
            )));
        }
        for trigger in triggers {
            let trigger = trigger.into();
            KeyPath::parse(&trigger)?;
            if trigger == dependent {
                continue;
            }

            let dependents = self.dependents.entry(trigger.clone()).or_default();
            if !dependents.iter().any(|d| d == dependent) {
                dependents.push(dependent.to_string());
            }

            let triggers = self.triggers.entry(dependent.to_string()).or_default();
            if !triggers.contains(&trigger) {
                triggers.push(trigger);
            }
        }
        Ok(())
    }

    /// Keys that depend directly on `trigger`.
    pub fn dependents_of(&self, trigger: &str) -> &[String] {
        self.dependents
            .get(trigger)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Triggers declared for `dependent`.
    pub fn triggers_of(&self, dependent: &str) -> &[String] {
        self.triggers
            .get(dependent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keys that depend on `key` itself or on a key path through it.
    ///
    /// Replacing the value held by `key` changes every one of them, so
    /// they are bracketed together with `key`.
    pub fn dependents_through(&self, key: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for (trigger, dependents) in &self.dependents {
            if trigger != key && keypath::strip_key_prefix(trigger, key).is_none() {
                continue;
            }
            for dependent in dependents {
                if !found.contains(dependent) {
                    found.push(dependent.clone());
                }
            }
        }
        found
    }

    /// Whether some trigger is a key path that passes through `key`.
    ///
    /// Such triggers need changes inside the object held by `key` to be
    /// forwarded to the owner.
    pub fn has_nested_trigger_under(&self, key: &str) -> bool {
        self.dependents
            .keys()
            .any(|trigger| keypath::strip_key_prefix(trigger, key).is_some())
    }

    /// Whether `dependent` was declared with at least one key-path trigger.
    pub fn has_nested_triggers(&self, dependent: &str) -> bool {
        self.triggers_of(dependent)
            .iter()
            .any(|trigger| trigger.contains('.'))
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }
}
