//! Observer identities and registrations.
//!
//! An observer is anything that wants change notifications: a view, a
//! controller, a binding, or the parent link that forwards a nested
//! object's changes to its owner. Observers are identified by an
//! [`ObserverId`]; each call to `add_observer_for_key_path` produces one
//! [`ObserverEntry`] with its own registration id.
//!
//! Parent links are kept apart from observer registrations. They receive
//! every change of the child like an all-properties observer, but they do
//! not make the child forward what happens inside its own children.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::change::ChangeNotification;
use super::descriptor::ParentLink;
use crate::trie::KeyPathTrie;
use crate::value::Value;

/// Unique identifier for an observer.
///
/// The same id may be registered for several key paths and on several
/// objects; removal is by (id, key path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a single registration, returned by
/// `add_observer_for_key_path`. Used to remove exactly that registration,
/// and with the key path for per-change delivery deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked with `(change, key_path, context)`.
pub type ObserverFn = Arc<dyn Fn(&ChangeNotification, &str, Option<&Value>) + Send + Sync>;

/// One observer registered for one key path on one object.
pub struct ObserverEntry {
    registration: RegistrationId,
    observer: ObserverId,
    callback: ObserverFn,
    context: Option<Value>,
    /// Cleared on removal so a dispatch already in progress skips it.
    active: AtomicBool,
}

impl ObserverEntry {
    pub(crate) fn new(observer: ObserverId, callback: ObserverFn, context: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            registration: RegistrationId::next(),
            observer,
            callback,
            context,
            active: AtomicBool::new(true),
        })
    }

    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Deliver a change to this observer.
    ///
    /// Returns `false` without calling back when the entry was removed or
    /// already received this change for `key_path`.
    pub(crate) fn observe(&self, change: &ChangeNotification, key_path: &str) -> bool {
        if !self.is_active() || !change.mark_notified(self.registration, key_path) {
            return false;
        }
        (self.callback)(change, key_path, self.context.as_ref());
        true
    }
}

impl std::fmt::Debug for ObserverEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverEntry")
            .field("registration", &self.registration)
            .field("observer", &self.observer)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Registrations of one object, keyed by key path.
///
/// Entries for a path are kept in registration order. The set of observed
/// paths is mirrored in a [`KeyPathTrie`] so that "every observed path
/// beneath this key" is a subtree walk.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: IndexMap<String, Vec<Arc<ObserverEntry>>>,
    paths: KeyPathTrie<String>,
    /// Forwarders installed by the owners holding this object.
    parent_links: Vec<(ParentLink, Arc<ObserverEntry>)>,
}

impl ObserverRegistry {
    pub(crate) fn add(&mut self, key_path: &str, entry: Arc<ObserverEntry>) {
        self.entries
            .entry(key_path.to_string())
            .or_default()
            .push(entry);
        if self.paths.find(key_path).is_none() {
            self.paths.add(key_path, key_path.to_string());
        }
    }

    /// Remove every registration of `observer` for `key_path`.
    pub(crate) fn remove(&mut self, observer: ObserverId, key_path: &str) -> Vec<Arc<ObserverEntry>> {
        let Some(list) = self.entries.get_mut(key_path) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) = list
            .drain(..)
            .partition(|entry| entry.observer() == observer);
        if kept.is_empty() {
            self.entries.shift_remove(key_path);
            self.paths.remove(key_path);
        } else {
            *list = kept;
        }
        removed
    }

    /// Remove the single registration `registration` for `key_path`.
    pub(crate) fn remove_registration(
        &mut self,
        registration: RegistrationId,
        key_path: &str,
    ) -> Option<Arc<ObserverEntry>> {
        let list = self.entries.get_mut(key_path)?;
        let index = list
            .iter()
            .position(|entry| entry.registration() == registration)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.entries.shift_remove(key_path);
            self.paths.remove(key_path);
        }
        Some(removed)
    }

    /// Remove every observer registration, returning them. Parent links
    /// belong to the owners and are kept.
    pub(crate) fn clear(&mut self) -> Vec<Arc<ObserverEntry>> {
        self.paths = KeyPathTrie::new();
        self.entries.drain(..).flat_map(|(_, list)| list).collect()
    }

    pub(crate) fn add_parent_link(&mut self, link: ParentLink, entry: Arc<ObserverEntry>) {
        self.parent_links.push((link, entry));
    }

    pub(crate) fn remove_parent_link(&mut self, observer: ObserverId) -> Option<Arc<ObserverEntry>> {
        let index = self
            .parent_links
            .iter()
            .position(|(link, _)| link.observer == observer)?;
        Some(self.parent_links.remove(index).1)
    }

    pub(crate) fn parent_links(&self) -> Vec<ParentLink> {
        self.parent_links.iter().map(|(link, _)| link.clone()).collect()
    }

    pub(crate) fn parent_link_entries(&self) -> Vec<Arc<ObserverEntry>> {
        self.parent_links.iter().map(|(_, entry)| Arc::clone(entry)).collect()
    }

    pub(crate) fn entries(&self, key_path: &str) -> Vec<Arc<ObserverEntry>> {
        self.entries.get(key_path).cloned().unwrap_or_default()
    }

    pub(crate) fn has_entries(&self, key_path: &str) -> bool {
        self.entries.contains_key(key_path)
    }

    /// Observed key paths strictly beneath `key_path`.
    pub(crate) fn paths_beneath(&self, key_path: &str) -> Vec<String> {
        self.paths
            .get_values_with_prefix(key_path)
            .into_iter()
            .filter(|path| path.as_str() != key_path)
            .cloned()
            .collect()
    }

    pub(crate) fn has_paths_beneath(&self, key_path: &str) -> bool {
        self.paths
            .get_values_with_prefix(key_path)
            .into_iter()
            .any(|path| path.as_str() != key_path)
    }

    pub(crate) fn key_paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Total number of registrations, parent links included.
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum::<usize>() + self.parent_links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_ids_are_unique() {
        let id1 = ObserverId::new();
        let id2 = ObserverId::new();
        let id3 = ObserverId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn deactivated_entry_is_skipped() {
        use std::sync::atomic::AtomicUsize;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let entry = ObserverEntry::new(
            ObserverId::new(),
            Arc::new(move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        );

        let change = ChangeNotification::detached(Value::from(1), Value::Null);
        assert!(entry.observe(&change, "key"));
        // Same change twice is deduplicated.
        assert!(!entry.observe(&change, "key"));
        assert!(entry.observe(&change, "other"));

        entry.deactivate();
        let change = ChangeNotification::detached(Value::from(2), Value::Null);
        assert!(!entry.observe(&change, "key"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn noop_entry(observer: ObserverId) -> Arc<ObserverEntry> {
        ObserverEntry::new(observer, Arc::new(|_, _, _| {}), None)
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = ObserverRegistry::default();
        let first = ObserverId::new();
        let second = ObserverId::new();
        registry.add("name", noop_entry(first));
        registry.add("name", noop_entry(second));

        let observers: Vec<_> = registry.entries("name").iter().map(|e| e.observer()).collect();
        assert_eq!(observers, vec![first, second]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_finds_paths_beneath_a_key() {
        let mut registry = ObserverRegistry::default();
        let observer = ObserverId::new();
        registry.add("a", noop_entry(observer));
        registry.add("a.b.c", noop_entry(observer));
        registry.add("a.d", noop_entry(observer));
        registry.add("ab", noop_entry(observer));

        let mut beneath = registry.paths_beneath("a");
        beneath.sort();
        assert_eq!(beneath, vec!["a.b.c".to_string(), "a.d".to_string()]);
        assert!(registry.has_paths_beneath("a.b"));
        assert!(!registry.has_paths_beneath("ab"));
    }

    #[test]
    fn registry_removal_is_per_observer_and_path() {
        let mut registry = ObserverRegistry::default();
        let keep = ObserverId::new();
        let gone = ObserverId::new();
        registry.add("a.b", noop_entry(keep));
        registry.add("a.b", noop_entry(gone));
        registry.add("a.c", noop_entry(gone));

        assert_eq!(registry.remove(gone, "a.b").len(), 1);
        assert!(registry.has_entries("a.b"));
        assert_eq!(registry.remove(gone, "a.c").len(), 1);
        assert!(!registry.has_entries("a.c"));
        assert_eq!(registry.paths_beneath("a"), vec!["a.b".to_string()]);
        assert!(registry.remove(gone, "missing").is_empty());
    }

    #[test]
    fn registration_removal_keeps_same_observer_elsewhere() {
        let mut registry = ObserverRegistry::default();
        let shared = ObserverId::new();
        let first = noop_entry(shared);
        let second = noop_entry(shared);
        registry.add("title", Arc::clone(&first));
        registry.add("title", Arc::clone(&second));

        let removed = registry.remove_registration(first.registration(), "title").unwrap();
        assert_eq!(removed.registration(), first.registration());
        assert_eq!(registry.entries("title")[0].registration(), second.registration());
        assert!(registry.remove_registration(first.registration(), "title").is_none());

        registry.remove_registration(second.registration(), "title");
        assert!(!registry.has_entries("title"));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn parent_links_are_not_observed_paths() {
        let mut registry = ObserverRegistry::default();
        let link = ParentLink {
            owner: Default::default(),
            key: "child".to_string(),
            observer: ObserverId::new(),
        };
        registry.add_parent_link(link.clone(), noop_entry(link.observer));

        assert!(!registry.has_entries(crate::kvo::keypath::ALL_PROPERTIES));
        assert!(registry.key_paths().is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.parent_links()[0].key, "child");

        registry.clear();
        assert_eq!(registry.parent_link_entries().len(), 1);
        assert!(registry.remove_parent_link(link.observer).is_some());
        assert!(registry.remove_parent_link(link.observer).is_none());
        assert_eq!(registry.len(), 0);
    }
}
