//! Key Path Trie
//!
//! A prefix tree addressed by dotted key paths. Each node corresponds to
//! one key segment and may carry a value. Lookups walk the tree one
//! segment at a time, which makes "longest registered prefix" and "every
//! value beneath this path" queries cheap.
//!
//! ```rust
//! use tether_core::trie::KeyPathTrie;
//!
//! let mut trie = KeyPathTrie::new();
//! trie.add("a.b.c", 1);
//!
//! let found = trie.find_by_prefix("a.b.c.d");
//! assert_eq!(found.value, Some(&1));
//! assert_eq!(found.remainder, vec!["d".to_string()]);
//! ```

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct TrieNode<T> {
    value: Option<T>,
    children: IndexMap<String, TrieNode<T>>,
}

impl<T> TrieNode<T> {
    fn new() -> Self {
        Self {
            value: None,
            children: IndexMap::new(),
        }
    }

    fn is_vacant(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }
}

/// Result of [`KeyPathTrie::find_by_prefix`].
#[derive(Debug, PartialEq)]
pub struct PrefixMatch<'a, T> {
    /// Value stored at the deepest node that exists along the path.
    pub value: Option<&'a T>,
    /// Segments of the requested path below that node.
    pub remainder: Vec<String>,
}

/// Values addressed by dotted key paths.
#[derive(Debug, Clone)]
pub struct KeyPathTrie<T> {
    root: TrieNode<T>,
    len: usize,
}

impl<T> Default for KeyPathTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KeyPathTrie<T> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
            len: 0,
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` at `path`, creating intermediate nodes.
    ///
    /// Returns the value previously stored at exactly that path.
    pub fn add(&mut self, path: &str, value: T) -> Option<T> {
        let mut node = &mut self.root;
        for segment in path.split('.') {
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(TrieNode::new);
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// The value stored at exactly `path`.
    pub fn find(&self, path: &str) -> Option<&T> {
        self.node(path).and_then(|node| node.value.as_ref())
    }

    /// Walk as far along `path` as nodes exist.
    pub fn find_by_prefix(&self, path: &str) -> PrefixMatch<'_, T> {
        let mut node = &self.root;
        let mut segments = path.split('.');
        let mut remainder = Vec::new();

        for segment in segments.by_ref() {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => {
                    remainder.push(segment.to_string());
                    break;
                }
            }
        }
        remainder.extend(segments.map(str::to_string));

        PrefixMatch {
            value: node.value.as_ref(),
            remainder,
        }
    }

    /// Every value stored at or beneath `path`.
    ///
    /// The order of the returned values is unspecified.
    pub fn get_values_with_prefix(&self, path: &str) -> Vec<&T> {
        let mut values = Vec::new();
        let Some(start) = self.node(path) else {
            return values;
        };

        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if let Some(value) = &node.value {
                values.push(value);
            }
            stack.extend(node.children.values());
        }
        values
    }

    /// Remove and return the value at exactly `path`, pruning nodes that no
    /// longer lead anywhere.
    pub fn remove(&mut self, path: &str) -> Option<T> {
        let segments: Vec<&str> = path.split('.').collect();
        let removed = Self::remove_from(&mut self.root, &segments);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_from(node: &mut TrieNode<T>, segments: &[&str]) -> Option<T> {
        let Some((first, rest)) = segments.split_first() else {
            return node.value.take();
        };
        let child = node.children.get_mut(*first)?;
        let removed = Self::remove_from(child, rest);
        if child.is_vacant() {
            node.children.shift_remove(*first);
        }
        removed
    }

    fn node(&self, path: &str) -> Option<&TrieNode<T>> {
        let mut node = &self.root;
        for segment in path.split('.') {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_is_exact() {
        let mut trie = KeyPathTrie::new();
        trie.add("a.b.c", 1);

        assert_eq!(trie.find("a.b.c"), Some(&1));
        assert_eq!(trie.find("a.b"), None);
        assert_eq!(trie.find("a.b.c.d"), None);
        assert_eq!(trie.find("x"), None);
    }

    #[test]
    fn add_overwrites_terminal_value() {
        let mut trie = KeyPathTrie::new();
        assert_eq!(trie.add("a.b", 1), None);
        assert_eq!(trie.add("a.b", 2), Some(1));
        assert_eq!(trie.find("a.b"), Some(&2));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn find_by_prefix_returns_remainder() {
        let mut trie = KeyPathTrie::new();
        trie.add("a.b.c", 1);

        let found = trie.find_by_prefix("a.b.c.d");
        assert_eq!(found.value, Some(&1));
        assert_eq!(found.remainder, vec!["d".to_string()]);

        let found = trie.find_by_prefix("a.x.y");
        assert_eq!(found.value, None);
        assert_eq!(found.remainder, vec!["x".to_string(), "y".to_string()]);

        let found = trie.find_by_prefix("a.b.c");
        assert_eq!(found.value, Some(&1));
        assert!(found.remainder.is_empty());
    }

    #[test]
    fn values_with_prefix_are_each_returned_once() {
        let mut trie = KeyPathTrie::new();
        trie.add("a", 1);
        trie.add("a.b", 2);
        trie.add("a.b.c", 3);
        trie.add("a.d", 4);
        trie.add("e", 5);

        let mut values: Vec<i32> = trie.get_values_with_prefix("a").into_iter().copied().collect();
        values.sort();
        assert_eq!(values, vec![1, 2, 3, 4]);

        let mut values: Vec<i32> = trie.get_values_with_prefix("a.b").into_iter().copied().collect();
        values.sort();
        assert_eq!(values, vec![2, 3]);

        assert!(trie.get_values_with_prefix("z").is_empty());
    }

    #[test]
    fn remove_prunes_vacant_nodes() {
        let mut trie = KeyPathTrie::new();
        trie.add("a.b.c", 1);
        trie.add("a.d", 2);

        assert_eq!(trie.remove("a.b.c"), Some(1));
        assert_eq!(trie.remove("a.b.c"), None);
        assert_eq!(trie.len(), 1);

        let found = trie.find_by_prefix("a.b.c");
        assert_eq!(found.remainder, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(trie.find("a.d"), Some(&2));
    }
}
