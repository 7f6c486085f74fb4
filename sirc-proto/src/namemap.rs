//! A string-keyed map that compares keys under an IRC casemapping.
//!
//! This is the index type used for channels, channel members and users:
//! keys hash and compare in their folded form while the first-inserted
//! original-case spelling is kept for display.

use std::collections::hash_map::{self, HashMap};

use crate::casemap::CaseMapping;

#[derive(Debug, Clone)]
struct Entry<V> {
    /// Original-case key, as first inserted. Survives value replacement.
    key: String,
    value: V,
}

/// A case-insensitive string map parameterised by a [`CaseMapping`].
#[derive(Debug, Clone)]
pub struct NameMap<V> {
    casemap: CaseMapping,
    inner: HashMap<String, Entry<V>>,
}

impl<V> NameMap<V> {
    /// Creates an empty map using the given casemapping.
    pub fn new(casemap: CaseMapping) -> NameMap<V> {
        NameMap {
            casemap,
            inner: HashMap::new(),
        }
    }

    /// The casemapping this map folds keys under.
    pub fn casemap(&self) -> CaseMapping {
        self.casemap
    }

    /// Inserts or replaces the value for `key`. When the key already exists
    /// (under folded comparison), the value is replaced but the stored
    /// original-case key is left untouched. Returns the previous value.
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        match self.inner.entry(self.casemap.fold(key)) {
            hash_map::Entry::Occupied(mut o) => {
                Some(std::mem::replace(&mut o.get_mut().value, value))
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(Entry {
                    key: key.to_owned(),
                    value,
                });
                None
            }
        }
    }

    /// Looks up `key` under folded comparison.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(&self.casemap.fold(key)).map(|e| &e.value)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.inner
            .get_mut(&self.casemap.fold(key))
            .map(|e| &mut e.value)
    }

    /// The stored original-case spelling of `key`, if present.
    pub fn original_key(&self, key: &str) -> Option<&str> {
        self.inner
            .get(&self.casemap.fold(key))
            .map(|e| e.key.as_str())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.inner.remove(&self.casemap.fold(key)).map(|e| e.value)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(&self.casemap.fold(key))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(original-case key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.inner.values().map(|e| (e.key.as_str(), &e.value))
    }

    /// Iterates with mutable access to the values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.inner
            .values_mut()
            .map(|e| (e.key.as_str(), &mut e.value))
    }

    /// Iterates over the original-case keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.values().map(|e| e.key.as_str())
    }

    /// Keeps only the entries for which `f` returns true. This is the
    /// delete-while-iterating operation.
    pub fn retain<F: FnMut(&str, &mut V) -> bool>(&mut self, mut f: F) {
        self.inner.retain(|_, e| f(e.key.as_str(), &mut e.value));
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn put_get_del() {
        let mut m: NameMap<i32> = NameMap::new(CaseMapping::Rfc1459);
        assert!(m.is_empty());
        assert_eq!(m.insert("Alice", 1), None);
        assert_eq!(m.get("alice"), Some(&1));
        assert_eq!(m.insert("ALICE", 2), Some(1));
        assert_eq!(m.get("alice"), Some(&2));
        assert_eq!(m.len(), 1);
        assert_eq!(m.remove("aLiCe"), Some(2));
        assert_eq!(m.get("Alice"), None);
    }

    #[test]
    fn original_case_survives_replacement() {
        let mut m: NameMap<i32> = NameMap::new(CaseMapping::Ascii);
        m.insert("MixedCase", 1);
        m.insert("mixedcase", 2);
        assert_eq!(m.original_key("MIXEDCASE"), Some("MixedCase"));
        assert_eq!(m.get("mixedCASE"), Some(&2));
    }

    #[test]
    fn rfc1459_key_folding() {
        let mut m: NameMap<&str> = NameMap::new(CaseMapping::Rfc1459);
        m.insert("[soft]", "a");
        assert!(m.contains("{soft}"));
        assert_eq!(m.get("{SOFT}"), Some(&"a"));

        let mut m: NameMap<&str> = NameMap::new(CaseMapping::Ascii);
        m.insert("[soft]", "a");
        assert!(!m.contains("{soft}"));
    }

    #[test]
    fn retain_removes_current() {
        let mut m: NameMap<i32> = NameMap::new(CaseMapping::Ascii);
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            m.insert(k, v);
        }
        m.retain(|_, v| *v != 2);
        assert_eq!(m.len(), 2);
        assert!(m.contains("a"));
        assert!(!m.contains("b"));
        assert!(m.contains("c"));
    }
}
