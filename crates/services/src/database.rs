//! In-memory keyed record store backing each collaborator stub.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryDatabase<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryDatabase<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryDatabase<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryDatabase<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    /// Insert `value` unless `key` is already present. Returns whether it was
    /// inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut map = match self.inner.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Store a record under a freshly minted key, minting again while the key
    /// is already taken. Returns the key used.
    pub fn insert_with_fresh_key(
        &self,
        mut mint: impl FnMut() -> K,
        build: impl FnOnce(&K) -> V,
    ) -> K {
        let mut map = match self.inner.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut key = mint();
        while map.contains_key(&key) {
            key = mint();
        }
        map.insert(key.clone(), build(&key));
        key
    }

    pub fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_absent_keeps_first_value() {
        let db: InMemoryDatabase<u32, &str> = InMemoryDatabase::new();
        assert!(db.insert_if_absent(1, "a"));
        assert!(!db.insert_if_absent(1, "b"));
        assert_eq!(db.get(&1), Some("a"));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn fresh_key_skips_taken_keys() {
        let db: InMemoryDatabase<u32, String> = InMemoryDatabase::new();
        assert!(db.insert_if_absent(1, "taken".to_string()));
        assert!(db.insert_if_absent(2, "taken".to_string()));

        let mut candidates = [1u32, 2, 1, 7].into_iter();
        let mut minted = 0;
        let key = db.insert_with_fresh_key(
            || {
                minted += 1;
                candidates.next().unwrap_or(99)
            },
            |k| format!("record {k}"),
        );

        assert_eq!(key, 7);
        assert_eq!(minted, 4);
        assert_eq!(db.get(&7), Some("record 7".to_string()));
        assert_eq!(db.get(&1), Some("taken".to_string()));
        assert_eq!(db.len(), 3);
    }
}
