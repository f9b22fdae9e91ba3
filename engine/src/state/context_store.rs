//! Shared key/value context for running workflows
//!
//! Holds JSON values under string keys such as `workflow:{id}` and
//! `workflow:{id}:request`. The store is bounded; once full, writing a new key
//! evicts the least recently used entry. Overwriting an existing key never
//! evicts.

use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::lru::BoundedLru;

/// Bounded, internally synchronized key/value store
#[derive(Debug)]
pub struct ContextStore {
    entries: Mutex<BoundedLru<String, Value>>,
}

impl ContextStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedLru::new(max_entries)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedLru<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some((evicted, _)) = self.lock().insert(key, value) {
            tracing::debug!("Context store full, evicted '{}'", evicted);
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Remove `key`, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_delete() {
        let store = ContextStore::new(10);
        store.set("workflow:1", json!({"status": "created"}));

        assert_eq!(store.get("workflow:1"), Some(json!({"status": "created"})));
        assert!(store.delete("workflow:1"));
        assert!(!store.delete("workflow:1"));
        assert_eq!(store.get("workflow:1"), None);
    }

    #[test]
    fn test_prefix_listing() {
        let store = ContextStore::new(10);
        store.set("workflow:b", json!(1));
        store.set("workflow:a", json!(2));
        store.set("workflow:a:request", json!(3));
        store.set("hitl:pending:x", json!(4));

        assert_eq!(
            store.keys_with_prefix("workflow:"),
            vec!["workflow:a", "workflow:a:request", "workflow:b"]
        );
        assert_eq!(store.keys_with_prefix("hitl:"), vec!["hitl:pending:x"]);
        assert!(store.keys_with_prefix("nothing").is_empty());
    }

    #[test]
    fn test_full_store_evicts_on_new_key_only() {
        let store = ContextStore::new(3);
        store.set("a", json!(1));
        store.set("b", json!(2));
        store.set("c", json!(3));

        // Overwrite: no eviction
        store.set("a", json!(10));
        assert_eq!(store.len(), 3);
        assert!(store.get("b").is_some());

        // "c" is now least recently used ("a" overwritten, "b" read)
        store.set("d", json!(4));
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("d"), Some(json!(4)));
        assert_eq!(store.get("c"), None);
    }

    #[test]
    fn test_clear() {
        let store = ContextStore::default();
        store.set("k", json!(null));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.capacity(), 1000);
    }
}
