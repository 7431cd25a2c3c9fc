//! The metadata store is treated as an opaque ordered key-value map with
//! single-key ACID semantics (spec.md §1, §6). `OrderedStore` is the
//! boundary; `MemStore` is the one in-process implementation, a
//! `BTreeMap<String, Vec<u8>>` guarded by a single `RwLock`, which trivially
//! satisfies "every call is a single ACID operation" since each call holds
//! the lock for its own duration and never straddles two calls.

use std::collections::BTreeMap;

use parking_lot::RwLock;

pub trait OrderedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: Vec<u8>);
    fn delete(&self, key: &str) -> bool;
    fn contains(&self, key: &str) -> bool;
    /// All values whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)>;
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderedStore for MemStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        self.inner.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.inner
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn region_key(region_id: u64) -> String {
    format!("region/{region_id}")
}

pub fn region_name_key(name: &str) -> String {
    format!("region_name/{name}")
}

pub fn item_key(region_id: u64, offset: u64) -> String {
    format!("item/{region_id}/{offset}")
}

pub fn item_name_key(region_id: u64, name: &str) -> String {
    format!("item_name/{region_id}/{name}")
}

pub fn item_prefix(region_id: u64) -> String {
    format!("item/{region_id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_prefix_is_isolated_from_siblings() {
        let store = MemStore::new();
        store.put(&item_key(1, 0), b"a".to_vec());
        store.put(&item_key(1, 64), b"b".to_vec());
        store.put(&item_key(2, 0), b"c".to_vec());

        let items = store.scan_prefix(&item_prefix(1));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn delete_then_get_is_none() {
        let store = MemStore::new();
        store.put("k", b"v".to_vec());
        assert!(store.delete("k"));
        assert!(store.get("k").is_none());
    }
}
