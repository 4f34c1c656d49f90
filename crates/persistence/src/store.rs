//! Key-value storage contract.
//!
//! The persistent backend and its schema are outside this crate; modules
//! interact with storage only through [`KvStore`]. The in-memory store is
//! the reference implementation, and what every test runs against.

use std::collections::BTreeMap;

/// Minimal key-value surface the node requires from a storage backend.
///
/// Implementations are used exclusively from the persistence module's loop,
/// so blocking I/O inside these methods is acceptable.
pub trait KvStore: Send {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, key: &[u8]);
    /// All `(key, value)` pairs whose key starts with `prefix`, key-ascending.
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// In-memory reference store.
#[derive(Debug, Default)]
pub struct MemKvStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
