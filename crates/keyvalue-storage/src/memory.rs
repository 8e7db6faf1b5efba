//! Process-local storage backend

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::area::StorageArea;
use crate::backend::StorageBackend;
use crate::Result;

/// Operation counters for a [`MemoryBackend`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub reads: usize,
    pub writes: usize,
    pub removes: usize,
}

#[derive(Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryBackend {
    items: Arc<RwLock<HashMap<StorageArea, HashMap<String, Value>>>>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            reads: self.counters.reads.load(Ordering::SeqCst),
            writes: self.counters.writes.load(Ordering::SeqCst),
            removes: self.counters.removes.load(Ordering::SeqCst),
        }
    }

    /// Number of keys currently held in `area`
    pub fn len(&self, area: StorageArea) -> usize {
        self.items.read().get(&area).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, area: StorageArea) -> bool {
        self.len(area) == 0
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            counters: Arc::clone(&self.counters),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .read()
            .get(&area)
            .and_then(|values| values.get(key))
            .cloned())
    }

    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.items.write().entry(area).or_default().extend(items);
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        self.counters.removes.fetch_add(1, Ordering::SeqCst);
        if let Some(values) = self.items.write().get_mut(&area) {
            values.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(key: &str, value: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        map
    }

    #[tokio::test]
    async fn test_areas_are_isolated() {
        let backend = MemoryBackend::new();
        backend
            .set(StorageArea::Sync, items("KeyValue:a", json!({"x": 1})))
            .await
            .unwrap();

        assert_eq!(
            backend.get(StorageArea::Sync, "KeyValue:a").await.unwrap(),
            Some(json!({"x": 1}))
        );
        assert_eq!(
            backend.get(StorageArea::Local, "KeyValue:a").await.unwrap(),
            None
        );
        assert!(backend.is_empty(StorageArea::Local));
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let backend = MemoryBackend::new();
        backend.remove(StorageArea::Local, "nothing").await.unwrap();

        backend
            .set(StorageArea::Local, items("k", json!("v")))
            .await
            .unwrap();
        backend.remove(StorageArea::Local, "k").await.unwrap();
        assert_eq!(backend.get(StorageArea::Local, "k").await.unwrap(), None);

        let stats = backend.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.removes, 2);
        assert_eq!(stats.reads, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        other
            .set(StorageArea::Sync, items("k", json!(true)))
            .await
            .unwrap();

        assert_eq!(backend.len(StorageArea::Sync), 1);
        assert_eq!(backend.stats().writes, 1);
    }
}
