//! Namespaced key-value store
//!
//! All keys of one namespace are kept together in a single backend record
//! stored under `"KeyValue:<name>"`. The in-memory cache assumes this
//! instance is the only writer of that record. Deleting keys or switching
//! areas starts a new cache epoch, and backend reads begun in an earlier
//! epoch are not cached.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use keyvalue_storage::{SqliteBackend, StorageArea, StorageBackend};

use crate::coalesce::WriteCoalescer;
use crate::config::{Config, DEFAULT_WRITE_WINDOW_MS};
use crate::error::KeyValueError;
use crate::Result;

/// Prefix of every backend record key
pub const GLOBAL_KEY_PREFIX: &str = "KeyValue";

#[derive(Default)]
struct ReadCache {
    values: HashMap<String, Value>,
    /// Bumped whenever entries are invalidated
    epoch: u64,
}

impl ReadCache {
    fn invalidate(&mut self, key: &str) {
        self.values.remove(key);
        self.epoch += 1;
    }

    fn invalidate_all(&mut self) {
        self.values.clear();
        self.epoch += 1;
    }
}

pub struct KeyValue {
    name: String,
    /// Storage area used by subsequent operations
    area: Arc<RwLock<StorageArea>>,
    /// Read cache for the current area
    cache: Arc<RwLock<ReadCache>>,
    backend: Arc<dyn StorageBackend>,
    writer: WriteCoalescer,
}

impl KeyValue {
    pub fn new(name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self::build(
            name.into(),
            backend,
            StorageArea::Sync,
            std::time::Duration::from_millis(DEFAULT_WRITE_WINDOW_MS),
        )
    }

    /// Open `name` on the SQLite database named by `config`, creating the
    /// database directory if needed.
    pub fn open(name: impl Into<String>, config: &Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let backend = SqliteBackend::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "Opened key-value database");

        Ok(Self::with_config(name, Arc::new(backend), config))
    }

    pub fn with_config(
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        config: &Config,
    ) -> Self {
        Self::build(
            name.into(),
            backend,
            config.default_area,
            config.write_window(),
        )
    }

    fn build(
        name: String,
        backend: Arc<dyn StorageBackend>,
        area: StorageArea,
        write_window: std::time::Duration,
    ) -> Self {
        Self {
            name,
            area: Arc::new(RwLock::new(area)),
            cache: Arc::new(RwLock::new(ReadCache::default())),
            writer: WriteCoalescer::new(Arc::clone(&backend), write_window),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn area(&self) -> StorageArea {
        *self.area.read()
    }

    /// Keep data on this machine only
    pub fn use_local(&self) -> &Self {
        self.switch_area(StorageArea::Local);
        self
    }

    /// Synchronize data across devices (the default)
    pub fn use_sync(&self) -> &Self {
        self.switch_area(StorageArea::Sync);
        self
    }

    fn switch_area(&self, area: StorageArea) {
        let mut current = self.area.write();
        if *current != area {
            *current = area;
            // Cached values belong to the area they were read from
            self.cache.write().invalidate_all();
        }
    }

    /// Backend key holding this namespace's record
    pub fn global_key(&self) -> Result<String> {
        if self.name.is_empty() {
            return Err(KeyValueError::MissingName);
        }
        Ok(format!("{}:{}", GLOBAL_KEY_PREFIX, self.name))
    }

    /// Set `key` to `value`, resolving with the stored value.
    ///
    /// Setting a key to the value already cached for it resolves immediately
    /// without touching the backend.
    pub async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let global_key = self.global_key()?;

        if self.cache.read().values.get(key) == Some(&value) {
            tracing::debug!(name = %self.name, key = %key, "Value unchanged, skipping write");
            return Ok(value);
        }

        self.cache
            .write()
            .values
            .insert(key.to_string(), value.clone());

        let area = self.area();
        match self.store(area, global_key, key, value.clone()).await {
            Ok(()) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    name = %self.name,
                    area = %area,
                    key = %key,
                    error = %e,
                    "Failed to store value"
                );
                self.evict_if_unchanged(key, &value);
                Err(e)
            }
        }
    }

    async fn store(
        &self,
        area: StorageArea,
        global_key: String,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let mut record = self.read_record(area, &global_key).await?;
        record.insert(key.to_string(), value);
        self.writer.submit(area, global_key, record).await
    }

    fn evict_if_unchanged(&self, key: &str, value: &Value) {
        let mut cache = self.cache.write();
        if cache.values.get(key) == Some(value) {
            cache.values.remove(key);
        }
    }

    /// Get the value associated with `key`; `None` if it was never set.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let global_key = self.global_key()?;

        let epoch = {
            let cache = self.cache.read();
            if let Some(value) = cache.values.get(key) {
                return Ok(Some(value.clone()));
            }
            cache.epoch
        };

        let mut record = self.read_record(self.area(), &global_key).await?;
        let value = record.remove(key);
        if let Some(value) = &value {
            let mut cache = self.cache.write();
            // Skip if a delete or clear ran while the record was being read
            if cache.epoch == epoch {
                cache
                    .values
                    .entry(key.to_string())
                    .or_insert_with(|| value.clone());
            }
        }

        Ok(value)
    }

    /// Remove `key`. Deleting a key that was never set is not an error.
    pub async fn del(&self, key: &str) -> Result<()> {
        let global_key = self.global_key()?;
        self.cache.write().invalidate(key);

        let area = self.area();
        let mut record = self.read_record(area, &global_key).await?;
        if record.remove(key).is_none() {
            return Ok(());
        }

        self.writer.submit(area, global_key, record).await
    }

    /// Remove every key of this namespace from the current area.
    pub async fn clear(&self) -> Result<()> {
        let global_key = self.global_key()?;
        self.cache.write().invalidate_all();

        let area = self.area();
        self.backend.remove(area, &global_key).await?;

        tracing::info!(name = %self.name, area = %area, "Cleared namespace");

        Ok(())
    }

    pub async fn set_as<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.set(key, serde_json::to_value(value)?).await?;
        Ok(())
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn read_record(&self, area: StorageArea, global_key: &str) -> Result<Map<String, Value>> {
        match self.backend.get(area, global_key).await? {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(record)) => Ok(record),
            Some(_) => Err(KeyValueError::MalformedRecord(global_key.to_string())),
        }
    }
}

impl Clone for KeyValue {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            area: Arc::clone(&self.area),
            cache: Arc::clone(&self.cache),
            backend: Arc::clone(&self.backend),
            writer: self.writer.clone(),
        }
    }
}
