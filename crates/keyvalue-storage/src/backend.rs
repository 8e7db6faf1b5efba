//! Backend trait shared by all storage implementations

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::area::StorageArea;
use crate::Result;

/// An asynchronous key-value storage facility.
///
/// Each area is an independent key space. Absence is not an error: `get` of a
/// missing key yields `Ok(None)` and `remove` of a missing key is a no-op.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>>;

    /// Store every entry of `items`, all or nothing.
    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<()>;

    /// Delete `key` from the area.
    async fn remove(&self, area: StorageArea, key: &str) -> Result<()>;
}
