//! KeyValue error types

use std::sync::Arc;
use thiserror::Error;

use keyvalue_storage::StorageError;

#[derive(Error, Debug)]
pub enum KeyValueError {
    #[error("A name must be supplied to the KeyValue instance")]
    MissingName,

    /// Shared because one coalesced write reports to every waiter
    #[error("Storage error: {0}")]
    Storage(#[from] Arc<StorageError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored record is not a key/value mapping: {0}")]
    MalformedRecord(String),

    #[error("Pending write was dropped before completing")]
    WriteAbandoned,
}

impl From<StorageError> for KeyValueError {
    fn from(err: StorageError) -> Self {
        KeyValueError::Storage(Arc::new(err))
    }
}
