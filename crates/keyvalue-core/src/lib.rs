//! KeyValue Core
//!
//! Namespaced key-value store over an asynchronous storage area.
//! Every key of a namespace lives in one backend record stored under
//! `"KeyValue:<name>"`. Reads go through an in-memory cache and record
//! writes issued close together are coalesced into one backend write.

mod coalesce;
mod config;
mod error;
mod keyvalue;

pub use config::Config;
pub use error::KeyValueError;
pub use keyvalue::{KeyValue, GLOBAL_KEY_PREFIX};

// Re-export storage backends
pub use keyvalue_storage::{
    BackendStats, MemoryBackend, SqliteBackend, StorageArea, StorageBackend, StorageError,
};

pub type Result<T> = std::result::Result<T, KeyValueError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
