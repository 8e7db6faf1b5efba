//! KeyValue Storage Areas
//!
//! Asynchronous key-value storage facility with two interchangeable areas:
//! `sync` (follows the user across devices) and `local` (stays on this machine).
//! Backends store opaque JSON values under string keys.

mod area;
mod backend;
mod database;
mod error;
mod memory;
mod migrations;

pub use area::StorageArea;
pub use backend::StorageBackend;
pub use database::SqliteBackend;
pub use error::StorageError;
pub use memory::{BackendStats, MemoryBackend};

pub type Result<T> = std::result::Result<T, StorageError>;
