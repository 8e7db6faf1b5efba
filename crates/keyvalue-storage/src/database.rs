//! SQLite-backed storage areas

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::area::StorageArea;
use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::Result;

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool
    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

impl Clone for SqliteBackend {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        let raw: Option<String> = self
            .with_connection(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM storage_items WHERE area = ?1 AND key = ?2",
                        [area.as_str(), key.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<()> {
        let mut rows = Vec::with_capacity(items.len());
        for (key, value) in items {
            rows.push((key, serde_json::to_string(&value)?));
        }

        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &rows {
                tx.execute(
                    "INSERT OR REPLACE INTO storage_items (area, key, value, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![area.as_str(), key, value, updated_at],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "DELETE FROM storage_items WHERE area = ?1 AND key = ?2",
                [area.as_str(), key.as_str()],
            )?;
            Ok(())
        })
        .await
    }
}
