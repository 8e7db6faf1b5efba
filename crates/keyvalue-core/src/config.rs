//! Store configuration

use keyvalue_storage::StorageArea;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WRITE_WINDOW_MS: u64 = 100;
/// Longest write window accepted; larger settings are clamped to it
pub const MAX_WRITE_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database backing the storage areas
    pub database_path: PathBuf,
    /// Area new instances start in
    pub default_area: StorageArea,
    /// Quiet period before coalesced writes reach the backend
    pub write_window_ms: u64,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("keyvalue.db"),
            default_area: StorageArea::Sync,
            write_window_ms: DEFAULT_WRITE_WINDOW_MS,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("keyvalue"))
            .unwrap_or_else(|| PathBuf::from(".keyvalue"))
    }

    pub fn write_window(&self) -> Duration {
        Duration::from_millis(self.write_window_ms.min(MAX_WRITE_WINDOW_MS))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/data"));
        assert_eq!(config.database_path, PathBuf::from("/data/keyvalue.db"));
        assert_eq!(config.default_area, StorageArea::Sync);
        assert_eq!(config.write_window(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"default_area": "local", "write_window_ms": 0}"#).unwrap();
        assert_eq!(config.default_area, StorageArea::Local);
        assert_eq!(config.write_window(), Duration::ZERO);
        assert!(config.database_path.ends_with("keyvalue.db"));
    }

    #[test]
    fn test_write_window_is_clamped() {
        let config: Config =
            serde_json::from_str(&format!(r#"{{"write_window_ms": {}}}"#, u64::MAX)).unwrap();
        assert_eq!(
            config.write_window(),
            Duration::from_millis(MAX_WRITE_WINDOW_MS)
        );
    }
}
