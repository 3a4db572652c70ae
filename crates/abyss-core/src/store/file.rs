//! File-backed store: one file per key.
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so readers see either the previous value or the new one.

use super::LocalStore;
use crate::config::FeedConfig;
use crate::{AbyssError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the platform's local data directory (`.../abyss/store`).
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| AbyssError::Config {
            message: "Could not determine the local data directory".to_string(),
        })?;
        Ok(Self::new(base.join(FeedConfig::STORE_DIR_NAME).join("store")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.root.join(format!("{}.json", safe_key))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AbyssError::io_with_path(e, path)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| AbyssError::Io {
            message: format!("Failed to create store directory: {}", e),
            path: Some(self.root.clone()),
            source: Some(e),
        })?;

        let path = self.path_for(key);
        let temp_path = path.with_extension(format!(
            "json.{}.{}.tmp",
            process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write_result = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(AbyssError::Io {
                message: format!("Failed to write temp file {}", temp_path.display()),
                path: Some(temp_path),
                source: Some(e),
            });
        }

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AbyssError::Io {
                message: format!("Failed to rename {} to {}", temp_path.display(), path.display()),
                path: Some(path.clone()),
                source: Some(e),
            }
        })?;

        debug!("Stored {} ({} bytes)", path.display(), value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AbyssError::io_with_path(e, path)),
        }
    }
}
