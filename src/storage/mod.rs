//! Filesystem document store.
//!
//! Sessions live in a single JSONL file under the data directory; derived
//! per-user aggregates live under `derived/`.

mod jsonl;
mod sessions;

pub use jsonl::*;
pub use sessions::*;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn derived_dir(&self) -> PathBuf {
        self.data_dir.join("derived")
    }

    /// Path of the file backing an entity type.
    pub fn entity_path(&self, entity: EntityType) -> PathBuf {
        match entity {
            EntityType::Session => self.data_dir.join(entity.filename()),
            EntityType::UserStats => self.derived_dir().join(entity.filename()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}
