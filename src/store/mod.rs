pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub config_versions: sled::Tree,
    pub exports: sled::Tree,
    pub export_dates: sled::Tree,
    pub files: sled::Tree,
    pub file_contents: sled::Tree,
    pub folders: sled::Tree,
    pub activity_log: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;
        let exports = db.open_tree(trees::EXPORTS)?;
        let export_dates = db.open_tree(trees::EXPORT_DATES)?;
        let files = db.open_tree(trees::FILES)?;
        let file_contents = db.open_tree(trees::FILE_CONTENTS)?;
        let folders = db.open_tree(trees::FOLDERS)?;
        let activity_log = db.open_tree(trees::ACTIVITY_LOG)?;

        Ok(Self {
            db,
            config_versions,
            exports,
            export_dates,
            files,
            file_contents,
            folders,
            activity_log,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
