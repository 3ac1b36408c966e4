mod files;
pub mod models;

pub use files::{load_json, save_json};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid encoding: {0}")]
    Encoding(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
