pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Object storage for uploaded files (payment proofs)
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` at `bucket/path` and return the object's public URL
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Object keys are relative, slash-separated and free of `..` segments
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && path.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

/// Content type guessed from a file extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
