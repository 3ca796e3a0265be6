use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{validate_object_path, FileStorage, StorageError};

/// In-process object storage, keyed by `bucket/path`
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Stored bytes and content type of an object
    pub async fn get(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().await.get(&format!("{}/{}", bucket, path)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_object_path(path)?;
        let key = format!("{}/{}", bucket, path);

        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }
        objects.insert(key, (content_type.to_string(), bytes));
        Ok(self.public_url(bucket, path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_once_per_path() {
        let storage = MemoryStorage::new("http://localhost:3000/");
        let url = storage.upload("b", "u1/a.png", vec![1, 2], "image/png").await.unwrap();
        assert_eq!(url, "http://localhost:3000/storage/v1/object/public/b/u1/a.png");
        assert_eq!(storage.get("b", "u1/a.png").await, Some(("image/png".to_string(), vec![1, 2])));

        let again = storage.upload("b", "u1/a.png", vec![3], "image/png").await;
        assert!(matches!(again, Err(StorageError::AlreadyExists(_))));
        assert_eq!(storage.len().await, 1);
    }
}
