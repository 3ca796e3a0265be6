use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{validate_object_path, FileStorage, StorageError};
use crate::config::{IdentityConfig, StorageConfig};

/// Client for Supabase-style object storage (`/storage/v1/object`)
pub struct HttpStorage {
    http: Client,
    base: Url,
    api_key: String,
}

impl HttpStorage {
    pub fn new(storage: &StorageConfig, identity: &IdentityConfig) -> Result<Self, StorageError> {
        let mut base = Url::parse(&storage.url)
            .map_err(|e| StorageError::Unavailable(format!("invalid storage url '{}': {}", storage.url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http: Client::new(),
            base,
            api_key: identity.anon_key.clone(),
        })
    }

    fn object_url(&self, prefix: &str, bucket: &str, path: &str) -> String {
        format!(
            "{}storage/v1/object/{}{}/{}",
            self.base,
            prefix,
            bucket,
            path
        )
    }
}

#[async_trait]
impl FileStorage for HttpStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_object_path(path)?;
        let url = self.object_url("", bucket, path);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(self.public_url(bucket, path));
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("upload failed")
            .to_string();

        Err(match status {
            StatusCode::CONFLICT => StorageError::AlreadyExists(format!("{}/{}", bucket, path)),
            s if s.is_server_error() => StorageError::Unavailable(message),
            _ => StorageError::Rejected(message),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_url("public/", bucket, path)
    }
}
