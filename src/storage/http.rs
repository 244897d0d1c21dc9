//! HTTP object store
//!
//! Talks to a Supabase-compatible storage endpoint:
//! - `POST {url}/storage/v1/object/{bucket}/{key}` to upload
//! - `{url}/storage/v1/object/public/{bucket}/{key}` to read

use super::{encode_key, ObjectStore, StorageError, UploadOptions};
use crate::config::StorageConfig;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Upload request timeout
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Object store reached over HTTP
pub struct HttpObjectStore {
    client: Client,
    configured: bool,
    url: Option<String>,
    key: Option<SecretString>,
}

/// Error body returned by the store
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Success body returned by the store
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key", default)]
    key: Option<String>,
}

impl HttpObjectStore {
    /// Create a store from configuration
    ///
    /// Missing endpoint or key is not an error here; `is_configured` reports
    /// it so callers can fail before any request is made.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent(concat!("wayfarer/", env!("CARGO_PKG_VERSION")))
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            configured: config.is_complete(),
            url: config
                .url
                .as_deref()
                .map(|u| u.trim().trim_end_matches('/').to_string()),
            key: config.anon_key.clone(),
        })
    }

    fn upload_url(&self, base: &str, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", base, bucket, encode_key(key))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<String, StorageError> {
        let (true, Some(base), Some(secret)) =
            (self.configured, self.url.as_deref(), self.key.as_ref())
        else {
            return Err(StorageError::NotConfigured(
                "storage url and key are required".to_string(),
            ));
        };

        let response = self
            .client
            .post(self.upload_url(base, bucket, key))
            .header(AUTHORIZATION, format!("Bearer {}", secret.expose_secret()))
            .header("apikey", secret.expose_secret())
            .header(CONTENT_TYPE, &options.content_type)
            .header(CACHE_CONTROL, options.cache_control())
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<StoreErrorBody>(&body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("upload failed")
                        .to_string()
                });
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        // The store answers with `bucket/key`; the bare key is what callers keep
        let stored = serde_json::from_slice::<UploadResponse>(&body)
            .ok()
            .and_then(|r| r.key)
            .map(|k| {
                k.strip_prefix(&format!("{}/", bucket))
                    .map(str::to_string)
                    .unwrap_or(k)
            })
            .unwrap_or_else(|| key.to_string());

        Ok(stored)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        let base = self.url.as_deref().unwrap_or_default();
        format!(
            "{}/storage/v1/object/public/{}/{}",
            base,
            bucket,
            encode_key(key)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>, key: Option<&str>) -> StorageConfig {
        StorageConfig {
            url: url.map(str::to_string),
            anon_key: key.map(|k| SecretString::from(k.to_string())),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_configuration_detection() {
        assert!(HttpObjectStore::new(&config(Some("https://x.supabase.co"), Some("k")))
            .unwrap()
            .is_configured());
        assert!(!HttpObjectStore::new(&config(None, Some("k")))
            .unwrap()
            .is_configured());
        assert!(!HttpObjectStore::new(&config(Some("https://x.supabase.co"), Some("  ")))
            .unwrap()
            .is_configured());
    }

    #[test]
    fn test_urls() {
        let store = HttpObjectStore::new(&config(Some("https://x.supabase.co/"), Some("k"))).unwrap();
        assert_eq!(
            store.upload_url("https://x.supabase.co", "images", "ben-thanh.png"),
            "https://x.supabase.co/storage/v1/object/images/ben-thanh.png"
        );
        assert_eq!(
            store.public_url("images", "ben-thanh.png"),
            "https://x.supabase.co/storage/v1/object/public/images/ben-thanh.png"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_upload_fails_without_request() {
        let store = HttpObjectStore::new(&config(None, None)).unwrap();
        let options = UploadOptions {
            content_type: "image/png".to_string(),
            cache_control_secs: 3600,
            upsert: true,
        };
        let result = store.upload("images", "a.png", b"png", &options).await;
        assert!(matches!(result, Err(StorageError::NotConfigured(_))));
    }
}
