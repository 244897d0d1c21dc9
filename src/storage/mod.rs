//! Object storage backends for uploaded images
//!
//! Provides the trait the upload pipeline writes through, an HTTP backend
//! speaking the Supabase storage protocol, and an in-memory backend.

mod http;
mod memory;

pub use http::HttpObjectStore;
pub use memory::{MemoryObjectStore, StoredObject};

use async_trait::async_trait;
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store is not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Object store rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Options sent with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// MIME type stored as the object's content type
    pub content_type: String,
    /// Cache lifetime hint in seconds
    pub cache_control_secs: u64,
    /// Overwrite an existing object at the same key
    pub upsert: bool,
}

impl UploadOptions {
    /// `Cache-Control` header value
    pub fn cache_control(&self) -> String {
        format!("max-age={}", self.cache_control_secs)
    }
}

/// Trait for object store backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether endpoint and credentials are present
    fn is_configured(&self) -> bool;

    /// Store `bytes` at `key` in `bucket`, returning the stored key
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<String, StorageError>;

    /// Public URL of an object
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Percent-encode each path segment of an object key
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_header() {
        let options = UploadOptions {
            content_type: "image/png".to_string(),
            cache_control_secs: 3600,
            upsert: true,
        };
        assert_eq!(options.cache_control(), "max-age=3600");
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("dinh-doc-lap.jpg"), "dinh-doc-lap.jpg");
        assert_eq!(encode_key("legacy/old photo.jpg"), "legacy/old%20photo.jpg");
    }
}
