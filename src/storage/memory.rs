//! In-memory object store

use super::{encode_key, ObjectStore, StorageError, UploadOptions};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub options: UploadOptions,
}

/// Object store kept in memory, with call counting and failure injection
pub struct MemoryObjectStore {
    base_url: String,
    configured: bool,
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    upload_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            configured: true,
            objects: RwLock::new(HashMap::new()),
            upload_calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// A store that reports missing credentials
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new("")
        }
    }

    /// Number of upload calls received, including failed ones
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Make the next upload fail with a network error
    pub fn fail_next_upload(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Fetch a stored object
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
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
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        if !self.configured {
            return Err(StorageError::NotConfigured("memory store disabled".to_string()));
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Network("connection reset".to_string()));
        }

        let mut objects = self.objects.write();
        let id = (bucket.to_string(), key.to_string());
        if !options.upsert && objects.contains_key(&id) {
            return Err(StorageError::Rejected {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        objects.insert(
            id,
            StoredObject {
                bytes: bytes.to_vec(),
                options: options.clone(),
            },
        );

        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket,
            encode_key(key)
        )
    }
}
