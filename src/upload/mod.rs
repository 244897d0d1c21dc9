//! Image upload pipeline
//!
//! Validates a selected image, derives its storage key and writes it to the
//! object store with overwrite semantics:
//! - type must be `image/*`, size at most the configured ceiling (5 MiB)
//! - missing store configuration is reported before any request
//! - the result is the bare key; URLs are derived from it separately

mod control;
mod preview;
mod slug;

pub use control::UploadControl;
pub use preview::{LocalPreview, PreviewRegistry, PREVIEW_URL_PREFIX};
pub use slug::{fallback_stem, file_extension, slugify, storage_key, DEFAULT_EXTENSION};

use crate::auth::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::storage::{ObjectStore, StorageError, UploadOptions};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upload errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("An image is required")]
    Missing,

    #[error("Invalid file type: {0} (expected an image)")]
    InvalidType(String),

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Image file is empty")]
    Empty,

    #[error("Image storage is not configured: {0}")]
    Configuration(String),

    #[error("Upload failed: {0}")]
    Failed(String),

    #[error("An upload is already in progress")]
    Busy,
}

impl UploadError {
    /// Whether the error comes from the input rather than the environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::Missing
                | UploadError::InvalidType(_)
                | UploadError::TooLarge { .. }
                | UploadError::Empty
        )
    }
}

/// A file chosen by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Original file name, used for the extension
    pub file_name: String,
    /// Declared MIME type
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, declaring its type from the extension
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// MIME type for a file name, by extension
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// One upload call's input
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Selected file, if any
    pub file: Option<ImageFile>,
    /// Name of the entity the image belongs to
    pub subject_name: Option<String>,
    /// Whether a missing file is an error
    pub required: bool,
}

impl UploadRequest {
    /// Upload `file` for the entity named `subject_name`
    pub fn for_subject(file: ImageFile, subject_name: impl Into<String>) -> Self {
        Self {
            file: Some(file),
            subject_name: Some(subject_name.into()),
            required: true,
        }
    }

    /// Upload `file` under a generated key
    pub fn anonymous(file: ImageFile) -> Self {
        Self {
            file: Some(file),
            subject_name: None,
            required: true,
        }
    }
}

/// A completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Key to persist on the entity
    pub key: String,
    /// Public URL for immediate display only; persist `key` instead
    pub preview_url: String,
}

/// Validates, names and uploads images
pub struct ImageUploader {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    bucket: String,
    cache_control_secs: u64,
    max_bytes: usize,
}

impl ImageUploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            bucket: config.bucket.clone(),
            cache_control_secs: config.cache_control_secs,
            max_bytes: config.max_upload_bytes,
        }
    }

    /// Use `clock` for fallback key timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check type and size without touching the network
    pub fn validate(&self, file: &ImageFile) -> Result<(), UploadError> {
        let content_type = file.content_type.trim().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(UploadError::InvalidType(file.content_type.clone()));
        }
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if file.size() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: file.size(),
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Run the pipeline
    ///
    /// Returns `Ok(None)` when no file was given and none was required.
    pub async fn upload(&self, request: UploadRequest) -> Result<Option<UploadedImage>, UploadError> {
        let Some(file) = request.file else {
            return if request.required {
                Err(UploadError::Missing)
            } else {
                Ok(None)
            };
        };

        self.validate(&file)?;

        if !self.store.is_configured() {
            return Err(UploadError::Configuration(
                "storage url and key are required".to_string(),
            ));
        }

        let key = {
            let mut rng = rand::thread_rng();
            storage_key(
                request.subject_name.as_deref(),
                &file.file_name,
                &file.content_type,
                self.clock.now(),
                &mut rng,
            )
        };
        debug!(key = %key, subject = ?request.subject_name, "Derived storage key");

        let options = UploadOptions {
            content_type: file.content_type.trim().to_string(),
            cache_control_secs: self.cache_control_secs,
            upsert: true,
        };

        match self
            .store
            .upload(&self.bucket, &key, &file.bytes, &options)
            .await
        {
            Ok(stored) => {
                info!(key = %stored, size = file.size(), "Image uploaded");
                Ok(Some(UploadedImage {
                    preview_url: self.store.public_url(&self.bucket, &stored),
                    key: stored,
                }))
            }
            Err(StorageError::NotConfigured(message)) => Err(UploadError::Configuration(message)),
            Err(e) => {
                warn!(key = %key, error = %e, "Image upload failed");
                Err(UploadError::Failed(e.to_string()))
            }
        }
    }
}
