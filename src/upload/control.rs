//! Per-control upload state
//!
//! One `UploadControl` backs one image picker. It shows the local preview
//! while the upload runs, refuses a second submission until the first one
//! settles, and falls back to the committed image when an upload fails.

use super::preview::{LocalPreview, PreviewRegistry};
use super::{ImageFile, ImageUploader, UploadError, UploadRequest};
use crate::images::ImageResolver;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ControlState {
    /// Key persisted on the entity
    committed: Option<String>,
    /// Preview shown while an upload is outstanding
    preview: Option<LocalPreview>,
    busy: bool,
    last_error: Option<UploadError>,
}

/// Clears the busy flag and releases the preview, even if the upload
/// future is dropped before completing.
struct InFlight<'a> {
    state: &'a Mutex<ControlState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.busy = false;
        state.preview = None;
    }
}

/// State behind one image picker
pub struct UploadControl {
    uploader: Arc<ImageUploader>,
    previews: PreviewRegistry,
    resolver: ImageResolver,
    state: Mutex<ControlState>,
}

impl UploadControl {
    /// Create a control showing `committed` (the entity's current image key)
    pub fn new(
        uploader: Arc<ImageUploader>,
        previews: PreviewRegistry,
        resolver: ImageResolver,
        committed: Option<String>,
    ) -> Self {
        Self {
            uploader,
            previews,
            resolver,
            state: Mutex::new(ControlState {
                committed: committed.filter(|c| !c.trim().is_empty()),
                ..ControlState::default()
            }),
        }
    }

    /// Whether the trigger should be disabled
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Key to persist on the entity
    pub fn committed(&self) -> Option<String> {
        self.state.lock().committed.clone()
    }

    /// Error from the last submission, for inline display
    pub fn last_error(&self) -> Option<UploadError> {
        self.state.lock().last_error.clone()
    }

    /// URL to show right now
    pub fn display_url(&self) -> String {
        let state = self.state.lock();
        match &state.preview {
            Some(preview) => preview.url().to_string(),
            None => self.resolver.resolve(state.committed.as_deref()),
        }
    }

    /// Upload `file`, committing its key on success
    pub async fn submit(
        &self,
        file: ImageFile,
        subject_name: Option<String>,
    ) -> Result<String, UploadError> {
        {
            let mut state = self.state.lock();
            // The outstanding upload owns the error slot until it settles
            if state.busy {
                return Err(UploadError::Busy);
            }
            if let Err(e) = self.uploader.validate(&file) {
                state.last_error = Some(e.clone());
                return Err(e);
            }
            state.busy = true;
            state.last_error = None;
            state.preview = Some(self.previews.create(file.content_type.clone(), &file.bytes));
        }
        let in_flight = InFlight { state: &self.state };

        let result = self
            .uploader
            .upload(UploadRequest {
                file: Some(file),
                subject_name,
                required: true,
            })
            .await
            .and_then(|uploaded| uploaded.map(|u| u.key).ok_or(UploadError::Missing));

        {
            let mut state = self.state.lock();
            match &result {
                Ok(key) => state.committed = Some(key.clone()),
                Err(e) => state.last_error = Some(e.clone()),
            }
        }
        drop(in_flight);

        result
    }

    /// Remove the image from the entity
    ///
    /// Ignored while an upload is outstanding.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if !state.busy {
            state.committed = None;
            state.last_error = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImagesConfig, StorageConfig};
    use crate::storage::{MemoryObjectStore, ObjectStore, StorageError, UploadOptions};
    use crate::upload::PREVIEW_URL_PREFIX;
    use std::time::Duration;

    const BASE: &str = "https://mem.test";

    fn control(store: Arc<MemoryObjectStore>, committed: Option<&str>) -> (UploadControl, PreviewRegistry) {
        let config = StorageConfig {
            url: Some(BASE.to_string()),
            ..StorageConfig::default()
        };
        let uploader = Arc::new(ImageUploader::new(store, &config));
        let previews = PreviewRegistry::new();
        let resolver = ImageResolver::from_config(&config, &ImagesConfig::default());
        (
            UploadControl::new(uploader, previews.clone(), resolver, committed.map(str::to_string)),
            previews,
        )
    }

    fn png(bytes: &[u8]) -> ImageFile {
        ImageFile::new("pic.png", "image/png", bytes.to_vec())
    }

    #[tokio::test]
    async fn test_success_commits_and_releases_preview() {
        let store = Arc::new(MemoryObjectStore::new(BASE));
        let (control, previews) = control(store, None);
        assert_eq!(control.display_url(), "/images/placeholder.png");

        let key = control
            .submit(png(b"data"), Some("Bến Nhà Rồng".to_string()))
            .await
            .unwrap();

        assert_eq!(key, "ben-nha-rong.png");
        assert_eq!(control.committed().as_deref(), Some("ben-nha-rong.png"));
        assert_eq!(
            control.display_url(),
            "https://mem.test/storage/v1/object/public/images/ben-nha-rong.png"
        );
        assert_eq!(previews.live_count(), 0);
        assert!(!control.is_busy());
    }

    #[tokio::test]
    async fn test_failure_reverts_to_committed() {
        let store = Arc::new(MemoryObjectStore::new(BASE));
        store.fail_next_upload();
        let (control, previews) = control(store, Some("old.jpg"));

        let result = control.submit(png(b"data"), None).await;
        assert!(matches!(result, Err(UploadError::Failed(_))));
        assert_eq!(control.committed().as_deref(), Some("old.jpg"));
        assert!(control.display_url().ends_with("/old.jpg"));
        assert!(matches!(control.last_error(), Some(UploadError::Failed(_))));
        assert_eq!(previews.live_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_file_never_previews() {
        let store = Arc::new(MemoryObjectStore::new(BASE));
        let (control, previews) = control(store.clone(), None);

        let file = ImageFile::new("notes.txt", "text/plain", b"hi".to_vec());
        let result = control.submit(file, None).await;

        assert!(matches!(result, Err(UploadError::InvalidType(_))));
        assert_eq!(previews.live_count(), 0);
        assert_eq!(store.upload_calls(), 0);
    }

    /// Store whose uploads never complete
    struct StalledStore;

    #[async_trait::async_trait]
    impl ObjectStore for StalledStore {
        fn is_configured(&self) -> bool {
            true
        }

        async fn upload(
            &self,
            _bucket: &str,
            _key: &str,
            _bytes: &[u8],
            _options: &UploadOptions,
        ) -> Result<String, StorageError> {
            std::future::pending().await
        }

        fn public_url(&self, bucket: &str, key: &str) -> String {
            format!("{}/{}/{}", BASE, bucket, key)
        }
    }

    #[tokio::test]
    async fn test_busy_while_pending_and_cancellation_releases() {
        let config = StorageConfig::default();
        let uploader = Arc::new(ImageUploader::new(Arc::new(StalledStore), &config));
        let previews = PreviewRegistry::new();
        let resolver = ImageResolver::from_config(&config, &ImagesConfig::default());
        let control = UploadControl::new(uploader, previews.clone(), resolver, Some("old.jpg".to_string()));

        let mut pending = Box::pin(control.submit(png(b"one"), None));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), &mut pending).await;
        assert!(timed_out.is_err());

        assert!(control.is_busy());
        assert_eq!(previews.live_count(), 1);
        assert!(control.display_url().starts_with(PREVIEW_URL_PREFIX));

        // Duplicate submission is refused, valid or not
        assert_eq!(
            control.submit(png(b"two"), None).await,
            Err(UploadError::Busy)
        );
        let not_an_image = ImageFile::new("notes.txt", "text/plain", b"hi".to_vec());
        assert_eq!(
            control.submit(not_an_image, None).await,
            Err(UploadError::Busy)
        );
        assert!(control.last_error().is_none());

        // Navigating away drops the pending upload
        drop(pending);
        assert!(!control.is_busy());
        assert_eq!(previews.live_count(), 0);
        assert_eq!(control.committed().as_deref(), Some("old.jpg"));
    }

    #[tokio::test]
    async fn test_clear_removes_committed() {
        let store = Arc::new(MemoryObjectStore::new(BASE));
        let (control, _) = control(store, Some("old.jpg"));
        control.clear();
        assert!(control.committed().is_none());
        assert_eq!(control.display_url(), "/images/placeholder.png");
    }
}
