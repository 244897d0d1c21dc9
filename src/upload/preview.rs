//! Local image previews
//!
//! A preview holds the selected file's bytes in memory under a `blob:` URL
//! so it can be shown before the upload finishes. The bytes are released
//! when the `LocalPreview` handle is dropped.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// URL scheme prefix of local previews
pub const PREVIEW_URL_PREFIX: &str = "blob:wayfarer/";

#[derive(Debug)]
struct PreviewEntry {
    content_type: String,
    bytes: Arc<[u8]>,
}

/// Registry of live previews
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<RwLock<HashMap<String, PreviewEntry>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return the owning handle
    pub fn create(&self, content_type: impl Into<String>, bytes: &[u8]) -> LocalPreview {
        let url = format!("{}{}", PREVIEW_URL_PREFIX, Uuid::new_v4());
        self.entries.write().insert(
            url.clone(),
            PreviewEntry {
                content_type: content_type.into(),
                bytes: Arc::from(bytes),
            },
        );
        tracing::trace!(url = %url, size = bytes.len(), "Preview created");
        LocalPreview {
            url,
            registry: self.clone(),
        }
    }

    /// Look up a live preview's content type and bytes
    pub fn resolve(&self, url: &str) -> Option<(String, Arc<[u8]>)> {
        self.entries
            .read()
            .get(url)
            .map(|e| (e.content_type.clone(), e.bytes.clone()))
    }

    /// Number of previews not yet released
    pub fn live_count(&self) -> usize {
        self.entries.read().len()
    }

    fn release(&self, url: &str) {
        if self.entries.write().remove(url).is_some() {
            tracing::trace!(url = %url, "Preview released");
        }
    }
}

/// Owning handle to one preview
#[derive(Debug)]
pub struct LocalPreview {
    url: String,
    registry: PreviewRegistry,
}

impl LocalPreview {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for LocalPreview {
    fn drop(&mut self) {
        self.registry.release(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_released_on_drop() {
        let registry = PreviewRegistry::new();
        let preview = registry.create("image/png", b"\x89PNG");
        let url = preview.url().to_string();

        assert!(url.starts_with(PREVIEW_URL_PREFIX));
        assert_eq!(registry.live_count(), 1);
        let (content_type, bytes) = registry.resolve(&url).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(&*bytes, b"\x89PNG");

        drop(preview);
        assert_eq!(registry.live_count(), 0);
        assert!(registry.resolve(&url).is_none());
    }

    #[test]
    fn test_previews_are_distinct() {
        let registry = PreviewRegistry::new();
        let a = registry.create("image/png", b"a");
        let b = registry.create("image/png", b"b");
        assert_ne!(a.url(), b.url());
        assert_eq!(registry.live_count(), 2);
    }
}
