//! Image reference resolution
//!
//! Entities store either a bare object key (current) or an absolute URL
//! (older records). `ImageResolver` turns any stored reference into
//! something displayable.

use crate::config::{ImagesConfig, StorageConfig};
use crate::storage::encode_key;

/// Maps stored image references to displayable URLs
#[derive(Debug, Clone)]
pub struct ImageResolver {
    public_base: Option<String>,
    placeholder: String,
    static_prefix: String,
}

impl ImageResolver {
    /// Create a resolver; `public_base` is the bucket's public URL prefix
    pub fn new(public_base: Option<String>, images: &ImagesConfig) -> Self {
        Self {
            public_base: public_base
                .map(|b| b.trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty()),
            placeholder: images.placeholder.clone(),
            static_prefix: images.static_prefix.clone(),
        }
    }

    pub fn from_config(storage: &StorageConfig, images: &ImagesConfig) -> Self {
        Self::new(storage.public_base(), images)
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Resolve a stored reference
    ///
    /// Never fails: empty references and bare keys without a configured
    /// store both fall back to the placeholder.
    pub fn resolve(&self, reference: Option<&str>) -> String {
        let reference = match reference.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return self.placeholder.clone(),
        };

        if is_absolute_url(reference)
            || (!self.static_prefix.is_empty() && reference.starts_with(&self.static_prefix))
            || reference.starts_with("blob:")
            || reference.starts_with("data:image/")
        {
            return reference.to_string();
        }

        match &self.public_base {
            Some(base) => format!("{}/{}", base, encode_key(reference.trim_start_matches('/'))),
            None => {
                tracing::warn!(key = %reference, "No image store configured, using placeholder");
                self.placeholder.clone()
            }
        }
    }
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default(), &ImagesConfig::default())
    }
}

fn is_absolute_url(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
