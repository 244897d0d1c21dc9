//! Configuration system for Wayfarer
//!
//! Loads configuration from TOML files and environment variables.

mod types;

pub use types::*;

use crate::auth::SessionConfig;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Environment variable overriding the backend API base URL
pub const ENV_API_URL: &str = "WAYFARER_API_URL";
/// Environment variable overriding the object store URL
pub const ENV_STORAGE_URL: &str = "WAYFARER_STORAGE_URL";
/// Environment variable overriding the object store key
pub const ENV_STORAGE_KEY: &str = "WAYFARER_STORAGE_KEY";
/// Environment variable overriding the object store bucket
pub const ENV_STORAGE_BUCKET: &str = "WAYFARER_STORAGE_BUCKET";

/// Largest accepted image upload (5 MiB)
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main Wayfarer configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Backend API configuration
    pub api: ApiConfig,
    /// Object store configuration
    pub storage: StorageConfig,
    /// Session persistence and expiry checks
    pub session: SessionSettings,
    /// Image URL resolution
    pub images: ImagesConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api: raw.api.unwrap_or_default().try_into()?,
            storage: raw.storage.unwrap_or_default().try_into()?,
            session: raw.session.unwrap_or_default().try_into()?,
            images: raw.images.unwrap_or_default().try_into()?,
            logging: raw.logging.unwrap_or_default().into(),
        })
    }

    /// Overlay values from the process environment
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`; empty values are ignored
    ///
    /// Values go through the same checks as the file.
    pub fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api.base_url = types::api_base_url(&url)?;
        }
        if let Some(url) = get(ENV_STORAGE_URL) {
            self.storage.url = types::storage_url(&url)?;
        }
        if let Some(key) = get(ENV_STORAGE_KEY) {
            self.storage.anon_key = Some(SecretString::from(key.trim().to_string()));
        }
        if let Some(bucket) = get(ENV_STORAGE_BUCKET) {
            self.storage.bucket = types::bucket_name(&bucket)?;
        }
        Ok(self)
    }

    /// Load the file at `default_path` if present, then overlay the environment
    pub async fn load_default() -> Result<Self, ConfigError> {
        let config = match Self::load(Self::default_path()).await {
            Ok(config) => config,
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env()
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wayfarer")
            .join("config.toml")
    }

    /// Get the default session file path
    pub fn default_session_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wayfarer")
            .join("session.json")
    }
}

/// Backend API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Store endpoint, e.g. `https://abc.supabase.co`
    pub url: Option<String>,
    /// Public (anon) API key
    pub anon_key: Option<SecretString>,
    /// Bucket holding place images
    pub bucket: String,
    /// Cache lifetime sent with uploads
    pub cache_control_secs: u64,
    /// Largest accepted image
    pub max_upload_bytes: usize,
}

impl StorageConfig {
    /// Whether endpoint and key are both present
    pub fn is_complete(&self) -> bool {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_key = self
            .anon_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty());
        has_url && has_key
    }

    /// Base URL for publicly readable objects in the bucket
    pub fn public_base(&self) -> Option<String> {
        self.url.as_deref().filter(|u| !u.trim().is_empty()).map(|url| {
            format!(
                "{}/storage/v1/object/public/{}",
                url.trim_end_matches('/'),
                self.bucket
            )
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            bucket: "images".to_string(),
            cache_control_secs: 3600,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

/// Session persistence settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// File holding the persisted session
    pub path: PathBuf,
    /// Interval of the background expiry check
    pub expiry_check_interval: Duration,
    /// Treat tokens without `exp` as expired
    pub require_expiry: bool,
}

impl SessionSettings {
    /// Runtime settings for the session provider
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            expiry_check_interval: self.expiry_check_interval,
            require_expiry: self.require_expiry,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            path: Config::default_session_path(),
            expiry_check_interval: Duration::from_secs(60),
            require_expiry: false,
        }
    }
}

/// Image URL resolution settings
#[derive(Debug, Clone)]
pub struct ImagesConfig {
    /// Shown when a place has no image
    pub placeholder: String,
    /// Prefix of images bundled with the app
    pub static_prefix: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            placeholder: "/images/placeholder.png".to_string(),
            static_prefix: "/images/".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.storage.bucket, "images");
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.storage.cache_control_secs, 3600);
        assert_eq!(config.session.expiry_check_interval, Duration::from_secs(60));
        assert!(!config.session.require_expiry);
        assert_eq!(config.images.placeholder, "/images/placeholder.png");
        assert!(!config.storage.is_complete());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [api]
            base_url = "https://api.example.com/api/"
            timeout_secs = 10

            [storage]
            url = "https://abc.supabase.co/"
            anon_key = "anon"
            bucket = "places"

            [session]
            path = "/tmp/wayfarer/session.json"
            expiry_check_secs = 30
            require_expiry = true

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com/api");
        assert_eq!(config.api.timeout, Duration::from_secs(10));
        assert!(config.storage.is_complete());
        assert_eq!(
            config.storage.public_base().as_deref(),
            Some("https://abc.supabase.co/storage/v1/object/public/places")
        );
        assert_eq!(config.session.path, PathBuf::from("/tmp/wayfarer/session.json"));
        assert!(config.session.session_config().require_expiry);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::parse("[storage]\nmax_upload_bytes = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[session]\nexpiry_check_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[storage]\nbucket = \"a/b\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[api\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            (ENV_STORAGE_URL, "https://env.supabase.co/"),
            (ENV_STORAGE_KEY, "env-key"),
            (ENV_STORAGE_BUCKET, ""),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.storage.url.as_deref(), Some("https://env.supabase.co"));
        assert!(config.storage.is_complete());
        // Empty values don't override
        assert_eq!(config.storage.bucket, "images");
    }

    #[test]
    fn test_env_overlay_is_validated() {
        let overlay = |name: &'static str, value: &'static str| {
            Config::default().apply_vars(move |n| (n == name).then(|| value.to_string()))
        };

        assert!(matches!(
            overlay(ENV_STORAGE_BUCKET, "a/b"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            overlay(ENV_API_URL, "ftp://api.example.com"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            overlay(ENV_STORAGE_URL, "abc.supabase.co"),
            Err(ConfigError::Invalid(_))
        ));
        assert_eq!(
            overlay(ENV_API_URL, " https://api.example.com/api/ ").unwrap().api.base_url,
            "https://api.example.com/api"
        );
    }

    #[test]
    fn test_image_settings_validated() {
        for bad in [
            "[images]\nstatic_prefix = \"\"",
            "[images]\nstatic_prefix = \"images/\"",
            "[images]\nstatic_prefix = \"/\"",
            "[images]\nplaceholder = \"\"",
            "[images]\nplaceholder = \"placeholder.png\"",
        ] {
            assert!(
                matches!(Config::parse(bad), Err(ConfigError::Invalid(_))),
                "{bad} should be rejected"
            );
        }

        let config = Config::parse(
            "[images]\nstatic_prefix = \"/static/\"\nplaceholder = \"https://cdn.test/none.png\"",
        )
        .unwrap();
        assert_eq!(config.images.static_prefix, "/static/");
    }

    #[test]
    fn test_storage_url_must_be_http() {
        assert!(matches!(
            Config::parse("[storage]\nurl = \"abc.supabase.co\""),
            Err(ConfigError::Invalid(_))
        ));
        let config = Config::parse("[storage]\nurl = \"  \"").unwrap();
        assert!(config.storage.url.is_none());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[storage]\nbucket = \"places\"\n")
            .await
            .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.storage.bucket, "places");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Config::load("/definitely/not/here/config.toml").await;
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
