//! Raw configuration types for TOML parsing

use super::*;
use serde::Deserialize;

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub api: Option<RawApiConfig>,
    pub storage: Option<RawStorageConfig>,
    pub session: Option<RawSessionConfig>,
    pub images: Option<RawImagesConfig>,
    pub logging: Option<RawLoggingConfig>,
}

/// Expand a leading `~/` to the home directory
fn expand_home(p: String) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(p)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Normalise and check an API base URL
pub(crate) fn api_base_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim().trim_end_matches('/');
    if !is_http_url(url) {
        return Err(ConfigError::Invalid(format!(
            "API base URL must be http(s): {}",
            url
        )));
    }
    Ok(url.to_string())
}

/// Normalise and check an object store URL; blank means unset
pub(crate) fn storage_url(url: &str) -> Result<Option<String>, ConfigError> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Ok(None);
    }
    if !is_http_url(url) {
        return Err(ConfigError::Invalid(format!(
            "Storage URL must be http(s): {}",
            url
        )));
    }
    Ok(Some(url.to_string()))
}

/// Check a bucket name
pub(crate) fn bucket_name(bucket: &str) -> Result<String, ConfigError> {
    let bucket = bucket.trim();
    if bucket.is_empty() || bucket.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "Invalid storage bucket name: {:?}",
            bucket
        )));
    }
    Ok(bucket.to_string())
}

#[derive(Debug, Deserialize, Default)]
pub struct RawApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl TryFrom<RawApiConfig> for ApiConfig {
    type Error = ConfigError;

    fn try_from(raw: RawApiConfig) -> Result<Self, Self::Error> {
        let defaults = ApiConfig::default();
        let base_url = match raw.base_url {
            Some(url) => api_base_url(&url)?,
            None => defaults.base_url,
        };

        Ok(Self {
            base_url,
            timeout: raw
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawStorageConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub bucket: Option<String>,
    pub cache_control_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
}

impl TryFrom<RawStorageConfig> for StorageConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStorageConfig) -> Result<Self, Self::Error> {
        let defaults = StorageConfig::default();

        let bucket = bucket_name(raw.bucket.as_deref().unwrap_or(&defaults.bucket))?;

        let max_upload_bytes = raw.max_upload_bytes.unwrap_or(defaults.max_upload_bytes);
        if max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            url: match raw.url {
                Some(url) => storage_url(&url)?,
                None => None,
            },
            anon_key: raw
                .anon_key
                .filter(|k| !k.trim().is_empty())
                .map(secrecy::SecretString::from),
            bucket,
            cache_control_secs: raw.cache_control_secs.unwrap_or(defaults.cache_control_secs),
            max_upload_bytes,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSessionConfig {
    pub path: Option<String>,
    pub expiry_check_secs: Option<u64>,
    pub require_expiry: Option<bool>,
}

impl TryFrom<RawSessionConfig> for SessionSettings {
    type Error = ConfigError;

    fn try_from(raw: RawSessionConfig) -> Result<Self, Self::Error> {
        let defaults = SessionSettings::default();

        let expiry_check_interval = match raw.expiry_check_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "expiry_check_secs must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.expiry_check_interval,
        };

        Ok(Self {
            path: raw.path.map(expand_home).unwrap_or(defaults.path),
            expiry_check_interval,
            require_expiry: raw.require_expiry.unwrap_or(defaults.require_expiry),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawImagesConfig {
    pub placeholder: Option<String>,
    pub static_prefix: Option<String>,
}

impl TryFrom<RawImagesConfig> for ImagesConfig {
    type Error = ConfigError;

    fn try_from(raw: RawImagesConfig) -> Result<Self, Self::Error> {
        let defaults = ImagesConfig::default();

        // Every stored key would match an empty or relative prefix
        let static_prefix = raw.static_prefix.unwrap_or(defaults.static_prefix);
        if !static_prefix.starts_with('/') || static_prefix.trim() == "/" {
            return Err(ConfigError::Invalid(format!(
                "static_prefix must be an absolute path like \"/images/\": {:?}",
                static_prefix
            )));
        }

        let placeholder = raw.placeholder.unwrap_or(defaults.placeholder);
        if !placeholder.starts_with('/') && !is_http_url(&placeholder) {
            return Err(ConfigError::Invalid(format!(
                "placeholder must be an absolute path or http(s) URL: {:?}",
                placeholder
            )));
        }

        Ok(Self {
            placeholder,
            static_prefix,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl From<RawLoggingConfig> for LoggingConfig {
    fn from(raw: RawLoggingConfig) -> Self {
        Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format: match raw.format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}
