//! Wayfarer - client core for a travel-discovery app
//!
//! Wayfarer holds the parts of the app that carry state and rules:
//! role-gated views backed by a persisted session token, the image upload
//! pipeline in front of an object store, image reference resolution and
//! the backend API client.

pub mod api;
pub mod auth;
pub mod config;
pub mod geo;
pub mod images;
pub mod logging;
pub mod storage;
pub mod upload;

use thiserror::Error;

/// What the user was doing when a transient failure hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Load,
    Save,
}

/// Core error types for Wayfarer
///
/// Module errors convert into this taxonomy at component boundaries.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad input; shown inline next to the control
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing store credentials or endpoints; blocks the feature
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transient failure; the user may retry
    #[error("Network error: {message}")]
    Network { action: Action, message: String },

    /// The backend answered but refused the request
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Session ended; callers log out and redirect without showing this
    #[error("Session expired")]
    AuthExpired,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Short message to show the user, or `None` when nothing should be shown
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Error::Validation(msg) => msg.clone(),
            Error::Configuration(_) | Error::Config(_) => {
                "image uploads are not available right now".to_string()
            }
            Error::Storage(storage::StorageError::NotConfigured(_)) => {
                "image uploads are not available right now".to_string()
            }
            Error::Storage(_) => retry_message(Action::Upload).to_string(),
            Error::Network { action, .. } => retry_message(*action).to_string(),
            Error::Rejected { message, .. } => message.clone(),
            Error::AuthExpired => return None,
        };
        Some(message)
    }

    /// Whether a re-click could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Storage(e) => !matches!(e, storage::StorageError::NotConfigured(_)),
            Error::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Convert an API error raised while performing `action`
    pub fn from_api(err: api::ApiError, action: Action) -> Self {
        use api::ApiError;

        match err {
            ApiError::Network(message) | ApiError::Decode(message) => {
                Error::Network { action, message }
            }
            ApiError::EmptyBody => Error::Network {
                action,
                message: "response had no data".to_string(),
            },
            ApiError::Unauthorized | ApiError::Session(auth::SessionError::Expired) => {
                Error::AuthExpired
            }
            ApiError::Session(e) => Error::Validation(e.to_string()),
            ApiError::Status { status, message } => Error::Rejected { status, message },
            ApiError::Invalid(message) => Error::Validation(message),
        }
    }
}

fn retry_message(action: Action) -> &'static str {
    match action {
        Action::Upload => "upload failed, please retry",
        Action::Load => "couldn't load data, please retry",
        Action::Save => "couldn't save changes, please retry",
    }
}

impl From<upload::UploadError> for Error {
    fn from(err: upload::UploadError) -> Self {
        use upload::UploadError;

        match err {
            UploadError::Configuration(message) => Error::Configuration(message),
            UploadError::Failed(message) => Error::Network {
                action: Action::Upload,
                message,
            },
            other => Error::Validation(other.to_string()),
        }
    }
}

impl From<api::ApiError> for Error {
    fn from(err: api::ApiError) -> Self {
        Error::from_api(err, Action::Load)
    }
}

impl From<auth::SessionError> for Error {
    fn from(err: auth::SessionError) -> Self {
        match err {
            auth::SessionError::Expired => Error::AuthExpired,
            other => Error::Validation(other.to_string()),
        }
    }
}
