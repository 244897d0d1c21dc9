//! Session handling and view gating
//!
//! Provides role-based gating for protected views:
//! - Decode session tokens into typed credentials
//! - Keep the single persisted credential slot
//! - Watch for expiry in the background while logged in
//! - Decide between render, login prompt/redirect and access denied

mod guard;
mod session;
mod store;
mod token;
mod types;

pub use guard::{Guard, GuardState, GuardView, UnauthenticatedPolicy, LANDING_PATH};
pub use session::{
    Clock, ManualClock, SessionConfig, SessionError, SessionProvider, SessionRead, SessionStatus,
    SystemClock, DEFAULT_EXPIRY_CHECK,
};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError, StoredSession,
    TOKEN_KEY, USER_KEY,
};
pub use token::{parse_credential, ParseError};
#[cfg(test)]
pub(crate) use token::encode_test_token;
pub use types::{Credential, Role, UserProfile};
pub(crate) use types::string_or_number;
