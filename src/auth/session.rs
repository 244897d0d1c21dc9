//! Session provider
//!
//! The single owner of the persisted credential. Guards and the API client
//! read through it instead of touching the store directly, and it runs the
//! background expiry check while a session is active.

use super::store::{CredentialStore, StoreError, StoredSession};
use super::token::{parse_credential, ParseError};
use super::types::{Credential, Role, UserProfile};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default interval between background expiry checks
pub const DEFAULT_EXPIRY_CHECK: Duration = Duration::from_secs(60);

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] ParseError),

    #[error("Token already expired")]
    Expired,

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Session provider settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval of the background expiry check
    pub expiry_check_interval: Duration,
    /// Treat tokens without `exp` as expired
    pub require_expiry: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_check_interval: DEFAULT_EXPIRY_CHECK,
            require_expiry: false,
        }
    }
}

/// Published session status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No usable credential
    Anonymous,
    /// A parseable, unexpired credential is held
    Active {
        role: Role,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active { .. })
    }
}

/// Outcome of reading the stored credential
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRead {
    /// Nothing stored
    Missing,
    /// Stored slot could not be decoded; it has been cleared
    Corrupt(String),
    /// Stored token did not parse; it has been cleared
    Malformed(ParseError),
    /// Stored token is past its expiry; it has been cleared
    Expired,
    /// Usable credential
    Valid(Credential),
}

/// Owns the credential slot and its expiry watcher
pub struct SessionProvider {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    status: watch::Sender<SessionStatus>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionProvider {
    /// Create a provider over `store`
    ///
    /// The stored credential is validated immediately. When it is usable and
    /// a Tokio runtime is available, the expiry watcher starts.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(SessionStatus::Anonymous);
        let provider = Arc::new(Self {
            store,
            clock,
            config,
            status,
            watcher: Mutex::new(None),
        });

        if let SessionRead::Valid(_) = provider.read() {
            provider.start_expiry_watch();
        }

        provider
    }

    /// Create a provider with the system clock and default settings
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        Self::new(store, Arc::new(SystemClock), SessionConfig::default())
    }

    /// Read and validate the stored credential
    ///
    /// Malformed and expired tokens are cleared from the store.
    pub fn read(&self) -> SessionRead {
        let stored = match self.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                self.publish(SessionStatus::Anonymous);
                return SessionRead::Missing;
            }
            Err(StoreError::Corrupt(reason)) => {
                warn!(reason = %reason, "Discarding unreadable session");
                self.discard();
                return SessionRead::Corrupt(reason);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                self.publish(SessionStatus::Anonymous);
                return SessionRead::Missing;
            }
        };

        match parse_credential(&stored.token) {
            Err(e) => {
                warn!(error = %e, "Discarding malformed session token");
                self.discard();
                SessionRead::Malformed(e)
            }
            Ok(cred) if self.is_stale(&cred) => {
                info!(role = %cred.role, "Session expired");
                self.discard();
                SessionRead::Expired
            }
            Ok(cred) => {
                self.publish(SessionStatus::Active {
                    role: cred.role,
                    expires_at: cred.expires_at(),
                });
                SessionRead::Valid(cred)
            }
        }
    }

    /// The usable credential, if any
    pub fn current(&self) -> Option<Credential> {
        match self.read() {
            SessionRead::Valid(cred) => Some(cred),
            _ => None,
        }
    }

    /// Raw token for bearer authentication
    pub fn token(&self) -> Option<String> {
        self.current().map(|c| c.raw)
    }

    /// User snapshot stored at login
    pub fn user(&self) -> Option<UserProfile> {
        self.current()?;
        self.store.load().ok().flatten().and_then(|s| s.user)
    }

    /// Last published status
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Store a freshly issued token and start the expiry watcher
    pub fn login(
        self: &Arc<Self>,
        token: impl Into<String>,
        user: Option<UserProfile>,
    ) -> Result<Credential, SessionError> {
        let token = token.into();
        let cred = parse_credential(&token)?;
        if self.is_stale(&cred) {
            return Err(SessionError::Expired);
        }

        self.store.save(&StoredSession {
            token: cred.raw.clone(),
            user,
        })?;

        info!(role = %cred.role, "Logged in");
        self.publish(SessionStatus::Active {
            role: cred.role,
            expires_at: cred.expires_at(),
        });
        self.start_expiry_watch();

        Ok(cred)
    }

    /// Clear the session and stop the watcher
    pub fn logout(&self) {
        info!("Logged out");
        self.discard();
    }

    /// Forced logout after the backend rejected the token
    pub fn expire(&self) {
        warn!("Session rejected by backend, logging out");
        self.discard();
    }

    /// Run one expiry check; returns true if the session was ended
    pub fn check_expiry(&self) -> bool {
        let ended = !matches!(self.read(), SessionRead::Valid(_));
        if ended {
            debug!("Expiry check ended the session");
        }
        ended
    }

    /// Whether the background watcher is running
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start (or restart) the background expiry watcher
    ///
    /// There is at most one watcher per provider. Without a Tokio runtime the
    /// watcher is skipped and expiry is only detected on reads.
    pub fn start_expiry_watch(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, expiry watcher not started");
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.expiry_check_interval;
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(provider) = weak.upgrade() else {
                    break;
                };
                if provider.check_expiry() {
                    break;
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_expiry_watch(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }

    fn is_stale(&self, cred: &Credential) -> bool {
        cred.is_expired_at(self.clock.now()) || (self.config.require_expiry && cred.exp.is_none())
    }

    fn discard(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.stop_expiry_watch();
        self.publish(SessionStatus::Anonymous);
    }

    fn publish(&self, status: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

impl Drop for SessionProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.abort();
        }
    }
}
