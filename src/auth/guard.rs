//! View guard
//!
//! One state machine for every protected view. Callers choose the allowed
//! roles and what happens to anonymous visitors; the transitions are the same
//! for all of them.

use super::session::{SessionProvider, SessionRead, SessionStatus};
use super::types::Role;
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::debug;

/// Path of the public landing view
pub const LANDING_PATH: &str = "/";

/// What to do with a visitor who is not logged in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnauthenticatedPolicy {
    /// Send the visitor to `path` without explanation
    Redirect(String),
    /// Show an inline login prompt in place of the view
    Prompt,
}

/// Guard state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Not evaluated yet
    Checking,
    /// Logged in with an allowed role
    Authorized(Role),
    /// No usable credential
    Unauthenticated,
    /// Logged in, but the role is not allowed here
    Forbidden(Role),
}

/// What the presentation layer should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Neutral loading indicator
    Loading,
    /// The protected content
    Render,
    /// Navigate away
    Redirect(String),
    /// Inline login form
    LoginPrompt,
    /// Access denied page with a way back
    AccessDenied { back_to: String },
}

/// Gate for one protected view
#[derive(Debug, Clone)]
pub struct Guard {
    allowed_roles: HashSet<Role>,
    on_unauthenticated: UnauthenticatedPolicy,
    state: GuardState,
}

impl Guard {
    /// Create a guard; an empty `allowed_roles` admits any logged-in role
    pub fn new(
        allowed_roles: impl IntoIterator<Item = Role>,
        on_unauthenticated: UnauthenticatedPolicy,
    ) -> Self {
        Self {
            allowed_roles: allowed_roles.into_iter().collect(),
            on_unauthenticated,
            state: GuardState::Checking,
        }
    }

    /// Admin area: admins only, anonymous visitors go back to the landing view
    pub fn admin() -> Self {
        Self::new(
            [Role::Admin],
            UnauthenticatedPolicy::Redirect(LANDING_PATH.to_string()),
        )
    }

    /// Any logged-in account, with an inline login prompt
    pub fn authenticated() -> Self {
        Self::new([], UnauthenticatedPolicy::Prompt)
    }

    /// Restrict to `roles`, with an inline login prompt
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::new(roles, UnauthenticatedPolicy::Prompt)
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn allowed_roles(&self) -> &HashSet<Role> {
        &self.allowed_roles
    }

    /// Evaluate the current session and move to a display state
    ///
    /// Reading through the provider clears malformed and expired tokens.
    pub fn check(&mut self, provider: &SessionProvider) -> &GuardState {
        let next = match provider.read() {
            SessionRead::Missing
            | SessionRead::Corrupt(_)
            | SessionRead::Malformed(_)
            | SessionRead::Expired => {
                GuardState::Unauthenticated
            }
            SessionRead::Valid(cred) if cred.is_allowed(&self.allowed_roles) => {
                GuardState::Authorized(cred.role)
            }
            SessionRead::Valid(cred) => GuardState::Forbidden(cred.role),
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, "Guard transition");
        }
        self.state = next;
        &self.state
    }

    /// Re-evaluate after a session change notification
    ///
    /// Status changes are cheap to compare; a full check runs only when the
    /// published status differs from what this guard last acted on.
    pub fn on_status(&mut self, provider: &SessionProvider, status: &SessionStatus) -> &GuardState {
        let stale = match (&self.state, status) {
            (GuardState::Checking, _) => true,
            (GuardState::Unauthenticated, SessionStatus::Anonymous) => false,
            (GuardState::Authorized(r) | GuardState::Forbidden(r), SessionStatus::Active { role, .. }) => {
                r != role
            }
            _ => true,
        };
        if stale {
            self.check(provider);
        }
        &self.state
    }

    /// Subscribe to session changes for this guard's provider
    pub fn watch(&self, provider: &SessionProvider) -> watch::Receiver<SessionStatus> {
        provider.subscribe()
    }

    /// Map the state to what should be shown
    pub fn view(&self) -> GuardView {
        match &self.state {
            GuardState::Checking => GuardView::Loading,
            GuardState::Authorized(_) => GuardView::Render,
            GuardState::Unauthenticated => match &self.on_unauthenticated {
                UnauthenticatedPolicy::Redirect(path) => GuardView::Redirect(path.clone()),
                UnauthenticatedPolicy::Prompt => GuardView::LoginPrompt,
            },
            GuardState::Forbidden(_) => GuardView::AccessDenied {
                back_to: LANDING_PATH.to_string(),
            },
        }
    }

    /// Whether the protected content may be shown
    pub fn may_render(&self) -> bool {
        matches!(self.state, GuardState::Authorized(_))
    }
}
