//! Session state, its public snapshot, and the refresh outcome.

use std::fmt;

use evcharge_core::{User, is_admin_role};
use futures::future::{BoxFuture, Shared};
use secrecy::SecretString;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Start-up; the persisted refresh token has not been tried yet.
    Bootstrapping,
    /// No valid access token.
    Unauthenticated,
    /// An access token is held.
    Authenticated,
    /// A token refresh is in flight.
    Refreshing,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bootstrapping => "bootstrapping",
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        })
    }
}

/// Read-only view of the session. Never carries tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The signed-in account.
    pub user: Option<User>,
    /// Display name from the profile.
    pub username: Option<String>,
    /// Role from the profile.
    pub role: Option<String>,
    /// Whether an access token is held.
    pub is_authenticated: bool,
    /// Whether start-up has not finished yet.
    pub is_loading: bool,
    /// Whether a refresh is in flight.
    pub is_refreshing: bool,
}

impl SessionSnapshot {
    /// Derive the state-machine state.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        if self.is_loading && !self.is_authenticated {
            SessionStatus::Bootstrapping
        } else if self.is_refreshing {
            SessionStatus::Refreshing
        } else if self.is_authenticated {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        }
    }

    /// Whether the profile role is `admin`, ignoring case.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_authenticated && self.role.as_deref().is_some_and(is_admin_role)
    }
}

/// Result of a refresh, shared by every caller that awaited it.
#[derive(Clone)]
pub enum RefreshOutcome {
    /// The session holds this access token.
    Refreshed {
        /// The new access token.
        access_token: SecretString,
    },
    /// The session was cleared.
    LoggedOut,
}

impl RefreshOutcome {
    /// Whether the session came out of the refresh authenticated.
    #[must_use]
    pub const fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }

    /// The access token, if the refresh succeeded.
    #[must_use]
    pub fn into_access_token(self) -> Option<SecretString> {
        match self {
            Self::Refreshed { access_token } => Some(access_token),
            Self::LoggedOut => None,
        }
    }
}

impl fmt::Debug for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refreshed { .. } => f
                .debug_struct("Refreshed")
                .field("access_token", &"[REDACTED]")
                .finish(),
            Self::LoggedOut => f.write_str("LoggedOut"),
        }
    }
}

pub(super) type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The refresh currently in flight.
pub(super) struct InFlight {
    pub(super) id: u64,
    pub(super) future: SharedRefresh,
}

/// Mutable session state, guarded by the store's mutex.
pub(super) struct SessionState {
    pub(super) access_token: Option<SecretString>,
    pub(super) user: Option<User>,
    pub(super) username: Option<String>,
    pub(super) role: Option<String>,
    pub(super) is_loading: bool,
    pub(super) refresh: Option<InFlight>,
    /// Bumped whenever the session is replaced or cleared, so a refresh
    /// that started earlier does not overwrite the newer state.
    pub(super) epoch: u64,
    pub(super) next_refresh_id: u64,
}

impl SessionState {
    pub(super) const fn new() -> Self {
        Self {
            access_token: None,
            user: None,
            username: None,
            role: None,
            is_loading: true,
            refresh: None,
            epoch: 0,
            next_refresh_id: 0,
        }
    }

    pub(super) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.clone(),
            username: self.username.clone(),
            role: self.role.clone(),
            is_authenticated: self.access_token.is_some(),
            is_loading: self.is_loading,
            is_refreshing: self.refresh.is_some(),
        }
    }

    /// Replace the session with a freshly established one.
    pub(super) fn establish(&mut self, access_token: SecretString, user: User) {
        if self.user.as_ref().map(|u| u.id) != Some(user.id) {
            self.username = None;
            self.role = None;
        }
        self.access_token = Some(access_token);
        self.user = Some(user);
        self.epoch += 1;
    }

    /// Back to the unauthenticated shape. `is_loading` is left alone.
    pub(super) fn clear(&mut self) {
        self.access_token = None;
        self.user = None;
        self.username = None;
        self.role = None;
        self.epoch += 1;
    }

    /// What a caller should see given the current state.
    pub(super) fn current_outcome(&self) -> RefreshOutcome {
        self.access_token
            .clone()
            .map_or(RefreshOutcome::LoggedOut, |access_token| {
                RefreshOutcome::Refreshed { access_token }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(is_authenticated: bool, is_loading: bool, is_refreshing: bool) -> SessionSnapshot {
        SessionSnapshot {
            user: None,
            username: None,
            role: Some("Admin".to_string()),
            is_authenticated,
            is_loading,
            is_refreshing,
        }
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(snapshot(false, true, true).status(), SessionStatus::Bootstrapping);
        assert_eq!(snapshot(false, true, false).status(), SessionStatus::Bootstrapping);
        assert_eq!(snapshot(true, false, true).status(), SessionStatus::Refreshing);
        assert_eq!(snapshot(true, true, false).status(), SessionStatus::Authenticated);
        assert_eq!(snapshot(false, false, false).status(), SessionStatus::Unauthenticated);
    }

    #[test]
    fn test_admin_requires_authentication() {
        assert!(snapshot(true, false, false).is_admin());
        assert!(!snapshot(false, false, false).is_admin());
    }

    #[test]
    fn test_refresh_outcome_debug_redacts_token() {
        let outcome = RefreshOutcome::Refreshed {
            access_token: SecretString::from("at-secret"),
        };
        let debug = format!("{outcome:?}");
        assert!(!debug.contains("at-secret"));
        assert!(outcome.is_refreshed());
        assert!(!RefreshOutcome::LoggedOut.is_refreshed());
    }
}
