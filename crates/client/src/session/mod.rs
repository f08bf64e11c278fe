//! Session and token lifecycle.
//!
//! [`SessionStore`] is the single source of truth for who is signed in. It
//! holds the short-lived access token in memory, keeps the long-lived refresh
//! token in [`TokenStorage`], and owns the refresh state machine:
//!
//! ```text
//! Bootstrapping ──► Authenticated ◄──► Refreshing
//!       │                 │                │
//!       └──────────► Unauthenticated ◄─────┘
//! ```
//!
//! # Refresh coalescing
//!
//! At most one refresh runs at a time. The first caller installs a shared
//! future in the in-flight slot (check and install happen under one lock);
//! every later caller awaits a clone of it and observes the same
//! [`RefreshOutcome`]. The refresh runs on its own task and clears its slot
//! when it completes, so it finishes even if every waiter is dropped.
//!
//! Refresh never returns an error. Any failure (no refresh token, no backend,
//! rejected token, network error) logs the session out and yields
//! [`RefreshOutcome::LoggedOut`].

mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use evcharge_core::{AuthResponse, Email, Profile, User, UserId};
use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::ApiError;
use crate::storage::{StorageError, TokenStorage};

pub use state::{RefreshOutcome, SessionSnapshot, SessionStatus};
use state::{InFlight, SessionState};

/// Storage key of the persisted refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Network side of the session: the auth and profile endpoints.
///
/// None of these calls may go through the retrying dispatcher; a 401 here is
/// an answer, not a reason to refresh.
pub trait SessionBackend: Send + Sync {
    /// Exchange credentials for tokens.
    fn login<'a>(
        &'a self,
        email: &'a Email,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>>;

    /// Create an account and sign in.
    fn register<'a>(
        &'a self,
        email: &'a Email,
        password: &'a SecretString,
        username: &'a str,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>>;

    /// Exchange a refresh token for a new token pair.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>>;

    /// Load username and role, authorised with the given access token.
    fn fetch_profile<'a>(
        &'a self,
        user_id: UserId,
        access_token: &'a SecretString,
    ) -> BoxFuture<'a, Result<Profile, ApiError>>;
}

/// Session state container, cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    storage: Arc<dyn TokenStorage>,
    backend: RwLock<Option<Arc<dyn SessionBackend>>>,
    state: Mutex<SessionState>,
    initialized: AtomicBool,
    changes: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an unauthenticated, loading session with no backend.
    ///
    /// Until [`set_backend`](Self::set_backend) is called, every refresh
    /// logs out.
    #[must_use]
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        let state = SessionState::new();
        let (changes, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(SessionInner {
                storage,
                backend: RwLock::new(None),
                state: Mutex::new(state),
                initialized: AtomicBool::new(false),
                changes,
            }),
        }
    }

    /// Create a session with its backend already configured.
    #[must_use]
    pub fn with_backend(storage: Arc<dyn TokenStorage>, backend: Arc<dyn SessionBackend>) -> Self {
        let store = Self::new(storage);
        store.set_backend(backend);
        store
    }

    /// Configure the backend used for login, register, refresh and profile.
    pub fn set_backend(&self, backend: Arc<dyn SessionBackend>) {
        *self
            .inner
            .backend
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(backend);
    }

    // =========================================================================
    // Start-up
    // =========================================================================

    /// Restore the session from the persisted refresh token.
    ///
    /// Runs once; later calls wait until start-up has finished and return
    /// the current status.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> SessionStatus {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            let mut changes = self.subscribe();
            let _ = changes.wait_for(|snapshot| !snapshot.is_loading).await;
            return self.status();
        }

        match self.inner.storage.get(REFRESH_TOKEN_KEY) {
            Ok(Some(_)) => {
                debug!("Persisted refresh token found");
                self.refresh().await;
            }
            Ok(None) => debug!("No persisted session"),
            Err(e) => {
                warn!(error = %e, "Could not read persisted session");
                self.logout();
            }
        }

        self.update(|state| state.is_loading = false);
        let status = self.status();
        info!(%status, "Session bootstrapped");
        status
    }

    // =========================================================================
    // Establishing a session
    // =========================================================================

    /// Record an access token and user. The access token is never persisted.
    pub fn set_session(&self, access_token: SecretString, user: User) {
        self.update(|state| state.establish(access_token, user));
    }

    /// Persist the refresh token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be written to storage.
    pub fn set_refresh_token(&self, refresh_token: &SecretString) -> Result<(), StorageError> {
        self.inner
            .storage
            .set(REFRESH_TOKEN_KEY, refresh_token.expose_secret())
    }

    /// Sign in with email and password.
    ///
    /// On failure the session is left as it was.
    ///
    /// # Errors
    ///
    /// Returns the backend's error (bad credentials arrive as
    /// `ApiError::Status`), `ApiError::NoBackend`, or `ApiError::Storage` if
    /// the refresh token cannot be persisted.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<User, ApiError> {
        let backend = self.backend().ok_or(ApiError::NoBackend)?;
        let response = backend.login(email, password).await?;
        let user = self.accept_auth(backend.as_ref(), response).await?;
        info!(user_id = %user.id, "Logged in");
        Ok(user)
    }

    /// Create an account and sign in.
    ///
    /// On failure the session is left as it was.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login); a taken email arrives as
    /// `ApiError::Status` with the server's message.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        username: &str,
    ) -> Result<User, ApiError> {
        let backend = self.backend().ok_or(ApiError::NoBackend)?;
        let response = backend.register(email, password, username).await?;
        let user = self.accept_auth(backend.as_ref(), response).await?;
        info!(user_id = %user.id, "Registered");
        Ok(user)
    }

    /// Persist, then establish, then load the profile.
    async fn accept_auth(
        &self,
        backend: &dyn SessionBackend,
        response: AuthResponse,
    ) -> Result<User, ApiError> {
        let access_token = SecretString::from(response.access_token);
        let refresh_token = SecretString::from(response.refresh_token);
        let user = response.user;

        let epoch = self.update(|state| {
            self.set_refresh_token(&refresh_token)?;
            state.establish(access_token.clone(), user.clone());
            Ok::<_, StorageError>(state.epoch)
        })?;

        self.load_profile(backend, user.id, &access_token, epoch)
            .await;
        Ok(user)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refresh the token pair, or join the refresh already in flight.
    ///
    /// Never fails; a failed refresh logs the session out.
    pub async fn refresh(&self) -> RefreshOutcome {
        let future = self.update(|state| {
            if let Some(in_flight) = &state.refresh {
                debug!(refresh_id = in_flight.id, "Joining refresh in flight");
                return in_flight.future.clone();
            }

            state.next_refresh_id += 1;
            let id = state.next_refresh_id;
            let epoch = state.epoch;
            let weak = Arc::downgrade(&self.inner);

            let task = tokio::spawn({
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return RefreshOutcome::LoggedOut;
                    };
                    Self { inner }.run_refresh(id, epoch).await
                }
            });

            let future = async move {
                match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, refresh_id = id, "Refresh task failed");
                        weak.upgrade()
                            .map_or(RefreshOutcome::LoggedOut, |inner| {
                                Self { inner }.abandon_refresh(id)
                            })
                    }
                }
            }
            .boxed()
            .shared();

            state.refresh = Some(InFlight {
                id,
                future: future.clone(),
            });
            future
        });

        future.await
    }

    /// The current access token, refreshing first if there is none.
    pub async fn ensure_valid_token(&self) -> Option<SecretString> {
        if let Some(token) = self.access_token() {
            return Some(token);
        }
        self.refresh().await.into_access_token()
    }

    #[instrument(skip(self, epoch))]
    async fn run_refresh(&self, refresh_id: u64, epoch: u64) -> RefreshOutcome {
        let outcome = self.refresh_once(epoch).await;
        self.release_refresh(refresh_id);
        outcome
    }

    fn release_refresh(&self, refresh_id: u64) {
        self.update(|state| {
            if state.refresh.as_ref().is_some_and(|f| f.id == refresh_id) {
                state.refresh = None;
            }
        });
    }

    /// Free the slot of a refresh task that died without finishing.
    fn abandon_refresh(&self, refresh_id: u64) -> RefreshOutcome {
        self.release_refresh(refresh_id);
        self.lock_state().current_outcome()
    }

    async fn refresh_once(&self, epoch: u64) -> RefreshOutcome {
        let Some(backend) = self.backend() else {
            warn!("No auth backend configured; logging out");
            return self.fail_refresh(epoch);
        };

        let refresh_token = match self.inner.storage.get(REFRESH_TOKEN_KEY) {
            Ok(Some(token)) => SecretString::from(token),
            Ok(None) => {
                debug!("No refresh token; logging out");
                return self.fail_refresh(epoch);
            }
            Err(e) => {
                warn!(error = %e, "Could not read refresh token; logging out");
                return self.fail_refresh(epoch);
            }
        };

        let response = match backend.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh rejected; logging out");
                return self.fail_refresh(epoch);
            }
        };

        let access_token = SecretString::from(response.access_token);
        let rotated = SecretString::from(response.refresh_token);
        let user = response.user;

        let applied = self.update(|state| {
            if state.epoch != epoch {
                return None;
            }
            if let Err(e) = self.set_refresh_token(&rotated) {
                warn!(error = %e, "Could not persist rotated refresh token");
            }
            state.establish(access_token.clone(), user.clone());
            Some(state.epoch)
        });

        let Some(new_epoch) = applied else {
            debug!("Session changed during refresh; discarding result");
            return self.lock_state().current_outcome();
        };

        info!(user_id = %user.id, "Access token refreshed");
        self.load_profile(backend.as_ref(), user.id, &access_token, new_epoch)
            .await;

        RefreshOutcome::Refreshed { access_token }
    }

    /// Log out unless the session was replaced while the refresh ran.
    fn fail_refresh(&self, epoch: u64) -> RefreshOutcome {
        self.update(|state| {
            if state.epoch != epoch {
                return state.current_outcome();
            }
            self.clear_session(state);
            RefreshOutcome::LoggedOut
        })
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Fetch username and role. Failure is logged and leaves them unset.
    async fn load_profile(
        &self,
        backend: &dyn SessionBackend,
        user_id: UserId,
        access_token: &SecretString,
        epoch: u64,
    ) {
        match backend.fetch_profile(user_id, access_token).await {
            Ok(profile) => {
                self.apply_profile(profile, epoch);
            }
            Err(e) => warn!(error = %e, %user_id, "Profile fetch failed; username and role unset"),
        }
    }

    fn apply_profile(&self, profile: Profile, epoch: u64) -> bool {
        self.update(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.username = Some(profile.username);
            state.role = Some(profile.role);
            true
        })
    }

    /// Fetch username and role again for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotAuthenticated` without a session,
    /// `ApiError::NoBackend` without a backend, or the fetch error.
    #[instrument(skip(self))]
    pub async fn reload_profile(&self) -> Result<Profile, ApiError> {
        let (user_id, access_token, epoch) = {
            let state = self.lock_state();
            match (&state.user, &state.access_token) {
                (Some(user), Some(token)) => (user.id, token.clone(), state.epoch),
                _ => return Err(ApiError::NotAuthenticated),
            }
        };
        let backend = self.backend().ok_or(ApiError::NoBackend)?;

        let profile = backend.fetch_profile(user_id, &access_token).await?;
        self.apply_profile(profile.clone(), epoch);
        Ok(profile)
    }

    /// Update the cached username after it was changed on the server.
    pub fn set_username(&self, username: impl Into<String>) {
        let username = username.into();
        self.update(|state| {
            if state.access_token.is_some() {
                state.username = Some(username);
            }
        });
    }

    // =========================================================================
    // Logout
    // =========================================================================

    /// Clear the session and remove the persisted refresh token.
    ///
    /// Never fails and may be called repeatedly; a storage error is logged.
    pub fn logout(&self) {
        self.update(|state| self.clear_session(state));
    }

    fn clear_session(&self, state: &mut SessionState) {
        if let Err(e) = self.inner.storage.remove(REFRESH_TOKEN_KEY) {
            warn!(error = %e, "Could not remove persisted refresh token");
        }
        if state.access_token.is_some() {
            info!("Logged out");
        }
        state.clear();
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// The current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.lock_state().access_token.clone()
    }

    /// Whether an access token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock_state().access_token.is_some()
    }

    /// Whether the signed-in user has the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.snapshot().is_admin()
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock_state().snapshot()
    }

    /// Current state-machine state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.snapshot().status()
    }

    /// Receive a new snapshot after every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.changes.subscribe()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn backend(&self) -> Option<Arc<dyn SessionBackend>> {
        self.inner
            .backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state under the lock and notify subscribers of any change.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock_state();
        let result = f(&mut state);
        let snapshot = state.snapshot();
        self.inner.changes.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
        result
    }
}
