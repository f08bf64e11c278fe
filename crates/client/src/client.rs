//! Composition root wiring storage, session, transport and the API wrappers.

use std::sync::Arc;

use tracing::info;

use crate::api::{AdminApi, AuthApi, ProfileApi, ReservationsApi, StationsApi};
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::session::{SessionStatus, SessionStore};
use crate::storage::{FileTokenStorage, TokenStorage};
use crate::transport::Transport;

/// EV Charge API client.
///
/// Owns one [`SessionStore`]; every wrapper returned by this client shares it.
#[derive(Debug, Clone)]
pub struct EvChargeClient {
    auth: AuthApi,
    dispatcher: Dispatcher,
}

impl EvChargeClient {
    /// Create a client that persists the refresh token to `config.token_file`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let storage = Arc::new(FileTokenStorage::new(&config.token_file));
        Self::with_storage(config, storage)
    }

    /// Create a client over the given token storage.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn with_storage(
        config: &ClientConfig,
        storage: Arc<dyn TokenStorage>,
    ) -> Result<Self, ApiError> {
        let transport = Transport::new(config.api_base_url.clone(), config.http_timeout)?;
        let auth = AuthApi::new(transport.clone());
        let session = SessionStore::with_backend(storage, Arc::new(auth.clone()));

        info!(base_url = %config.api_base_url, "EV Charge client created");

        Ok(Self {
            auth,
            dispatcher: Dispatcher::new(transport, session),
        })
    }

    /// Restore the persisted session. See [`SessionStore::bootstrap`].
    pub async fn start(&self) -> SessionStatus {
        self.session().bootstrap().await
    }

    /// The shared session.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        self.dispatcher.session()
    }

    /// The authenticated dispatcher, for endpoints without a wrapper.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Auth endpoints (password reset; login and register go through the session).
    #[must_use]
    pub const fn auth(&self) -> &AuthApi {
        &self.auth
    }

    /// Profile endpoints.
    #[must_use]
    pub fn profile(&self) -> ProfileApi {
        ProfileApi::new(self.dispatcher.clone())
    }

    /// Reservation endpoints.
    #[must_use]
    pub fn reservations(&self) -> ReservationsApi {
        ReservationsApi::new(self.dispatcher.clone())
    }

    /// Station endpoints.
    #[must_use]
    pub fn stations(&self) -> StationsApi {
        StationsApi::new(self.dispatcher.clone())
    }

    /// Admin endpoints.
    #[must_use]
    pub fn admin(&self) -> AdminApi {
        AdminApi::new(self.dispatcher.clone())
    }
}
