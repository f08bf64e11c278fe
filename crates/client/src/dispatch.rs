//! Authenticated request dispatch with a single refresh-and-retry on 401.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::error::ApiError;
use crate::session::{RefreshOutcome, SessionStore};
use crate::transport::{RequestOptions, Transport};

/// How many times a request is re-sent after a 401.
pub const MAX_AUTH_RETRIES: u32 = 1;

/// Sends API requests with the session's access token attached.
///
/// A 401 triggers one refresh (shared with any other caller refreshing at the
/// same time) and one retry with the token obtained afterwards. If the refresh
/// ends the session, the retry goes out without `Authorization`. Every call
/// keeps its own retry budget.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Transport,
    session: SessionStore,
}

impl Dispatcher {
    /// Create a dispatcher over the given transport and session.
    #[must_use]
    pub const fn new(transport: Transport, session: SessionStore) -> Self {
        Self { transport, session }
    }

    /// The session whose token is attached.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Send a request and return the parsed JSON body (`null` when empty).
    ///
    /// Without a token the request is still sent, just without
    /// `Authorization`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` naming the endpoint and status for any
    /// non-2xx answer that survives the retry, or a transport or parse error.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn dispatch(
        &self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<serde_json::Value, ApiError> {
        let mut token = self.session.ensure_valid_token().await;
        let mut retries = 0;

        loop {
            let response = self
                .transport
                .send(endpoint, options, token.as_ref())
                .await?;

            if response.is_success() {
                return response.into_json();
            }

            if response.status != reqwest::StatusCode::UNAUTHORIZED || retries >= MAX_AUTH_RETRIES
            {
                let err = response.into_error(&options.method, endpoint);
                debug!(error = %err, "Request failed");
                return Err(err);
            }
            retries += 1;

            token = self.token_for_retry(token.as_ref()).await;
            if token.is_none() {
                warn!("Session ended after 401; retrying without a token");
            }
            debug!(attempt = retries + 1, "Retrying after token refresh");
        }
    }

    /// Like [`dispatch`](Self::dispatch), deserializing the body into `T`.
    ///
    /// # Errors
    ///
    /// Same as `dispatch`, plus `ApiError::Parse` if the body does not match
    /// `T`.
    pub async fn dispatch_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let value = self.dispatch(endpoint, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Token to retry with after a 401, or `None` once the session is gone.
    ///
    /// If another caller already replaced the token that was rejected, use the
    /// new one without refreshing again.
    async fn token_for_retry(&self, rejected: Option<&SecretString>) -> Option<SecretString> {
        if let Some(current) = self.session.access_token() {
            let replaced =
                rejected.is_none_or(|old| old.expose_secret() != current.expose_secret());
            if replaced {
                return Some(current);
            }
        }

        match self.session.refresh().await {
            RefreshOutcome::Refreshed { access_token } => Some(access_token),
            RefreshOutcome::LoggedOut => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use evcharge_core::{AuthResponse, Email, Profile, User, UserId};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use reqwest::{Method, StatusCode};
    use url::Url;

    use super::*;
    use crate::session::{REFRESH_TOKEN_KEY, SessionBackend};
    use crate::storage::MemoryTokenStorage;

    /// Hands out `at-fresh` on every refresh and counts the calls.
    #[derive(Default)]
    struct RotatingBackend {
        refresh_calls: AtomicUsize,
    }

    fn user() -> User {
        User {
            id: UserId::new(7),
            email: "driver@example.com".to_string(),
            created_at: Utc::now(),
        }
    }

    fn rejected(endpoint: &str) -> ApiError {
        ApiError::Status {
            method: Method::POST,
            endpoint: endpoint.to_string(),
            status: StatusCode::UNAUTHORIZED,
            message: "rejected".to_string(),
        }
    }

    impl SessionBackend for RotatingBackend {
        fn login<'a>(
            &'a self,
            _email: &'a Email,
            _password: &'a SecretString,
        ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
            async { Err(rejected("/auth/login")) }.boxed()
        }

        fn register<'a>(
            &'a self,
            _email: &'a Email,
            _password: &'a SecretString,
            _username: &'a str,
        ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
            async { Err(rejected("/auth/register")) }.boxed()
        }

        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a SecretString,
        ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
            async move {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                Ok(AuthResponse {
                    access_token: "at-fresh".to_string(),
                    refresh_token: "rt-fresh".to_string(),
                    user: user(),
                    expires_at: None,
                    token_type: None,
                })
            }
            .boxed()
        }

        fn fetch_profile<'a>(
            &'a self,
            _user_id: UserId,
            _access_token: &'a SecretString,
        ) -> BoxFuture<'a, Result<Profile, ApiError>> {
            async {
                Ok(Profile {
                    username: "volt".to_string(),
                    role: "user".to_string(),
                })
            }
            .boxed()
        }
    }

    fn dispatcher(persisted: Option<&str>) -> (Dispatcher, Arc<RotatingBackend>) {
        let storage = Arc::new(persisted.map_or_else(MemoryTokenStorage::new, |t| {
            MemoryTokenStorage::with_entry(REFRESH_TOKEN_KEY, t)
        }));
        let backend = Arc::new(RotatingBackend::default());
        let session = SessionStore::with_backend(storage, backend.clone());
        let transport = Transport::new(
            Url::parse("http://127.0.0.1:9/api").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        (Dispatcher::new(transport, session), backend)
    }

    fn secret(token: &str) -> SecretString {
        SecretString::from(token.to_string())
    }

    #[tokio::test]
    async fn test_interleaved_401s_share_the_replacement_token() {
        let (dispatcher, backend) = dispatcher(Some("rt-1"));
        dispatcher.session().set_session(secret("at-1"), user());

        // First caller to see the 401 refreshes
        let first = dispatcher.token_for_retry(Some(&secret("at-1"))).await;
        assert_eq!(first.unwrap().expose_secret(), "at-fresh");

        // Second caller was rejected with the same old token afterwards
        let second = dispatcher.token_for_retry(Some(&secret("at-1"))).await;
        assert_eq!(second.unwrap().expose_secret(), "at-fresh");

        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_current_token_triggers_refresh() {
        let (dispatcher, backend) = dispatcher(Some("rt-1"));
        dispatcher.session().set_session(secret("at-fresh"), user());

        let token = dispatcher.token_for_retry(Some(&secret("at-fresh"))).await;

        assert_eq!(token.unwrap().expose_secret(), "at-fresh");
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_goes_anonymous_when_session_ends() {
        let (dispatcher, backend) = dispatcher(None);
        dispatcher.session().set_session(secret("at-1"), user());

        let token = dispatcher.token_for_retry(Some(&secret("at-1"))).await;

        assert!(token.is_none());
        assert!(!dispatcher.session().is_authenticated());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    }
}
