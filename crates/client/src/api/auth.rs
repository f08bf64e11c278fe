//! Auth endpoints: login, register, refresh, password reset, profile lookup.

use evcharge_core::{AuthResponse, Email, Profile, UserId};
use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::session::SessionBackend;
use crate::transport::Transport;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    username: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

/// Non-retrying client for the auth endpoints.
///
/// A 401 from any of these is returned to the caller as-is; nothing here
/// touches the session.
#[derive(Debug, Clone)]
pub struct AuthApi {
    transport: Transport,
}

impl AuthApi {
    /// Create the auth client over a transport.
    #[must_use]
    pub const fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// `POST /auth/login`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for rejected credentials, or a transport
    /// or parse error.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.as_str(),
            password: password.expose_secret(),
        };
        self.transport.post_unauthenticated("/auth/login", &body).await
    }

    /// `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the server's message (e.g. a taken
    /// email), or a transport or parse error.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        username: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            email: email.as_str(),
            password: password.expose_secret(),
            username,
        };
        self.transport
            .post_unauthenticated("/auth/register", &body)
            .await
    }

    /// `POST /auth/refresh`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the refresh token is rejected, or a
    /// transport or parse error.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthResponse, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.expose_secret(),
        };
        self.transport
            .post_unauthenticated("/auth/refresh", &body)
            .await
    }

    /// `POST /auth/forgotpass`; the server emails a reset link.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the server refuses, or a transport or
    /// parse error.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn reset_password(&self, email: &Email) -> Result<serde_json::Value, ApiError> {
        let body = ForgotPasswordRequest {
            email: email.as_str(),
        };
        self.transport
            .post_unauthenticated("/auth/forgotpass", &body)
            .await
    }

    /// `GET /users/profile?supabaseId={id}` with an explicit bearer token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for a non-2xx answer, or a transport or
    /// parse error.
    #[instrument(skip(self, access_token))]
    pub async fn get_profile(
        &self,
        user_id: UserId,
        access_token: &SecretString,
    ) -> Result<Profile, ApiError> {
        let endpoint = format!("/users/profile?supabaseId={user_id}");
        self.transport.get_with_token(&endpoint, access_token).await
    }
}

impl SessionBackend for AuthApi {
    fn login<'a>(
        &'a self,
        email: &'a Email,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
        Self::login(self, email, password).boxed()
    }

    fn register<'a>(
        &'a self,
        email: &'a Email,
        password: &'a SecretString,
        username: &'a str,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
        Self::register(self, email, password, username).boxed()
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthResponse, ApiError>> {
        Self::refresh(self, refresh_token).boxed()
    }

    fn fetch_profile<'a>(
        &'a self,
        user_id: UserId,
        access_token: &'a SecretString,
    ) -> BoxFuture<'a, Result<Profile, ApiError>> {
        self.get_profile(user_id, access_token).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies_match_wire_names() {
        let body = RefreshRequest {
            refresh_token: "rt-1",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"refresh_token": "rt-1"})
        );

        let body = RegisterRequest {
            email: "d@example.com",
            password: "pw",
            username: "volt",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"email": "d@example.com", "password": "pw", "username": "volt"})
        );
    }
}
