//! Profile settings: username and password changes.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, instrument};

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::transport::RequestOptions;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeUsernameRequest<'a> {
    new_username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    new_password: &'a str,
}

/// Profile endpoints for the signed-in user.
#[derive(Debug, Clone)]
pub struct ProfileApi {
    dispatcher: Dispatcher,
}

impl ProfileApi {
    /// Create the profile client.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Change the username and update the cached one in the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the server's message if the name is
    /// refused, or a transport error.
    #[instrument(skip(self))]
    pub async fn change_username(&self, new_username: &str) -> Result<serde_json::Value, ApiError> {
        let options = RequestOptions::post_json(&ChangeUsernameRequest { new_username })?;
        let ack = self
            .dispatcher
            .dispatch("/users/profile/changeusername", &options)
            .await?;

        self.dispatcher.session().set_username(new_username);
        info!("Username changed");
        Ok(ack)
    }

    /// Change the password.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the server's message if the password
    /// is refused, or a transport error.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        new_password: &SecretString,
    ) -> Result<serde_json::Value, ApiError> {
        let options = RequestOptions::post_json(&ChangePasswordRequest {
            new_password: new_password.expose_secret(),
        })?;
        self.dispatcher
            .dispatch("/users/profile/changepass", &options)
            .await
    }
}
