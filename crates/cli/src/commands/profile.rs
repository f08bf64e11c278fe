//! Profile settings.

use evcharge_client::EvChargeClient;
use secrecy::SecretString;

use crate::error::CliError;
use crate::output;

fn require_login(client: &EvChargeClient) -> Result<(), CliError> {
    if client.session().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::NotLoggedIn)
    }
}

/// Change the display name.
pub async fn set_username(client: &EvChargeClient, username: &str) -> Result<(), CliError> {
    require_login(client)?;
    let ack = client.profile().change_username(username).await?;
    output::ack(&format!("Username changed to {username}"), &ack)
}

/// Change the password.
pub async fn set_password(client: &EvChargeClient, password: String) -> Result<(), CliError> {
    require_login(client)?;
    let ack = client
        .profile()
        .change_password(&SecretString::from(password))
        .await?;
    output::ack("Password changed", &ack)
}
