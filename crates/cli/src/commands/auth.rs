//! Sign-in, registration and session inspection.

use evcharge_client::EvChargeClient;
use evcharge_core::Email;
use secrecy::SecretString;

use crate::error::CliError;
use crate::output;

/// Sign in and persist the refresh token.
pub async fn login(client: &EvChargeClient, email: &str, password: String) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = client
        .session()
        .login(&email, &SecretString::from(password))
        .await?;

    output::line(format_args!("Logged in as {}", user.email));
    Ok(())
}

/// Create an account and sign in.
pub async fn register(
    client: &EvChargeClient,
    email: &str,
    username: &str,
    password: String,
) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = client
        .session()
        .register(&email, &SecretString::from(password), username)
        .await?;

    output::line(format_args!("Registered {} as {username}", user.email));
    Ok(())
}

/// Forget the session locally.
pub fn logout(client: &EvChargeClient) {
    client.session().logout();
    output::line("Logged out");
}

/// Show who is signed in.
pub fn whoami(client: &EvChargeClient) -> Result<(), CliError> {
    let snapshot = client.session().snapshot();
    let Some(user) = &snapshot.user else {
        return Err(CliError::NotLoggedIn);
    };

    output::line(format_args!("Email:    {}", user.email));
    output::line(format_args!(
        "Username: {}",
        snapshot.username.as_deref().unwrap_or("-")
    ));
    output::line(format_args!(
        "Role:     {}",
        snapshot.role.as_deref().unwrap_or("-")
    ));
    output::line(format_args!("Since:    {}", user.created_at.format("%Y-%m-%d")));
    Ok(())
}

/// Ask the server to email a reset link.
pub async fn forgot_password(client: &EvChargeClient, email: &str) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    client.auth().reset_password(&email).await?;
    output::line(format_args!("If {email} has an account, a reset link is on its way"));
    Ok(())
}
