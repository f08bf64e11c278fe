//! CLI error type.

use evcharge_client::{ApiError, ConfigError};
use evcharge_core::{DurationError, EmailError};
use thiserror::Error;

/// Errors that can end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The email argument is invalid.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// The duration argument is invalid.
    #[error("Invalid duration: {0}")]
    Duration(#[from] DurationError),

    /// The command needs a signed-in session.
    #[error("Not logged in; run `evcharge login` first")]
    NotLoggedIn,

    /// Output could not be rendered.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}
