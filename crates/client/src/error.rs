//! Error types for the EV Charge API client.

use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur when talking to the charging-station API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    ///
    /// `message` is the response body as sent by the server, so validation
    /// errors such as a duplicate email reach the caller verbatim.
    #[error("{method} {endpoint} failed ({status}): {message}")]
    Status {
        /// HTTP method of the failed request.
        method: Method,
        /// API path that was called.
        endpoint: String,
        /// Response status.
        status: StatusCode,
        /// Response body.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request target is not a relative API path.
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(String),

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// No auth backend has been configured on the session.
    #[error("no auth backend configured")]
    NoBackend,

    /// The operation needs an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The operation needs the admin role.
    #[error("admin role required")]
    Forbidden,

    /// Persisting the refresh token failed.
    #[error("token storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// HTTP status of the failure, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server rejected the credentials (401).
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display_names_endpoint_and_status() {
        let err = ApiError::Status {
            method: Method::POST,
            endpoint: "/auth/register".to_string(),
            status: StatusCode::CONFLICT,
            message: "User already registered".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "POST /auth/register failed (409 Conflict): User already registered"
        );
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_is_unauthorized() {
        let err = ApiError::Status {
            method: Method::GET,
            endpoint: "/reservations/getall".to_string(),
            status: StatusCode::UNAUTHORIZED,
            message: String::new(),
        };
        assert!(err.is_unauthorized());
        assert!(!ApiError::NotAuthenticated.is_unauthorized());
    }
}
