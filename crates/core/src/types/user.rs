//! Account records returned by the auth and profile endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The authenticated account, as returned alongside every token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account ID, also the key for profile lookups.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Response body of `/auth/login`, `/auth/register` and `/auth/refresh`.
///
/// Implements `Debug` manually to redact both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Short-lived bearer token for API calls.
    pub access_token: String,
    /// Long-lived token; rotated on every refresh.
    pub refresh_token: String,
    /// The account the tokens belong to.
    pub user: User,
    /// Unix timestamp when the access token expires, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Token type (normally `bearer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Profile attributes kept apart from the auth payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub username: String,
    /// Role name, e.g. `admin` or `user`.
    pub role: String,
}

impl Profile {
    /// Whether this profile carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        is_admin_role(&self.role)
    }
}

/// Role names are compared case-insensitively.
#[must_use]
pub fn is_admin_role(role: &str) -> bool {
    role.trim().eq_ignore_ascii_case("admin")
}

/// Generic `{ data, message }` envelope used by the write endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage<T> {
    /// Payload.
    pub data: T,
    /// Optional human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_deserialize_ignores_unknown_fields() {
        let json = r#"{
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": "3600",
            "expires_at": 1700000000,
            "token_type": "bearer",
            "user": {"id": 7, "email": "d@example.com", "created_at": "2024-05-01T10:00:00Z"}
        }"#;

        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.user.id, UserId::new(7));
        assert_eq!(resp.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn test_auth_response_debug_redacts_tokens() {
        let resp = AuthResponse {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            user: User {
                id: UserId::new(1),
                email: "d@example.com".to_string(),
                created_at: Utc::now(),
            },
            expires_at: None,
            token_type: None,
        };

        let debug = format!("{resp:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_is_admin_role() {
        assert!(is_admin_role("admin"));
        assert!(is_admin_role("ADMIN"));
        assert!(is_admin_role(" Admin "));
        assert!(!is_admin_role("user"));
        assert!(!is_admin_role(""));
    }
}
