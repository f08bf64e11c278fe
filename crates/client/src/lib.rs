//! EV Charge API client.
//!
//! The heart of the crate is the session lifecycle: [`SessionStore`] keeps the
//! access token in memory and the refresh token on disk, refreshes at most
//! once at a time however many callers need a token, and falls back to a
//! logged-out state whenever a refresh fails. [`Dispatcher`] attaches the
//! token to API requests and retries once after a 401.
//!
//! # Example
//!
//! ```rust,ignore
//! use evcharge_client::{ClientConfig, EvChargeClient};
//!
//! let config = ClientConfig::from_env()?;
//! let client = EvChargeClient::new(&config)?;
//! client.start().await;
//!
//! for reservation in client.reservations().list().await? {
//!     println!("{} at {}", reservation.title, reservation.start);
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod storage;
pub mod transport;

pub use client::EvChargeClient;
pub use config::{ClientConfig, ConfigError};
pub use dispatch::{Dispatcher, MAX_AUTH_RETRIES};
pub use error::ApiError;
pub use session::{
    REFRESH_TOKEN_KEY, RefreshOutcome, SessionBackend, SessionSnapshot, SessionStatus,
    SessionStore,
};
pub use storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenStorage};
pub use transport::{RawResponse, RequestOptions, Transport};
