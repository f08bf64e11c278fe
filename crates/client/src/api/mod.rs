//! Typed wrappers around the charging-station API.
//!
//! [`AuthApi`] talks to the auth endpoints directly over the transport and
//! never retries; it is the session's backend. The other wrappers go through
//! the [`Dispatcher`](crate::Dispatcher) and so get the token attached and the
//! 401 retry for free.

mod admin;
mod auth;
mod profile;
mod reservations;
mod stations;

pub use admin::AdminApi;
pub use auth::AuthApi;
pub use profile::ProfileApi;
pub use reservations::ReservationsApi;
pub use stations::StationsApi;
