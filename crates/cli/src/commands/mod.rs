//! CLI command implementations.

pub mod admin;
pub mod auth;
pub mod profile;
pub mod reservations;
pub mod stations;
