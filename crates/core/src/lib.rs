//! EV Charge Core - Shared types library.
//!
//! This crate provides the domain types shared by the EV Charge components:
//! - `client` - Session management and the authenticated API client
//! - `cli` - Command-line front end for booking and station management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no token storage,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, booking durations and the API records
//!   exchanged with the charging-station service

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
