//! Core types for EV Charge.
//!
//! This module provides type-safe wrappers for the domain concepts exchanged
//! with the charging-station API.

pub mod duration;
pub mod email;
pub mod id;
pub mod reservation;
pub mod station;
pub mod user;

pub use duration::{BookingDuration, DurationError};
pub use email::{Email, EmailError};
pub use id::*;
pub use reservation::{NewReservation, Reservation};
pub use station::{BookStationRequest, GasStation, MapStation, NewStation};
pub use user::{ApiMessage, AuthResponse, Profile, User, is_admin_role};
