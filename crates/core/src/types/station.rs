//! Charging-station records.

use serde::{Deserialize, Serialize};

use super::id::StationId;

/// A station shown on the map, as returned by `/stations/free`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapStation {
    /// Station ID.
    pub id: StationId,
    /// Display name.
    pub title: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Whether the station currently accepts bookings.
    pub active: bool,
}

/// A station as listed on the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasStation {
    /// Station ID.
    pub id: StationId,
    /// Display name.
    pub station_name: String,
}

/// Input for `/admin/stations/add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStation {
    /// Display name.
    pub title: String,
    /// Number of charging connectors.
    pub connector_count: u32,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Input for `/gas-stations/book`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookStationRequest {
    /// Station to book.
    pub gas_station_id: StationId,
}
