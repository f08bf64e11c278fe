//! Station search and direct booking.

use chrono::{DateTime, Utc};
use evcharge_client::EvChargeClient;
use evcharge_core::{BookStationRequest, StationId};

use crate::error::CliError;
use crate::output;

/// List stations free at `at`.
pub async fn free(client: &EvChargeClient, at: DateTime<Utc>) -> Result<(), CliError> {
    let stations = client.stations().available_at(at).await?;
    if stations.is_empty() {
        output::line(format_args!("No stations free at {at}"));
        return Ok(());
    }

    for station in &stations {
        output::line(format_args!(
            "{:>6}  {:<30} {:>9.5}, {:>10.5}{}",
            station.id.as_i64(),
            station.title,
            station.latitude,
            station.longitude,
            if station.active { "" } else { "  (inactive)" }
        ));
    }
    Ok(())
}

/// Book a station from `start`.
pub async fn book(
    client: &EvChargeClient,
    station_id: StationId,
    start: DateTime<Utc>,
) -> Result<(), CliError> {
    if !client.session().is_authenticated() {
        return Err(CliError::NotLoggedIn);
    }
    let ack = client
        .stations()
        .book(
            BookStationRequest {
                gas_station_id: station_id,
            },
            start,
        )
        .await?;
    output::ack(&format!("Station {station_id} booked from {start}"), &ack)
}
