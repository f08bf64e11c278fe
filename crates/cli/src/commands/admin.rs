//! Station administration.
//!
//! The admin role is checked by the client before any request is sent.

use evcharge_client::EvChargeClient;
use evcharge_core::NewStation;

use crate::error::CliError;
use crate::output;

/// List all stations.
pub async fn list_stations(client: &EvChargeClient) -> Result<(), CliError> {
    let stations = client.admin().list_stations().await?;
    if stations.is_empty() {
        output::line("No stations");
        return Ok(());
    }
    for station in &stations {
        output::line(format_args!("{:>6}  {}", station.id.as_i64(), station.station_name));
    }
    Ok(())
}

/// Add a station.
pub async fn add_station(
    client: &EvChargeClient,
    title: String,
    connector_count: u32,
    latitude: f64,
    longitude: f64,
) -> Result<(), CliError> {
    let station = NewStation {
        title,
        connector_count,
        latitude,
        longitude,
    };
    let ack = client.admin().add_station(&station).await?;
    output::ack(&format!("Station {} added", station.title), &ack)
}

/// Delete a station by name.
pub async fn delete_station(client: &EvChargeClient, name: &str) -> Result<(), CliError> {
    let ack = client.admin().delete_station(name).await?;
    output::ack(&format!("Station {name} deleted"), &ack)
}
