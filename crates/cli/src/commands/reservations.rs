//! Booking history.

use chrono::{DateTime, Utc};
use evcharge_client::EvChargeClient;
use evcharge_core::{BookingDuration, NewReservation, ReservationId};

use crate::error::CliError;
use crate::output;

fn require_login(client: &EvChargeClient) -> Result<(), CliError> {
    if client.session().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::NotLoggedIn)
    }
}

/// Show booking history.
pub async fn list(client: &EvChargeClient) -> Result<(), CliError> {
    require_login(client)?;
    let reservations = client.reservations().list().await?;
    if reservations.is_empty() {
        output::line("No reservations");
        return Ok(());
    }

    for r in &reservations {
        let start = DateTime::<Utc>::from_timestamp(r.start, 0)
            .map_or_else(|| r.start.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        output::line(format_args!(
            "{:>6}  {:<30} #{:<3} {start}  {} min",
            r.id.as_i64(),
            r.title,
            r.seq_num,
            r.duration.minutes()
        ));
    }
    Ok(())
}

/// Reserve a slot.
pub async fn book(
    client: &EvChargeClient,
    title: String,
    seq_num: u32,
    start: DateTime<Utc>,
    minutes: u32,
) -> Result<(), CliError> {
    require_login(client)?;
    let reservation = NewReservation {
        seq_num,
        title,
        start: start.timestamp(),
        duration: BookingDuration::from_minutes(minutes)?,
    };

    let ack = client.reservations().create(&reservation).await?;
    output::ack(
        &format!(
            "Reserved {} from {start} for {} min",
            reservation.title, minutes
        ),
        &ack,
    )
}

/// Cancel a reservation.
pub async fn cancel(client: &EvChargeClient, id: ReservationId) -> Result<(), CliError> {
    require_login(client)?;
    let ack = client.reservations().cancel(id).await?;
    output::ack(&format!("Reservation {id} cancelled"), &ack)
}
