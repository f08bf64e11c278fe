//! Reservation records for the booking history.

use serde::{Deserialize, Serialize};

use super::duration::BookingDuration;
use super::id::ReservationId;

/// A booked charging slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Reservation ID, used to cancel.
    pub id: ReservationId,
    /// Connector sequence number at the station.
    pub seq_num: u32,
    /// Station title.
    pub title: String,
    /// Start time as a Unix timestamp in seconds.
    pub start: i64,
    /// How long the slot is held.
    pub duration: BookingDuration,
}

/// Input for `/reservations/book`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    /// Connector sequence number at the station.
    pub seq_num: u32,
    /// Station title.
    pub title: String,
    /// Start time as a Unix timestamp in seconds.
    pub start: i64,
    /// How long to hold the slot.
    pub duration: BookingDuration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reservation_wire_format() {
        let reservation = NewReservation {
            seq_num: 1,
            title: "North Lot".to_string(),
            start: 1_700_000_000,
            duration: BookingDuration::from_minutes(90).unwrap(),
        };

        let json = serde_json::to_value(&reservation).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "seqNum": 1,
                "title": "North Lot",
                "start": 1_700_000_000,
                "duration": "PT1H30M"
            })
        );
    }

    #[test]
    fn test_reservation_deserialize() {
        let json = r#"{"id": 12, "seqNum": 2, "title": "Depot", "start": 1700000000, "duration": "PT2H"}"#;
        let reservation: Reservation = serde_json::from_str(json).unwrap();
        assert_eq!(reservation.id, ReservationId::new(12));
        assert_eq!(reservation.duration.minutes(), 120);
    }
}
