//! Booking history: create, list and cancel reservations.

use evcharge_core::{NewReservation, Reservation, ReservationId};
use tracing::instrument;

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::transport::RequestOptions;

/// Reservation endpoints.
#[derive(Debug, Clone)]
pub struct ReservationsApi {
    dispatcher: Dispatcher,
}

impl ReservationsApi {
    /// Create the reservations client.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// `POST /reservations/book`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the server's message if the slot
    /// cannot be booked, or a transport error.
    #[instrument(skip(self, reservation), fields(title = %reservation.title))]
    pub async fn create(&self, reservation: &NewReservation) -> Result<serde_json::Value, ApiError> {
        let options = RequestOptions::post_json(reservation)?;
        self.dispatcher
            .dispatch("/reservations/book", &options)
            .await
    }

    /// `GET /reservations/getall`. A `null` body reads as no reservations.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for a non-2xx answer, or a transport or
    /// parse error.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Reservation>, ApiError> {
        let reservations: Option<Vec<Reservation>> = self
            .dispatcher
            .dispatch_json("/reservations/getall", &RequestOptions::get())
            .await?;
        Ok(reservations.unwrap_or_default())
    }

    /// `DELETE /reservations/cancel/{id}`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the reservation cannot be cancelled, or
    /// a transport error.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: ReservationId) -> Result<serde_json::Value, ApiError> {
        self.dispatcher
            .dispatch(&format!("/reservations/cancel/{id}"), &RequestOptions::delete())
            .await
    }
}
