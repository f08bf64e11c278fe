//! Station search and direct station booking.

use chrono::{DateTime, SecondsFormat, Utc};
use evcharge_core::{BookStationRequest, MapStation};
use tracing::instrument;

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::transport::RequestOptions;

/// Station endpoints.
#[derive(Debug, Clone)]
pub struct StationsApi {
    dispatcher: Dispatcher,
}

impl StationsApi {
    /// Create the stations client.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Stations free at `time`, via `GET /stations/free?timestamp=<unix seconds>`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for a non-2xx answer, or a transport or
    /// parse error.
    #[instrument(skip(self))]
    pub async fn available_at(&self, time: DateTime<Utc>) -> Result<Vec<MapStation>, ApiError> {
        let endpoint = format!("/stations/free?timestamp={}", time.timestamp());
        let stations: Option<Vec<MapStation>> = self
            .dispatcher
            .dispatch_json(&endpoint, &RequestOptions::get())
            .await?;
        Ok(stations.unwrap_or_default())
    }

    /// Book a station from `start_time`, via `POST /gas-stations/book`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the server's message if the booking
    /// is refused, or a transport error.
    #[instrument(skip(self))]
    pub async fn book(
        &self,
        request: BookStationRequest,
        start_time: DateTime<Utc>,
    ) -> Result<serde_json::Value, ApiError> {
        let endpoint = book_endpoint(start_time);
        let options = RequestOptions::post_json(&request)?;
        self.dispatcher.dispatch(&endpoint, &options).await
    }
}

fn book_endpoint(start_time: DateTime<Utc>) -> String {
    let start = start_time.to_rfc3339_opts(SecondsFormat::Secs, true);
    format!("/gas-stations/book?startTime={}", urlencoding::encode(&start))
}
