//! Admin station management. Every call requires the `admin` role.

use evcharge_core::{GasStation, NewStation};
use tracing::{info, instrument};

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::transport::RequestOptions;

/// Admin endpoints.
#[derive(Debug, Clone)]
pub struct AdminApi {
    dispatcher: Dispatcher,
}

impl AdminApi {
    /// Create the admin client.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    fn require_admin(&self) -> Result<(), ApiError> {
        let session = self.dispatcher.session();
        if !session.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }
        if !session.is_admin() {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }

    /// `GET /admin/stations`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotAuthenticated` or `ApiError::Forbidden` without
    /// the admin role, otherwise any request error.
    #[instrument(skip(self))]
    pub async fn list_stations(&self) -> Result<Vec<GasStation>, ApiError> {
        self.require_admin()?;
        let stations: Option<Vec<GasStation>> = self
            .dispatcher
            .dispatch_json("/admin/stations", &RequestOptions::get())
            .await?;
        Ok(stations.unwrap_or_default())
    }

    /// `POST /admin/stations/add`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotAuthenticated` or `ApiError::Forbidden` without
    /// the admin role, otherwise any request error.
    #[instrument(skip(self, station), fields(title = %station.title))]
    pub async fn add_station(&self, station: &NewStation) -> Result<serde_json::Value, ApiError> {
        self.require_admin()?;
        let options = RequestOptions::post_json(station)?;
        let ack = self
            .dispatcher
            .dispatch("/admin/stations/add", &options)
            .await?;
        info!("Station added");
        Ok(ack)
    }

    /// `DELETE /admin/stations/delete/{name}`, with spaces in the name sent
    /// as underscores.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotAuthenticated` or `ApiError::Forbidden` without
    /// the admin role, otherwise any request error.
    #[instrument(skip(self))]
    pub async fn delete_station(&self, name: &str) -> Result<serde_json::Value, ApiError> {
        self.require_admin()?;
        let ack = self
            .dispatcher
            .dispatch(&delete_endpoint(name), &RequestOptions::delete())
            .await?;
        info!("Station deleted");
        Ok(ack)
    }
}

fn delete_endpoint(name: &str) -> String {
    let name = name.trim().replace(' ', "_");
    format!("/admin/stations/delete/{}", urlencoding::encode(&name))
}
