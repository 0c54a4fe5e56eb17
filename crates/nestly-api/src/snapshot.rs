// Snapshot fetcher
//
// One-shot GET of a whole resource tree through the router, decoded and
// bound to the issuing session.

use reqwest::StatusCode;
use tracing::debug;

use crate::client::Client;
use crate::error::{ApiError, ErrorKind};
use crate::models::{Devices, Resource, Structures};
use crate::router::{Delivery, Route};

impl Client {
    /// Fetch every thermostat and smoke/CO alarm.
    ///
    /// `GET {base}/devices.json`
    pub async fn devices(&self) -> Result<Devices, ApiError> {
        self.fetch().await
    }

    /// Fetch every structure.
    ///
    /// `GET {base}/structures.json`
    pub async fn structures(&self) -> Result<Structures, ApiError> {
        self.fetch().await
    }

    /// Fetch and decode any [`Resource`].
    ///
    /// Non-200 answers become `devices_error` carrying the server's
    /// description and status; an unreadable body is `body_read_error`.
    pub async fn fetch<R: Resource>(&self) -> Result<R, ApiError> {
        let resp = self
            .router()
            .send(&Route::get(R::PATH, Delivery::Snapshot))
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::body_read(e).with_status(status))?;

        if status != StatusCode::OK {
            debug!(%status, path = R::PATH, "snapshot rejected");
            return Err(ApiError::from_response_body(ErrorKind::Devices, status, &body));
        }

        let mut resource: R = serde_json::from_str(&body).map_err(ApiError::body)?;
        resource.attach_session(self.handle());
        Ok(resource)
    }
}
