// Mutation protocol
//
// Typed setters for thermostats and structures. Arguments are checked
// locally first; a rejected argument never reaches the network. Accepted
// ones become a JSON PUT through the router.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::SessionHandle;
use crate::error::{ApiError, ErrorKind};
use crate::models::{AwayMode, Eta, HvacMode};
use crate::router::Route;

const FAHRENHEIT_RANGE: std::ops::RangeInclusive<i32> = 50..=90;
const CELSIUS_RANGE: std::ops::RangeInclusive<f64> = 9.0..=32.0;

// ── ThermostatControl ────────────────────────────────────────────────

/// Write access to one thermostat, bound to the session it came from.
///
/// Obtained from [`Thermostat::control`](crate::models::Thermostat::control)
/// or [`Client::thermostat`](crate::Client::thermostat).
#[derive(Debug, Clone)]
pub struct ThermostatControl {
    handle: SessionHandle,
    device_id: String,
}

impl ThermostatControl {
    pub(crate) fn new(handle: SessionHandle, device_id: String) -> Self {
        Self { handle, device_id }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Start or stop the fan timer.
    pub async fn set_fan_timer_active(&self, active: bool) -> Result<(), ApiError> {
        self.put(&json!({ "fan_timer_active": active })).await
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), ApiError> {
        self.put(&json!({ "hvac_mode": mode.as_str() })).await
    }

    /// Set the target temperature in Fahrenheit (50..=90).
    pub async fn set_target_temp_f(&self, temp: i32) -> Result<(), ApiError> {
        validate_fahrenheit(temp)?;
        self.put(&json!({ "target_temperature_f": temp })).await
    }

    /// Set the target temperature in Celsius (9..=32).
    pub async fn set_target_temp_c(&self, temp: f64) -> Result<(), ApiError> {
        validate_celsius(temp)?;
        self.put(&json!({ "target_temperature_c": temp })).await
    }

    /// Set the heat-cool band in Fahrenheit.
    pub async fn set_target_temp_high_low_f(&self, high: i32, low: i32) -> Result<(), ApiError> {
        validate_high_low(high.cmp(&low))?;
        self.put(&json!({
            "target_temperature_high_f": high,
            "target_temperature_low_f": low,
        }))
        .await
    }

    /// Set the heat-cool band in Celsius.
    pub async fn set_target_temp_high_low_c(&self, high: f64, low: f64) -> Result<(), ApiError> {
        validate_high_low(high.partial_cmp(&low).unwrap_or(Ordering::Less))?;
        self.put(&json!({
            "target_temperature_high_c": high,
            "target_temperature_low_c": low,
        }))
        .await
    }

    async fn put(&self, body: &Value) -> Result<(), ApiError> {
        let id = checked_id(&self.device_id)?;
        put(&self.handle, vec!["devices", "thermostats", id], body)
            .await
            .map(drop)
    }
}

// ── StructureControl ─────────────────────────────────────────────────

/// Write access to one structure, bound to the session it came from.
#[derive(Debug, Clone)]
pub struct StructureControl {
    handle: SessionHandle,
    structure_id: String,
}

impl StructureControl {
    pub(crate) fn new(handle: SessionHandle, structure_id: String) -> Self {
        Self {
            handle,
            structure_id,
        }
    }

    pub fn structure_id(&self) -> &str {
        &self.structure_id
    }

    pub async fn set_away(&self, mode: AwayMode) -> Result<(), ApiError> {
        let id = checked_id(&self.structure_id)?;
        let body = json!({ "away": mode.as_str() });
        put(&self.handle, vec!["structures", id], &body)
            .await
            .map(drop)
    }

    /// Announce an arrival window for a trip home.
    ///
    /// `begin` must not be in the past and `end` must not precede `begin`.
    /// Returns the ETA the service echoed back, if its answer decodes as one.
    pub async fn set_eta(
        &self,
        trip_id: impl Into<String>,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Eta>, ApiError> {
        let id = checked_id(&self.structure_id)?;
        validate_eta_window(begin, end, Utc::now())?;

        let eta = Eta {
            trip_id: trip_id.into(),
            estimated_arrival_window_begin: begin,
            estimated_arrival_window_end: end,
        };
        let body = serde_json::to_value(&eta).map_err(ApiError::body)?;

        let echoed = put(&self.handle, vec!["structures", id, "eta.json"], &body).await?;
        Ok(serde_json::from_str(&echoed).ok())
    }
}

// ── Shared PUT ───────────────────────────────────────────────────────

/// PUT `body` to the resource at `segments` and return the raw success body.
///
/// Any non-200 answer is an `api_error` carrying the server's description
/// and the status, whatever tag the server used.
async fn put(
    handle: &SessionHandle,
    segments: Vec<&str>,
    body: &Value,
) -> Result<String, ApiError> {
    let route = Route::put(segments, body);
    let path = route.segments.join("/");
    let resp = handle.router().send(&route).await?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::body_read(e).with_status(status))?;

    if status != StatusCode::OK {
        debug!(%status, %path, "mutation rejected");
        return Err(ApiError::from_response_body(ErrorKind::Api, status, &text));
    }

    debug!(%path, session = handle.id(), "mutation accepted");
    Ok(text)
}

// ── Validation ───────────────────────────────────────────────────────

/// A device or structure id usable as one path segment.
///
/// Reserved characters are encoded by the router, but an empty, `.` or `..`
/// id would name the collection or its parent instead of a record.
fn checked_id(id: &str) -> Result<&str, ApiError> {
    if matches!(id, "" | "." | "..") {
        Err(ApiError::api(format!("invalid resource id {id:?}")))
    } else {
        Ok(id)
    }
}

fn validate_fahrenheit(temp: i32) -> Result<(), ApiError> {
    if FAHRENHEIT_RANGE.contains(&temp) {
        Ok(())
    } else {
        Err(ApiError::api("Temperature must be between 50 and 90 Farenheit"))
    }
}

fn validate_celsius(temp: f64) -> Result<(), ApiError> {
    if CELSIUS_RANGE.contains(&temp) {
        Ok(())
    } else {
        Err(ApiError::api("Temperature must be between 9 and 32 Celcius"))
    }
}

fn validate_high_low(high_vs_low: Ordering) -> Result<(), ApiError> {
    if high_vs_low == Ordering::Less {
        Err(ApiError::api(
            "The high temperature must be greater than the low temperature",
        ))
    } else {
        Ok(())
    }
}

/// Check an arrival window against `now`. Equal instants are accepted.
pub(crate) fn validate_eta_window(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if begin < now {
        return Err(ApiError::eta("The begin time must be greater than the time now"));
    }
    if end < begin {
        return Err(ApiError::eta("The end time must be greater than the begin time"));
    }
    Ok(())
}
