// Device records: thermostats and smoke/CO alarms.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::client::SessionHandle;
use crate::error::ApiError;
use crate::mutation::ThermostatControl;

/// The `/devices` tree: every thermostat and smoke/CO alarm keyed by device id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Devices {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub thermostats: HashMap<String, Thermostat>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub smoke_co_alarms: HashMap<String, SmokeCoAlarm>,
}

impl Devices {
    /// First thermostat whose `name` matches exactly.
    pub fn find_thermostat(&self, name: &str) -> Option<&Thermostat> {
        self.thermostats
            .values()
            .find(|t| t.name.as_deref() == Some(name))
    }
}

/// HVAC operating mode of a thermostat.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HvacMode {
    Cool,
    Heat,
    HeatCool,
    Eco,
    Off,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl FromStr for HvacMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::iter().find(|m| m.as_str() == s).ok_or_else(|| {
            ApiError::api("Invalid HvacMode requested - must be cool, heat, heat-cool, eco, or off")
        })
    }
}

/// A Nest thermostat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thermostat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_long: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_cool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_heat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_using_emergency_heat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_fan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_timer_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_timer_timeout: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_leaf: Option<bool>,
    /// `"F"` or `"C"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_high_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_high_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_low_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_low_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_temperature_high_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_temperature_high_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_temperature_low_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_temperature_low_c: Option<f64>,
    /// Raw wire value; see [`Thermostat::current_hvac_mode`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_temperature_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i32>,
    /// `"heating"`, `"cooling"` or `"off"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hvac_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_id: Option<String>,
    #[serde(skip)]
    pub(crate) session: Option<SessionHandle>,
}

impl Thermostat {
    /// Session this record was fetched or streamed through.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Parse the reported `hvac_mode`.
    pub fn current_hvac_mode(&self) -> Result<HvacMode, ApiError> {
        let raw = self.hvac_mode.as_deref().unwrap_or_default();
        HvacMode::iter()
            .find(|m| m.as_str() == raw)
            .ok_or_else(|| ApiError::api(format!("Invalid HvacMode found, was {raw}")))
    }

    /// Mutation capability for this thermostat, bound to its session.
    pub fn control(&self) -> Result<ThermostatControl, ApiError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ApiError::api("record is not attached to a session"))?;
        let id = self
            .device_id
            .as_deref()
            .ok_or_else(|| ApiError::api("thermostat has no device_id"))?;
        Ok(session.thermostat(id))
    }
}

/// A Nest Protect smoke and carbon-monoxide alarm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeCoAlarm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_long: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_alarm_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_alarm_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_color_state: Option<String>,
    #[serde(skip)]
    pub(crate) session: Option<SessionHandle>,
}

impl SmokeCoAlarm {
    /// Session this record was fetched or streamed through.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }
}
