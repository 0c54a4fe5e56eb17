// Structure records: homes, their away state and arrival ETA.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::client::SessionHandle;
use crate::error::ApiError;
use crate::mutation::StructureControl;

/// The `/structures` tree, keyed by structure id.
pub type Structures = HashMap<String, Structure>;

/// Away state of a structure.
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
pub enum AwayMode {
    Home,
    Away,
    AutoAway,
}

impl AwayMode {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl FromStr for AwayMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ApiError::api("Invalid Away requested - must be home, away or auto-away"))
    }
}

/// A Nest structure (a home and the devices in it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Structure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_id: Option<String>,
    /// Device ids of the thermostats in this structure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_co_alarms: Option<Vec<String>>,
    /// Raw wire value, `"home"`, `"away"` or `"auto-away"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_period_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_period_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<Eta>,
    #[serde(skip)]
    pub(crate) session: Option<SessionHandle>,
}

impl Structure {
    /// Session this record was fetched or streamed through.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Mutation capability for this structure, bound to its session.
    pub fn control(&self) -> Result<StructureControl, ApiError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ApiError::api("record is not attached to a session"))?;
        let id = self
            .structure_id
            .as_deref()
            .ok_or_else(|| ApiError::api("structure has no structure_id"))?;
        Ok(session.structure(id))
    }
}

/// Estimated arrival window for a trip home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eta {
    pub trip_id: String,
    pub estimated_arrival_window_begin: DateTime<Utc>,
    pub estimated_arrival_window_end: DateTime<Utc>,
}
