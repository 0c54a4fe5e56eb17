// Nest data model
//
// Plain serde records for the `/devices` and `/structures` trees. Every field
// is optional on the wire and omitted on encode when absent, so decoding and
// re-encoding a document keeps everything that was populated.

pub mod device;
pub mod structure;

use serde::de::DeserializeOwned;

use crate::client::SessionHandle;

pub use device::{Devices, HvacMode, SmokeCoAlarm, Thermostat};
pub use structure::{AwayMode, Eta, Structure, Structures};

/// A top-level resource that can be fetched as a snapshot or streamed.
///
/// Implemented by [`Devices`] and [`Structures`]. After decoding, the
/// fetcher or stream attaches the issuing session to every record so the
/// caller can mutate it later.
pub trait Resource: DeserializeOwned + Send + 'static {
    /// Path of the resource relative to the API base.
    const PATH: &'static str;

    /// Attach `handle` to every record in this resource.
    fn attach_session(&mut self, handle: &SessionHandle);
}

impl Resource for Devices {
    const PATH: &'static str = "devices.json";

    fn attach_session(&mut self, handle: &SessionHandle) {
        for thermostat in self.thermostats.values_mut() {
            thermostat.session = Some(handle.clone());
        }
        for alarm in self.smoke_co_alarms.values_mut() {
            alarm.session = Some(handle.clone());
        }
    }
}

impl Resource for Structures {
    const PATH: &'static str = "structures.json";

    fn attach_session(&mut self, handle: &SessionHandle) {
        for structure in self.values_mut() {
            structure.session = Some(handle.clone());
        }
    }
}
