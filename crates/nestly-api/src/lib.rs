// nestly-api: Async Rust client for the Nest developer REST API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod mutation;
pub mod router;
pub mod session;
mod snapshot;
pub mod stream;
pub mod transport;

pub use auth::{AccessToken, AuthorizationGrant, Credentials, DEFAULT_TOKEN_URL};
pub use client::{Client, ClientConfig, DEFAULT_API_URL, SessionHandle};
pub use error::{ApiError, ErrorKind};
pub use models::{
    AwayMode, Devices, Eta, HvacMode, Resource, SmokeCoAlarm, Structure, Structures, Thermostat,
};
pub use mutation::{StructureControl, ThermostatControl};
pub use router::Delivery;
pub use session::Session;
pub use stream::{DEFAULT_MAX_FRAME_LEN, EventStream, ReconnectConfig, StreamEvent};
pub use transport::{TlsMode, TransportConfig};
