// Public client facade and the session handle carried by records.

use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::auth::{self, Credentials};
use crate::error::ApiError;
use crate::models::{Devices, Resource};
use crate::mutation::{StructureControl, ThermostatControl};
use crate::router::{Delivery, Route, Router};
use crate::session::Session;
use crate::transport::TransportConfig;

/// Default Nest developer API URL.
pub const DEFAULT_API_URL: &str = "https://developer-api.nest.com";

/// Everything needed to build a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub credentials: Credentials,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Config for the default API URL with a pre-issued access token.
    pub fn with_token(token: impl Into<SecretString>) -> Result<Self, ApiError> {
        Ok(Self {
            api_url: Url::parse(DEFAULT_API_URL)?,
            credentials: Credentials::AccessToken(token.into()),
            transport: TransportConfig::default(),
        })
    }
}

/// Async client for the Nest developer API.
///
/// Cheap to clone; clones share one session, so an endpoint discovered by
/// any clone (or by any stream) is reused by all of them.
///
/// ```rust,ignore
/// let client = Client::connect(ClientConfig::with_token("c.abc123")?).await?;
/// let devices = client.devices().await?;
/// for thermostat in devices.thermostats.values() {
///     thermostat.control()?.set_target_temp_f(68).await?;
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    handle: SessionHandle,
}

impl Client {
    /// Build a client, exchanging an authorization code first if the
    /// credentials call for it.
    pub async fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let http = config.transport.build_client()?;

        let session = match config.credentials {
            Credentials::AccessToken(token) => Session::new(&config.api_url, token)?,
            Credentials::AuthorizationCode(grant) => {
                let access = auth::exchange_authorization_code(&http, &grant).await?;
                Session::new(&config.api_url, access.token)?.with_grant(grant, access.expires_in)
            }
        };

        debug!(session = session.id(), api_url = %session.api_url(), "client ready");
        Ok(Self::from_parts(session, http, config.transport))
    }

    /// Build a client from an access token without any network I/O.
    pub fn with_token(
        api_url: &Url,
        token: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, ApiError> {
        let http = transport.build_client()?;
        let session = Session::new(api_url, token)?;
        Ok(Self::from_parts(session, http, transport.clone()))
    }

    fn from_parts(session: Session, http: reqwest::Client, transport: TransportConfig) -> Self {
        Self {
            handle: SessionHandle {
                router: Arc::new(Router::new(session, http, transport)),
            },
        }
    }

    /// The handle attached to every record this client produces.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn session(&self) -> &Session {
        self.handle.session()
    }

    pub(crate) fn router(&self) -> &Router {
        &self.handle.router
    }

    /// Resolve the service endpoint now instead of on first use.
    ///
    /// Issues one throwaway `GET devices.json` when no redirect has been
    /// cached yet and returns the base URL requests will use. Call this
    /// before spawning several streams on one client.
    pub async fn discover_endpoint(&self) -> Result<Url, ApiError> {
        if let Some(url) = self.session().discovered_url() {
            return Ok(url);
        }
        let route = Route::get(Devices::PATH, Delivery::Snapshot);
        let resp = self.router().send(&route).await?;
        debug!(status = %resp.status(), "endpoint probe answered");
        Ok(self.session().base_url())
    }

    /// Mutation capability for the thermostat with `device_id`.
    pub fn thermostat(&self, device_id: impl Into<String>) -> ThermostatControl {
        self.handle.thermostat(device_id)
    }

    /// Mutation capability for the structure with `structure_id`.
    pub fn structure(&self, structure_id: impl Into<String>) -> StructureControl {
        self.handle.structure(structure_id)
    }
}

/// Opaque reference from a record back to the session that produced it.
///
/// Only lets the holder issue further mutations through that session.
/// The session never refers back to records, so no ownership cycle exists.
#[derive(Clone)]
pub struct SessionHandle {
    router: Arc<Router>,
}

impl SessionHandle {
    /// Identifier of the underlying session.
    pub fn id(&self) -> u64 {
        self.router.session().id()
    }

    pub fn session(&self) -> &Session {
        self.router.session()
    }

    pub(crate) fn router(&self) -> &Router {
        &self.router
    }

    pub fn thermostat(&self, device_id: impl Into<String>) -> ThermostatControl {
        ThermostatControl::new(self.clone(), device_id.into())
    }

    pub fn structure(&self, structure_id: impl Into<String>) -> StructureControl {
        StructureControl::new(self.clone(), structure_id.into())
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.router, &other.router)
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id()).finish()
    }
}
