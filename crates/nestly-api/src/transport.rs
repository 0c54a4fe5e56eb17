// Transport configuration for building the reqwest::Client behind a session.
//
// Automatic redirect following is always disabled: the router handles the
// API's 307 service-discovery redirect itself so the Authorization header
// survives the hop.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::redirect::Policy;

use crate::error::ApiError;

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the bundled web PKI roots.
    #[default]
    System,
    /// Additionally trust a CA certificate from the given PEM file.
    CustomCa(PathBuf),
}

/// Transport configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request timeout for snapshot and mutation calls.
    /// Streaming requests are exempt because their body never ends.
    pub timeout: Duration,
    /// TCP/TLS connect timeout, applied to every request.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .redirect(Policy::none())
            .user_agent(concat!("nestly/", env!("CARGO_PKG_VERSION")));

        if let TlsMode::CustomCa(path) = &self.tls {
            let cert_pem = std::fs::read(path).map_err(|e| {
                ApiError::http(format!("failed to read CA cert {}: {e}", path.display()))
                    .with_source(e)
            })?;
            let cert = reqwest::Certificate::from_pem(&cert_pem)
                .map_err(|e| ApiError::http(format!("invalid CA cert: {e}")).with_source(e))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| ApiError::http(format!("failed to build HTTP client: {e}")).with_source(e))
    }
}
