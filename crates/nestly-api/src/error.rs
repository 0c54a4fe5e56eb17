use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of an [`ApiError`].
///
/// Each variant maps to a stable wire tag for that failure class, see
/// [`ErrorKind::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure: connect refused, DNS, TLS, bad URL, redirect loop.
    Http,
    /// A response body could not be decoded (OAuth exchange, snapshot payload).
    Body,
    /// A response body could not be read off the socket.
    BodyRead,
    /// Non-200 response to a snapshot fetch or stream connect.
    Devices,
    /// The OAuth2 token endpoint rejected the authorization code.
    OAuth2,
    /// Non-200 response to a mutation, or a rejected setter argument.
    Api,
    /// ETA window rejected locally.
    Eta,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http_error",
            Self::Body => "body_error",
            Self::BodyRead => "body_read_error",
            Self::Devices => "devices_error",
            Self::OAuth2 => "oauth2_error",
            Self::Api => "api_error",
            Self::Eta => "eta_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error value for every operation in this crate.
///
/// Exactly one [`ErrorKind`] is set per value. Errors raised from an HTTP
/// response also carry the status; transport and decode errors keep the
/// underlying error as their [`source`](std::error::Error::source).
#[derive(Debug, Error)]
#[error("{kind}: {description}")]
pub struct ApiError {
    kind: ErrorKind,
    description: String,
    status: Option<StatusCode>,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            status: None,
            source: None,
        }
    }

    /// Rejected setter argument. Never reaches the network.
    pub fn api(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, description)
    }

    pub(crate) fn eta(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eta, description)
    }

    pub(crate) fn http(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Http, description)
    }

    pub(crate) fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Wrap a failure to read a response body.
    pub(crate) fn body_read(err: reqwest::Error) -> Self {
        Self::new(ErrorKind::BodyRead, err.to_string()).with_source(err)
    }

    /// Wrap a JSON decode failure of a successful response body.
    pub(crate) fn body(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Body, err.to_string()).with_source(err)
    }

    /// Build an error from a non-success response body.
    ///
    /// The API answers failures with `{"error": "...", "error_description": "..."}`.
    /// The kind is fixed by the caller; the description prefers the human text,
    /// then the tag, then the raw body, then the status reason.
    pub(crate) fn from_response_body(kind: ErrorKind, status: StatusCode, raw: &str) -> Self {
        let description = match serde_json::from_str::<ErrorBody>(raw) {
            Ok(body) => body
                .error_description
                .filter(|d| !d.is_empty())
                .or(body.error.filter(|e| !e.is_empty())),
            Err(_) => None,
        }
        .or_else(|| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(200).collect())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_owned());

        Self::new(kind, description).with_status(status)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Status rendered as `"400 Bad Request"`.
    pub fn status_text(&self) -> Option<String> {
        self.status.map(|s| s.to_string())
    }

    /// Returns `true` if the error was raised by local validation,
    /// meaning no request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ErrorKind::Api | ErrorKind::Eta)
            && self.status.is_none()
            && self.source.is_none()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let mut out = Self::http(err.to_string());
        if let Some(status) = err.status() {
            out.status = Some(status);
        }
        out.with_source(err)
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        Self::http(format!("invalid URL: {err}")).with_source(err)
    }
}

/// Error body shape shared by the API and the OAuth endpoint.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}
