// Redirect-aware request router.
//
// Every request (snapshot, stream, mutation) goes through `Router::send`.
// The API answers requests against its public hostname with a 307 whose
// Location names the host that serves the account. The router caches that
// host in the session and re-issues the request once, carrying the
// Authorization header itself because the reqwest client never follows
// redirects.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue, LOCATION};
use reqwest::{Method, Response, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::ApiError;
use crate::session::Session;
use crate::transport::TransportConfig;

/// MIME type requested for the push stream.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Whether a request expects a bounded response or the endless event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Ordinary request with a bounded body, subject to the request timeout.
    Snapshot,
    /// Long-lived `text/event-stream` response; no whole-request timeout.
    Stream,
}

/// One request as the caller described it, replayable after a redirect.
///
/// The path is kept as separate segments and appended to the base URL one
/// by one, so `/`, `?` and `#` inside a segment are percent-encoded rather
/// than read as URL structure.
#[derive(Debug, Clone)]
pub(crate) struct Route<'a> {
    pub method: Method,
    pub segments: Vec<&'a str>,
    pub body: Option<&'a Value>,
    pub delivery: Delivery,
}

impl<'a> Route<'a> {
    pub fn get(path: &'a str, delivery: Delivery) -> Self {
        Self {
            method: Method::GET,
            segments: vec![path],
            body: None,
            delivery,
        }
    }

    pub fn put(segments: Vec<&'a str>, body: &'a Value) -> Self {
        Self {
            method: Method::PUT,
            segments,
            body: Some(body),
            delivery: Delivery::Snapshot,
        }
    }
}

pub(crate) struct Router {
    session: Session,
    http: reqwest::Client,
    transport: TransportConfig,
}

impl Router {
    pub fn new(session: Session, http: reqwest::Client, transport: TransportConfig) -> Self {
        Self {
            session,
            http,
            transport,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Issue a request, following at most one 307 redirect.
    ///
    /// The redirect target's scheme and host are stored as the session's
    /// discovered endpoint before the retry, so later calls skip the hop.
    /// A retry that is itself redirected is reported as an `http_error`.
    pub async fn send(&self, route: &Route<'_>) -> Result<Response, ApiError> {
        let resp = self.dispatch(route).await?;
        if resp.status() != StatusCode::TEMPORARY_REDIRECT {
            return Ok(resp);
        }

        let target = redirect_origin(&resp)?;
        info!(
            session = self.session.id(),
            from = %resp.url(),
            to = %target,
            "service endpoint redirected"
        );
        self.session.set_discovered_url(target);

        let retried = self.dispatch(route).await?;
        if retried.status() == StatusCode::TEMPORARY_REDIRECT {
            let location = retried
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<none>")
                .to_owned();
            return Err(ApiError::http(format!(
                "redirected more than once: {} {} -> {location}",
                route.method,
                retried.url()
            ))
            .with_status(retried.status()));
        }

        Ok(retried)
    }

    /// Send a single request against the session's current base URL.
    async fn dispatch(&self, route: &Route<'_>) -> Result<Response, ApiError> {
        let url = resolve(&self.session.base_url(), &route.segments)?;
        debug!("{} {url}", route.method);

        let mut auth = HeaderValue::from_str(&format!(
            "Bearer {}",
            self.session.token().expose_secret()
        ))
        .map_err(|e| ApiError::http(format!("invalid access token header value: {e}")))?;
        auth.set_sensitive(true);

        let mut builder = self
            .http
            .request(route.method.clone(), url)
            .header(AUTHORIZATION, auth);

        match route.delivery {
            Delivery::Snapshot => builder = builder.timeout(self.transport.timeout),
            Delivery::Stream => builder = builder.header(ACCEPT, EVENT_STREAM),
        }

        if let Some(body) = route.body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }

        Ok(builder.send().await?)
    }
}

/// Append `segments` to the path of `base`, one encoded segment each.
fn resolve(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ApiError::http(format!("not a base URL: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Scheme, host and port of a redirect's `Location`, as a base URL.
///
/// A relative Location resolves against the URL that was redirected.
fn redirect_origin(resp: &Response) -> Result<Url, ApiError> {
    let location = resp
        .headers()
        .get(LOCATION)
        .ok_or_else(|| {
            ApiError::http("307 redirect without a Location header").with_status(resp.status())
        })?
        .to_str()
        .map_err(|e| ApiError::http(format!("unreadable Location header: {e}")))?;

    let target = resp.url().join(location)?;
    let origin = target.origin();
    if !origin.is_tuple() {
        return Err(ApiError::http(format!("redirect to opaque origin: {target}")));
    }

    Ok(Url::parse(&format!("{}/", origin.ascii_serialization()))?)
}
