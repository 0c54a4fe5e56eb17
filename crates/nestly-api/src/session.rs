// Session state: credentials plus the lazily discovered service endpoint.
//
// The API answers the first request against its public hostname with a 307
// pointing at the host that actually serves the account. That target is
// cached here and reused for the lifetime of the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::auth::AuthorizationGrant;
use crate::error::ApiError;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Credentials and endpoint state shared by every call made through one client.
///
/// Everything except the discovered endpoint is immutable after construction.
/// The discovered endpoint is an atomic reference so concurrent streams can
/// resolve it without a data race; once set it is never cleared.
#[derive(Debug)]
pub struct Session {
    id: u64,
    token: SecretString,
    expires_in: Option<u64>,
    grant: Option<AuthorizationGrant>,
    api_url: Url,
    discovered_url: ArcSwapOption<Url>,
}

impl Session {
    /// Create a session for `api_url` authorized by `token`.
    ///
    /// The URL is normalized to end in `/` so relative API paths join
    /// underneath it instead of replacing its last segment.
    pub fn new(api_url: &Url, token: SecretString) -> Result<Self, ApiError> {
        Ok(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            token,
            expires_in: None,
            grant: None,
            api_url: normalize_base(api_url)?,
            discovered_url: ArcSwapOption::empty(),
        })
    }

    /// Record the authorization grant and token lifetime this session came from.
    pub(crate) fn with_grant(mut self, grant: AuthorizationGrant, expires_in: Option<u64>) -> Self {
        self.grant = Some(grant);
        self.expires_in = expires_in;
        self
    }

    /// Process-unique identifier, used to tell sessions apart.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Token lifetime in seconds as reported by the OAuth exchange.
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    pub fn client_id(&self) -> Option<&str> {
        self.grant.as_ref().map(|g| g.client_id.as_str())
    }

    pub fn grant(&self) -> Option<&AuthorizationGrant> {
        self.grant.as_ref()
    }

    /// The statically configured API URL.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// The redirect target observed so far, if any.
    pub fn discovered_url(&self) -> Option<Url> {
        self.discovered_url.load_full().map(|u| Url::clone(&u))
    }

    /// The base every request is issued against: the discovered endpoint
    /// when known, else the configured API URL.
    pub fn base_url(&self) -> Url {
        self.discovered_url().unwrap_or_else(|| self.api_url.clone())
    }

    pub(crate) fn set_discovered_url(&self, url: Url) {
        debug!(session = self.id, %url, "caching discovered endpoint");
        self.discovered_url.store(Some(Arc::new(url)));
    }
}

/// Ensure a base URL ends in `/`.
pub(crate) fn normalize_base(raw: &Url) -> Result<Url, ApiError> {
    if raw.cannot_be_a_base() {
        return Err(ApiError::http(format!("not a base URL: {raw}")));
    }
    let mut url = raw.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
