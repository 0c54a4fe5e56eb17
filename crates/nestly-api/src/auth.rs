// OAuth2 authorization-code exchange.
//
// A one-shot POST to the token endpoint with the code, client id and secret
// as query parameters. The resulting bearer token authorizes every later call.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ErrorKind};

/// Default Nest OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://api.home.nest.com/oauth2/access_token";

/// How a client authenticates.
///
/// Each variant carries the secret material needed for its flow.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A previously issued bearer token.
    AccessToken(SecretString),

    /// An authorization code, exchanged once for a bearer token when the
    /// client connects.
    AuthorizationCode(AuthorizationGrant),
}

/// Everything the token endpoint needs for the authorization-code grant.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub client_id: String,
    pub client_secret: SecretString,
    pub code: SecretString,
    pub token_url: Url,
}

/// Bearer token issued by the token endpoint.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    /// Lifetime in seconds, if the endpoint reported one.
    pub expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchange an authorization code for a bearer token.
///
/// `POST {token_url}?code=..&client_id=..&client_secret=..&grant_type=authorization_code`
///
/// A non-200 answer is decoded from `{error, error_description}` into an
/// `oauth2_error`; a body that cannot be read or decoded is a `body_error`.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    grant: &AuthorizationGrant,
) -> Result<AccessToken, ApiError> {
    debug!(url = %grant.token_url, client_id = %grant.client_id, "exchanging authorization code");

    let resp = http
        .post(grant.token_url.clone())
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .query(&[
            ("code", grant.code.expose_secret()),
            ("client_id", grant.client_id.as_str()),
            ("client_secret", grant.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await.map_err(|e| {
        ApiError::new(ErrorKind::Body, e.to_string())
            .with_status(status)
            .with_source(e)
    })?;

    if status != reqwest::StatusCode::OK {
        return Err(ApiError::from_response_body(ErrorKind::OAuth2, status, &body));
    }

    let token: TokenResponse = serde_json::from_str(&body).map_err(ApiError::body)?;

    debug!(expires_in = ?token.expires_in, "authorization code exchanged");
    Ok(AccessToken {
        token: SecretString::from(token.access_token),
        expires_in: token.expires_in,
    })
}
