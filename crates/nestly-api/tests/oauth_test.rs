#![allow(clippy::unwrap_used)]
// Integration tests for the authorization-code exchange using wiremock.

use secrecy::ExposeSecret;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nestly_api::{AuthorizationGrant, Client, ClientConfig, Credentials, ErrorKind, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn config_for(server: &MockServer, code: &str) -> ClientConfig {
    let api_url = Url::parse(&server.uri()).unwrap();
    let token_url = api_url.join("/oauth2/access_token").unwrap();
    ClientConfig {
        api_url,
        credentials: Credentials::AuthorizationCode(AuthorizationGrant {
            client_id: "my-client-id".into(),
            client_secret: "my-client-secret".to_owned().into(),
            code: code.to_owned().into(),
            token_url,
        }),
        transport: TransportConfig::default(),
    }
}

// ── Exchange ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorization_code_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .and(query_param("code", "PIN1234"))
        .and(query_param("client_id", "my-client-id"))
        .and(query_param("client_secret", "my-client-secret"))
        .and(query_param("grant_type", "authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "c.issued-token",
            "expires_in": 315_360_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The issued token authorizes later calls.
    Mock::given(method("GET"))
        .and(path("/structures.json"))
        .and(header("authorization", "Bearer c.issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::connect(config_for(&server, "PIN1234")).await.unwrap();
    let session = client.session();

    assert_eq!(session.token().expose_secret(), "c.issued-token");
    assert_eq!(session.expires_in(), Some(315_360_000));
    assert_eq!(session.client_id(), Some("my-client-id"));

    assert!(client.structures().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_code_is_oauth2_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "oauth2_error",
            "error_description": "authorization code not found"
        })))
        .mount(&server)
        .await;

    let err = Client::connect(config_for(&server, "expired")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OAuth2);
    assert_eq!(err.description(), "authorization code not found");
    assert_eq!(err.status_text().as_deref(), Some("400 Bad Request"));
}

#[tokio::test]
async fn test_undecodable_token_response_is_body_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = Client::connect(config_for(&server, "PIN1234")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Body);
}

#[tokio::test]
async fn test_access_token_skips_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = ClientConfig::with_token("c.preissued".to_owned()).unwrap();
    config.api_url = Url::parse(&server.uri()).unwrap();

    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.session().token().expose_secret(), "c.preissued");
    assert!(client.session().grant().is_none());
}
