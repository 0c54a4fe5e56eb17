#![allow(clippy::unwrap_used)]
// Integration tests for snapshot fetches using wiremock.

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nestly_api::{Client, ErrorKind, HvacMode, TransportConfig};

const THERMOSTAT_ID: &str = "peyiJNo0IldT2YlIVtYaGQ";
const ALARM_ID: &str = "RTMTKxsQTCxzVcsySOHPxKoF4OyCifrs";
const STRUCTURE_ID: &str = "VqFabWH21nwVyd4RWgJgNb292wa7hG_dUwo2i2SG7j3-BOLY0BA4sw";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Client) {
    let server = MockServer::start().await;
    let api_url = Url::parse(&server.uri()).unwrap();
    let client =
        Client::with_token(&api_url, "c.token".to_owned().into(), &TransportConfig::default())
            .unwrap();
    (server, client)
}

/// URI of a loopback port with nothing listening on it.
fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_devices_decoded_and_bound_to_session() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices.json"))
        .and(header("authorization", "Bearer c.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "thermostats": {
                THERMOSTAT_ID: {
                    "device_id": THERMOSTAT_ID,
                    "structure_id": STRUCTURE_ID,
                    "name": "Hallway (Upstairs)",
                    "is_online": true,
                    "can_cool": true,
                    "can_heat": true,
                    "hvac_mode": "heat-cool",
                    "target_temperature_f": 72,
                    "target_temperature_c": 21.5,
                    "ambient_temperature_f": 70,
                    "humidity": 40,
                    "last_connection": "2016-10-31T23:59:59.000Z"
                }
            },
            "smoke_co_alarms": {
                ALARM_ID: {
                    "device_id": ALARM_ID,
                    "structure_id": STRUCTURE_ID,
                    "name": "Kitchen",
                    "battery_health": "ok",
                    "co_alarm_state": "ok",
                    "smoke_alarm_state": "ok"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.devices().await.unwrap();

    let thermostat = &devices.thermostats[THERMOSTAT_ID];
    assert_eq!(thermostat.name.as_deref(), Some("Hallway (Upstairs)"));
    assert_eq!(thermostat.target_temperature_f, Some(72));
    assert_eq!(thermostat.target_temperature_c, Some(21.5));
    assert_eq!(thermostat.current_hvac_mode().unwrap(), HvacMode::HeatCool);
    assert_eq!(thermostat.session(), Some(client.handle()));

    let alarm = &devices.smoke_co_alarms[ALARM_ID];
    assert_eq!(alarm.battery_health.as_deref(), Some("ok"));
    assert_eq!(alarm.session(), Some(client.handle()));

    let control = thermostat.control().unwrap();
    assert_eq!(control.device_id(), THERMOSTAT_ID);
}

#[tokio::test]
async fn test_devices_unauthorized_is_devices_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices.json"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "error_description": "authorization code not found"
        })))
        .mount(&server)
        .await;

    let err = client.devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Devices);
    assert_eq!(err.description(), "authorization code not found");
    assert_eq!(err.status_text().as_deref(), Some("401 Unauthorized"));
}

#[tokio::test]
async fn test_devices_undecodable_body_is_body_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client.devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Body);
    assert!(err.status().is_none());
}

#[tokio::test]
async fn test_devices_connection_refused_is_http_error() {
    let api_url = Url::parse(&closed_port_uri()).unwrap();
    let client =
        Client::with_token(&api_url, "c.token".to_owned().into(), &TransportConfig::default())
            .unwrap();

    let err = client.devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Http);
    assert!(err.status().is_none());
}

// ── Structures ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_structures_decoded_and_bound_to_session() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/structures.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            STRUCTURE_ID: {
                "structure_id": STRUCTURE_ID,
                "thermostats": [THERMOSTAT_ID],
                "away": "auto-away",
                "name": "Home",
                "time_zone": "America/Los_Angeles"
            }
        })))
        .mount(&server)
        .await;

    let structures = client.structures().await.unwrap();
    let home = &structures[STRUCTURE_ID];

    assert_eq!(home.away.as_deref(), Some("auto-away"));
    assert_eq!(home.thermostats.as_deref(), Some(&[THERMOSTAT_ID.to_owned()][..]));
    assert_eq!(home.session(), Some(client.handle()));
    assert_eq!(home.control().unwrap().structure_id(), STRUCTURE_ID);
}
