#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mysa_api::{Error, RestClient};

// ── Helpers ─────────────────────────────────────────────────────────

const ID_TOKEN: &str = "eyJ.test.token";

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn token() -> SecretString {
    SecretString::from(ID_TOKEN.to_owned())
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_devices_sends_raw_id_token() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(header("Authorization", ID_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DevicesObj": {
                "dev1": { "Id": "dev1", "Model": "BB-V2-0", "Name": "Hall" },
                "dev2": { "Id": "dev2", "Model": "BB-V1-1" }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.get_devices(&token()).await.unwrap();
    assert_eq!(devices.devices.len(), 2);
    assert_eq!(devices.devices["dev1"].name.as_deref(), Some("Hall"));
    assert_eq!(devices.devices["dev2"].model, "BB-V1-1");
}

#[tokio::test]
async fn test_get_device_firmwares() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/firmware"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Firmware": {
                "dev1": { "Device": "dev1", "InstalledVersion": "3.16.2.3" }
            }
        })))
        .mount(&server)
        .await;

    let firmwares = client.get_device_firmwares(&token()).await.unwrap();
    assert_eq!(firmwares.firmware["dev1"].installed_version, "3.16.2.3");
}

#[tokio::test]
async fn test_get_device_states() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DeviceStatesObj": {
                "dev1": {
                    "Device": "dev1",
                    "Timestamp": 1_700_000_000,
                    "CorrectedTemp": { "t": 1_700_000_000, "v": 20.25 },
                    "Humidity": { "t": 1_700_000_000, "v": 41 }
                }
            }
        })))
        .mount(&server)
        .await;

    let states = client.get_device_states(&token()).await.unwrap();
    let state = &states.states["dev1"];
    assert_eq!(state.timestamp, 1_700_000_000);
    assert!((state.corrected_temp.unwrap().v - 20.25).abs() < f64::EPSILON);
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_success_status_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client.get_devices(&token()).await;
    match result {
        Err(Error::Api {
            status,
            status_text,
            url,
        }) => {
            assert_eq!(status, 503);
            assert_eq!(status_text, "Service Unavailable");
            assert!(url.ends_with("/devices"));
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_keeps_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/state"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get_device_states(&token()).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }), "got: {err:?}");
    assert!(err.to_string().contains("status of 401 (Unauthorized)"));
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/firmware"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.get_device_firmwares(&token()).await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body.contains("oops")),
        "expected Deserialization error, got: {result:?}"
    );
}
