// Integration tests for `RestClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pillwatch_api::{Error, RestClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let client = RestClient::from_reqwest(
        &server.uri(),
        SecretString::from("test-token".to_owned()),
        reqwest::Client::new(),
    )
    .expect("mock server URI should parse");
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_states() {
    let (server, client) = setup().await;

    let body = json!([
        {
            "entity_id": "sensor.pa_aspirin",
            "state": "scheduled",
            "attributes": {
                "friendly_name": "Aspirin",
                "Doses today": ["2024-01-01T08:00:00"]
            },
            "last_changed": "2024-01-01T08:00:00+00:00",
            "last_updated": "2024-01-01T08:00:00+00:00"
        },
        {
            "entity_id": "sun.sun",
            "state": "above_horizon",
            "attributes": {}
        }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let states = client.get_states().await.expect("states fetch should succeed");

    assert_eq!(states.len(), 2);
    assert_eq!(states[0].entity_id, "sensor.pa_aspirin");
    assert_eq!(states[0].state, "scheduled");
    assert_eq!(states[0].attributes["friendly_name"], "Aspirin");
    assert_eq!(states[1].entity_id, "sun.sun");
}

#[tokio::test]
async fn test_call_service_posts_exact_payload() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/services/pill_assistant/take_medication"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({ "medication_id": "M1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client
        .call_service(
            "pill_assistant",
            "take_medication",
            &json!({ "medication_id": "M1" }),
        )
        .await
        .expect("service call should succeed");
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get_states().await.expect_err("401 should be an error");
    assert!(matches!(err, Error::Authentication { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/services/pill_assistant/snooze_medication"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client
        .call_service(
            "pill_assistant",
            "snooze_medication",
            &json!({ "medication_id": "M1" }),
        )
        .await
        .expect_err("500 should be an error");

    assert!(matches!(err, Error::Api { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_malformed_body_maps_to_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.get_states().await.expect_err("bad body should be an error");
    assert!(matches!(err, Error::Deserialization { .. }), "got {err:?}");
}
