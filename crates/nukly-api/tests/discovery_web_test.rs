#![allow(clippy::unwrap_used)]
// Integration tests for discovery, pairing, and the cloud client.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nukly_api::{
    AUTH_TIMEOUT, DeviceId, DiscoveredBridge, DiscoveryClient, Error, SigningMode,
    TransportConfig, WebClient,
};
use secrecy::ExposeSecret;

fn candidate(server: &MockServer) -> DiscoveredBridge {
    let addr = server.address();
    DiscoveredBridge {
        bridge_id: 2_117_604_523,
        ip: addr.ip().to_string(),
        port: addr.port(),
        date_updated: None,
    }
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_lists_candidates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/discover/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bridges": [{
                "bridgeId": 2_117_604_523_u64,
                "ip": "192.168.1.50",
                "port": 8080,
                "dateUpdated": "2024-05-01T10:00:00Z"
            }],
            "errorCode": 0
        })))
        .mount(&server)
        .await;

    let client = DiscoveryClient::new(
        &format!("{}/discover/bridges", server.uri()),
        &TransportConfig::default(),
    )
    .unwrap();
    let found = client.discover().await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].bridge_id, 2_117_604_523);
    assert_eq!(found[0].ip, "192.168.1.50");
    assert_eq!(found[0].port, 8080);
}

#[tokio::test]
async fn test_discover_with_no_bridges() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/discover/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errorCode": 0 })))
        .mount(&server)
        .await;

    let client = DiscoveryClient::new(
        &format!("{}/discover/bridges", server.uri()),
        &TransportConfig::default(),
    )
    .unwrap();
    assert!(client.discover().await.unwrap().is_empty());
}

// ── Pairing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_success_issues_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "a1b2c3",
            "success": true
        })))
        .mount(&server)
        .await;

    let client = DiscoveryClient::new(&server.uri(), &TransportConfig::default()).unwrap();
    let record = client
        .auth(&candidate(&server), SigningMode::RotatingHash)
        .await
        .unwrap();

    assert_eq!(record.id, 2_117_604_523);
    assert_eq!(record.port, server.address().port());
    assert_eq!(record.token.expose_secret(), "a1b2c3");
    assert!(record.hash_token);
}

#[tokio::test]
async fn test_auth_refused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let client = DiscoveryClient::new(&server.uri(), &TransportConfig::default()).unwrap();
    let result = client.auth(&candidate(&server), SigningMode::Static).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_auth_waits_past_request_timeout_for_button_press() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "token": "late", "success": true })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/discover/bridges"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "bridges": [] })),
        )
        .mount(&server)
        .await;

    let transport = TransportConfig::with_timeout(Duration::from_secs(1));
    let client =
        DiscoveryClient::new(&format!("{}/discover/bridges", server.uri()), &transport).unwrap();

    // Ordinary calls still honour the request timeout.
    let discovered = client.discover().await;
    assert!(matches!(discovered, Err(Error::Timeout { timeout_secs: 1 })));

    let record = client
        .auth(&candidate(&server), SigningMode::Static)
        .await
        .unwrap();
    assert_eq!(record.token.expose_secret(), "late");
    assert!(AUTH_TIMEOUT >= Duration::from_secs(30));
}

// ── Cloud ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_opener_config_read_modify_write() {
    let server = MockServer::start().await;
    let token: secrecy::SecretString = "web-token".to_string().into();
    // 12345 = 0x3039, opener type 2 -> 0x23039
    let web_path = format!("/smartlock/{}", 0x2_3039);

    Mock::given(method("GET"))
        .and(path(web_path.as_str()))
        .and(header("authorization", "Bearer web-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "smartlockId": 0x2_3039,
            "name": "Gate",
            "openerAdvancedConfig": {
                "doorbellSuppression": 1,
                "soundLevel": 100,
                "intercomId": 42
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{web_path}/advanced/openerconfig")))
        .and(body_json(json!({
            "doorbellSuppression": 5,
            "soundLevel": 100,
            "intercomId": 42
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = WebClient::new(&server.uri(), &token, &TransportConfig::default()).unwrap();
    let id = DeviceId::from("12345");
    let mut cfg = client.opener_advanced_config(&id).await.unwrap();
    assert!(!cfg.ring_muted());
    cfg.set_ring_muted(true);
    client.update_opener_advanced_config(&id, &cfg).await.unwrap();
}

#[tokio::test]
async fn test_cloud_rejects_token() {
    let server = MockServer::start().await;
    let token: secrecy::SecretString = "expired".to_string().into();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = WebClient::new(&server.uri(), &token, &TransportConfig::default()).unwrap();
    let err = client
        .opener_advanced_config(&DeviceId::from("12345"))
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
}
