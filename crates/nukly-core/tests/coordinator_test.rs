#![allow(clippy::unwrap_used)]
// Coordinator lifecycle against mocked bridges and discovery.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nukly_api::{DeviceId, DeviceType};
use nukly_core::{
    AccessoryHost, AccessoryRecord, CoreError, HostAction, Identifiable, LockPair, LockState,
    PlatformConfig, SyncCoordinator,
};

use common::{RecordingHost, bridge_record};

// ── Helpers ─────────────────────────────────────────────────────────

fn static_config(dir: &TempDir, bridge: &MockServer) -> PlatformConfig {
    PlatformConfig {
        storage_path: dir.path().to_path_buf(),
        hash_token: false,
        resync_interval: None,
        bridges: vec![bridge_record(bridge, 1)],
        ..PlatformConfig::default()
    }
}

fn coordinator(config: PlatformConfig, host: &Arc<RecordingHost>) -> SyncCoordinator {
    SyncCoordinator::new(config, Arc::clone(host) as Arc<dyn AccessoryHost>).unwrap()
}

async fn mount_list(server: &MockServer, devices: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(devices))
        .mount(server)
        .await;
}

fn lock_entry(id: u64, name: &str, state: u8) -> serde_json::Value {
    json!({
        "nukiId": id,
        "deviceType": 0,
        "name": name,
        "lastKnownState": { "mode": 2, "state": state, "batteryCritical": false }
    })
}

// ── Resync ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resync_registers_listed_devices() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(
        &server,
        json!([
            lock_entry(11, "Front door", 1),
            { "nukiId": 22, "deviceType": 2, "name": "Gate",
              "lastKnownState": { "mode": 2, "state": 1 } }
        ]),
    )
    .await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();

    let report = coord.resync().await;
    assert_eq!(report.devices, 2);
    assert_eq!(report.registered, 2);
    assert_eq!(report.unregistered, 0);
    assert_eq!(host.registered_ids(), vec!["11", "22"]);

    let lock = coord.device(&DeviceId::from("11")).unwrap();
    assert_eq!(lock.info().name, "Front door");
    assert!(coord.device(&DeviceId::from("22")).is_some());

    // unchanged listing registers nothing new
    let again = coord.resync().await;
    assert_eq!(again.registered, 0);
    assert_eq!(again.unregistered, 0);
}

#[tokio::test]
async fn listed_state_is_applied_to_devices() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 1)])).await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();
    coord.resync().await;

    match host.last_published(&DeviceId::from("11")).unwrap() {
        nukly_core::DeviceProjection::SmartLock { state, .. } => {
            assert_eq!(state.lock, LockPair::SECURED);
        }
        other @ nukly_core::DeviceProjection::Opener { .. } => {
            panic!("unexpected projection {other:?}")
        }
    }
}

#[tokio::test]
async fn absent_devices_are_unregistered() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(
        &server,
        json!([lock_entry(11, "Front door", 1), lock_entry(12, "Back door", 3)]),
    )
    .await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();
    coord.resync().await;

    server.reset().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 1)])).await;

    let report = coord.resync().await;
    assert_eq!(report.devices, 1);
    assert_eq!(report.unregistered, 1);
    assert_eq!(host.unregistered_ids(), vec!["12"]);
    assert!(coord.device(&DeviceId::from("12")).is_none());
    assert!(coord.device(&DeviceId::from("11")).is_some());
}

#[tokio::test]
async fn renamed_device_is_re_registered() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 1)])).await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();
    coord.resync().await;

    server.reset().await;
    mount_list(&server, json!([lock_entry(11, "Main entrance", 1)])).await;

    let report = coord.resync().await;
    assert_eq!(report.unregistered, 1);
    assert_eq!(report.registered, 1);
    assert_eq!(
        coord.device(&DeviceId::from("11")).unwrap().info().name,
        "Main entrance"
    );
}

#[tokio::test]
async fn failing_bridge_keeps_its_devices() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 1)])).await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();
    coord.resync().await;

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let report = coord.resync().await;
    assert_eq!(report.failed_bridges, vec![1]);
    assert_eq!(report.devices, 1);
    assert_eq!(report.unregistered, 0);
    assert!(host.unregistered_ids().is_empty());
    assert!(coord.device(&DeviceId::from("11")).is_some());
}

#[tokio::test]
async fn unknown_device_type_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(
        &server,
        json!([
            lock_entry(11, "Front door", 1),
            { "nukiId": 99, "deviceType": 9, "name": "Mystery" }
        ]),
    )
    .await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();

    let report = coord.resync().await;
    assert_eq!(report.devices, 1);
    assert_eq!(host.registered_ids(), vec!["11"]);
    assert!(coord.device(&DeviceId::from("99")).is_none());
}

#[tokio::test]
async fn static_bridges_replace_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();

    assert_eq!(coord.registry().len(), 1);
    let stored: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(coord.config().bridge_store_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(stored[0]["id"], 1);
    assert_eq!(stored[0]["token"], "abc123");
}

// ── Dynamic mode ────────────────────────────────────────────────────

#[tokio::test]
async fn dynamic_mode_drops_revoked_and_pairs_discovered() {
    let dir = tempfile::tempdir().unwrap();
    let stale = MockServer::start().await;
    let fresh = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&stale)
        .await;

    let addr = fresh.address();
    Mock::given(method("GET"))
        .and(path("/discover/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bridges": [{
                "bridgeId": 77,
                "ip": addr.ip().to_string(),
                "port": addr.port(),
                "dateUpdated": "2024-05-01T10:00:00Z"
            }],
            "errorCode": 0
        })))
        .mount(&fresh)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "newtok", "success": true })),
        )
        .expect(1)
        .mount(&fresh)
        .await;

    let store_path = dir.path().join(nukly_core::config::BRIDGE_STORE_FILE);
    let stale_record = bridge_record(&stale, 5);
    std::fs::write(&store_path, serde_json::to_string(&[stale_record]).unwrap()).unwrap();

    let config = PlatformConfig {
        storage_path: dir.path().to_path_buf(),
        resync_interval: None,
        discovery_url: format!("{}/discover/bridges", fresh.uri()),
        ..PlatformConfig::default()
    };
    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(config, &host);
    coord.load_bridges().await.unwrap();

    let ids: Vec<u64> = coord.registry().bridges().iter().map(|b| b.id()).collect();
    assert_eq!(ids, vec![77]);

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&store_path).unwrap()).unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 1);
    assert_eq!(stored[0]["id"], 77);
    assert_eq!(stored[0]["token"], "newtok");
    assert_eq!(stored[0]["hashToken"], true);
}

#[tokio::test]
async fn known_candidates_are_not_paired_again() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let addr = server.address();

    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": { "hardwareId": 1, "serverId": 5 },
            "serverConnected": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/discover/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bridges": [{ "bridgeId": 5, "ip": addr.ip().to_string(), "port": addr.port() }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .expect(0)
        .mount(&server)
        .await;

    let store_path = dir.path().join(nukly_core::config::BRIDGE_STORE_FILE);
    std::fs::write(
        &store_path,
        serde_json::to_string(&[bridge_record(&server, 5)]).unwrap(),
    )
    .unwrap();

    let config = PlatformConfig {
        storage_path: dir.path().to_path_buf(),
        resync_interval: None,
        discovery_url: format!("{}/discover/bridges", server.uri()),
        ..PlatformConfig::default()
    };
    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(config, &host);
    coord.load_bridges().await.unwrap();

    assert_eq!(coord.registry().len(), 1);
    assert!(coord.registry().get(5).is_some());
}

// ── Host-facing ─────────────────────────────────────────────────────

#[tokio::test]
async fn cached_accessories_are_restored_before_listing() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 1)])).await;
    Mock::given(method("GET"))
        .and(path("/callback/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "callbacks": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/callback/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let cached = AccessoryRecord {
        id: DeviceId::from("11"),
        name: "Front door".into(),
        device_type: DeviceType::SmartLock,
        bridge_id: 1,
    };
    let host = Arc::new(RecordingHost::with_cache(vec![cached]));

    let mut config = static_config(&dir, &server);
    config.callback_server.bind_host = "127.0.0.1".into();
    config.callback_server.port = 0;
    let coord = coordinator(config, &host);
    coord.start().await.unwrap();

    // already known to the host with an identical record
    assert!(host.registered_ids().is_empty());
    assert!(host.unregistered_ids().is_empty());
    assert!(coord.device(&DeviceId::from("11")).is_some());

    coord.shutdown().await;
}

#[tokio::test]
async fn dispatch_to_unknown_device_fails() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);

    let err = coord
        .dispatch(
            &DeviceId::from("404"),
            HostAction::LockTarget(LockState::Secured),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn dispatch_reaches_the_device() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_list(&server, json!([lock_entry(11, "Front door", 3)])).await;
    Mock::given(method("GET"))
        .and(path("/lockAction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let host = Arc::new(RecordingHost::default());
    let coord = coordinator(static_config(&dir, &server), &host);
    coord.load_bridges().await.unwrap();
    coord.resync().await;

    coord
        .dispatch(
            &DeviceId::from("11"),
            HostAction::LockTarget(LockState::Secured),
        )
        .await
        .unwrap();
}
