// Shared fixtures for nukly-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use nukly_api::{BridgeClient, BridgeRecord, DeviceId, DeviceType, TransportConfig};
use nukly_core::device::DeviceContext;
use nukly_core::{
    AccessoryHost, AccessoryRecord, CoreError, DeviceInfo, DeviceProjection, Scheduler,
};
use wiremock::MockServer;

/// Host that records every call.
#[derive(Default)]
pub struct RecordingHost {
    pub cached: Vec<AccessoryRecord>,
    pub registered: Mutex<Vec<AccessoryRecord>>,
    pub unregistered: Mutex<Vec<AccessoryRecord>>,
    pub published: Mutex<Vec<(DeviceId, DeviceProjection)>>,
}

impl RecordingHost {
    pub fn with_cache(cached: Vec<AccessoryRecord>) -> Self {
        Self {
            cached,
            ..Self::default()
        }
    }

    pub fn last_published(&self, id: &DeviceId) -> Option<DeviceProjection> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(d, _)| d == id)
            .map(|(_, p)| p.clone())
    }

    pub fn publish_count(&self, id: &DeviceId) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == id)
            .count()
    }

    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registered
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn unregistered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .unregistered
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        ids.sort();
        ids
    }
}

impl AccessoryHost for RecordingHost {
    fn cached_accessories(&self) -> Vec<AccessoryRecord> {
        self.cached.clone()
    }

    fn register(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError> {
        self.registered.lock().unwrap().extend_from_slice(accessories);
        Ok(())
    }

    fn unregister(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError> {
        self.unregistered.lock().unwrap().extend_from_slice(accessories);
        Ok(())
    }

    fn publish(&self, device: &DeviceId, projection: &DeviceProjection) {
        self.published
            .lock()
            .unwrap()
            .push((device.clone(), projection.clone()));
    }
}

pub fn bridge_record(server: &MockServer, id: u64) -> BridgeRecord {
    let addr = server.address();
    BridgeRecord {
        id,
        ip: addr.ip().to_string(),
        port: addr.port(),
        token: "abc123".to_string().into(),
        hash_token: false,
    }
}

pub fn bridge_for(server: &MockServer) -> Arc<BridgeClient> {
    Arc::new(BridgeClient::new(&bridge_record(server, 1), &TransportConfig::default()).unwrap())
}

/// A bridge nobody listens on; for tests that never reach the network.
pub fn offline_bridge() -> Arc<BridgeClient> {
    let record = BridgeRecord {
        id: 1,
        ip: "127.0.0.1".into(),
        port: 9,
        token: "unused".to_string().into(),
        hash_token: false,
    };
    Arc::new(BridgeClient::new(&record, &TransportConfig::default()).unwrap())
}

pub fn context(host: &Arc<RecordingHost>) -> DeviceContext {
    DeviceContext {
        scheduler: Scheduler::new(),
        host: Arc::clone(host) as Arc<dyn AccessoryHost>,
    }
}

pub fn info(id: &str, device_type: DeviceType) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId::from(id),
        name: format!("device {id}"),
        device_type,
        bridge_id: 1,
    }
}
