// ── Device store ──
//
// Concurrent device set keyed by device id. Readers take cheap snapshots;
// every mutation rebuilds the snapshot and pushes it to `watch`
// subscribers.

use std::sync::Arc;

use dashmap::DashMap;
use nukly_api::DeviceId;
use tokio::sync::watch;

use crate::device::{Device, Identifiable};

pub struct DeviceStore {
    by_id: DashMap<DeviceId, Device>,
    snapshot: watch::Sender<Arc<Vec<Device>>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a device. Returns `true` if the id was new.
    pub fn upsert(&self, device: Device) -> bool {
        let previous = self.by_id.insert(device.id().clone(), device);
        if let Some(old) = &previous {
            old.retire();
        }
        self.rebuild_snapshot();
        previous.is_none()
    }

    /// Remove a device and abort its timers.
    pub fn remove(&self, id: &DeviceId) -> Option<Device> {
        let removed = self.by_id.remove(id).map(|(_, d)| d);
        if let Some(device) = &removed {
            device.retire();
            self.rebuild_snapshot();
        }
        removed
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.by_id.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.by_id.iter().map(|r| r.key().clone()).collect()
    }

    /// Devices owned by one bridge.
    pub fn for_bridge(&self, bridge_id: u64) -> Vec<Device> {
        self.by_id
            .iter()
            .filter(|r| r.value().info().bridge_id == bridge_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn snapshot(&self) -> Arc<Vec<Device>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Device>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&self) {
        for entry in &self.by_id {
            entry.value().retire();
        }
        self.by_id.clear();
        self.rebuild_snapshot();
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Device> = self.by_id.iter().map(|r| r.value().clone()).collect();
        values.sort_by(|a, b| a.id().cmp(b.id()));
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}
