// ── Sync coordinator ──
//
// Full lifecycle of the platform: bridge registry loading, device
// reconstruction from the host's cached accessories, callback server
// startup, and periodic resynchronisation of the device list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use nukly_api::{BridgeClient, DeviceId, DeviceType, ListedDevice, SigningMode};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callback;
use crate::config::PlatformConfig;
use crate::device::{
    ActionDispatcher, Device, DeviceContext, DeviceInfo, HostAction, Identifiable, StateConsumer,
};
use crate::error::CoreError;
use crate::host::{AccessoryHost, AccessoryRecord};
use crate::registry::{BridgeRegistry, Verification};
use crate::scheduler::Scheduler;
use crate::store::DeviceStore;

/// What one resync pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub devices: usize,
    pub registered: usize,
    pub unregistered: usize,
    /// Bridges whose device list could not be fetched; their devices were
    /// kept as they were.
    pub failed_bridges: Vec<u64>,
}

/// Cheaply cloneable handle to the running platform.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: PlatformConfig,
    registry: BridgeRegistry,
    store: Arc<DeviceStore>,
    ctx: DeviceContext,
    /// Accessories the host currently has registered.
    registered: Mutex<HashMap<DeviceId, AccessoryRecord>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Build the coordinator. Does not touch the network or disk; call
    /// [`start`](Self::start).
    pub fn new(config: PlatformConfig, host: Arc<dyn AccessoryHost>) -> Result<Self, CoreError> {
        let registry = BridgeRegistry::new(
            config.bridge_store_path(),
            config.transport.clone(),
            &config.discovery_url,
            SigningMode::from_hash_token(config.hash_token),
        )?;

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                config,
                registry,
                store: Arc::new(DeviceStore::new()),
                ctx: DeviceContext {
                    scheduler: Scheduler::new(),
                    host,
                },
                registered: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load bridges, restore cached devices, run the first resync, then
    /// start the callback server and the periodic resync.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.load_bridges().await?;
        self.restore_cached().await;

        let report = self.resync().await;
        info!(
            devices = report.devices,
            registered = report.registered,
            unregistered = report.unregistered,
            "initial sync complete"
        );

        let server_config = self.inner.config.callback_server.clone();
        callback::ensure_callbacks(&self.inner.registry.bridges(), &server_config.callback_url())
            .await;

        let mut handles = self.inner.task_handles.lock().await;

        let store = Arc::clone(&self.inner.store);
        let cancel = self.inner.cancel.child_token();
        handles.push(tokio::spawn(async move {
            if let Err(e) = callback::serve(server_config, store, cancel).await {
                warn!(error = %e, "callback server stopped");
            }
        }));

        if let Some(interval) = self.inner.config.resync_interval {
            let coordinator = self.clone();
            let cancel = self.inner.cancel.child_token();
            handles.push(tokio::spawn(refresh_task(coordinator, interval, cancel)));
        }

        Ok(())
    }

    /// Stop background tasks and pending timers.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        self.inner.ctx.scheduler.shutdown();
        debug!("coordinator stopped");
    }

    // ── Bridges ──────────────────────────────────────────────────────

    /// Static mode replaces the store with the configured bridges. Dynamic
    /// mode re-checks stored credentials, drops revoked bridges, and pairs
    /// any discovered bridge not yet known.
    pub async fn load_bridges(&self) -> Result<(), CoreError> {
        let registry = &self.inner.registry;

        if self.inner.config.is_static() {
            info!(count = self.inner.config.bridges.len(), "using static bridge configuration");
            return registry.replace_all(&self.inner.config.bridges).await;
        }

        registry.load().await?;
        info!("using dynamic bridge configuration");

        for bridge in registry.bridges() {
            match registry.verify(&bridge).await {
                Ok(Verification::Authenticated) => {
                    info!(bridge = %bridge, "bridge already authenticated");
                }
                Ok(Verification::Revoked) => {
                    registry.delete(bridge.id()).await?;
                }
                Err(e) => warn!(bridge = %bridge, error = %e, "cannot verify bridge"),
            }
        }

        self.pair_discovered().await;
        Ok(())
    }

    /// Pair every discovered bridge not already in the registry. Returns
    /// the number of bridges newly paired.
    pub async fn pair_discovered(&self) -> usize {
        let registry = &self.inner.registry;
        let candidates = match registry.discover().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "bridge discovery failed");
                return 0;
            }
        };

        let mut paired = 0;
        for candidate in candidates {
            if registry.get(candidate.bridge_id).is_some() {
                continue;
            }
            info!(ip = %candidate.ip, "pairing with bridge; press its button now");
            let result = match registry.auth(&candidate).await {
                Ok(record) => registry.persist(&record).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(bridge) => {
                    info!(bridge = %bridge, "bridge paired");
                    paired += 1;
                }
                Err(e) => warn!(bridge_id = candidate.bridge_id, error = %e, "pairing failed"),
            }
        }
        paired
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Rebuild devices from the host's cached accessories so callbacks
    /// route before the first list completes.
    async fn restore_cached(&self) {
        let cached = self.inner.ctx.host.cached_accessories();
        let mut registered = self.inner.registered.lock().await;

        for record in cached {
            if let Some(bridge) = self.inner.registry.get(record.bridge_id) {
                match self.build_device(DeviceInfo::from(&record), bridge) {
                    Ok(device) => {
                        self.inner.store.upsert(device);
                    }
                    Err(e) => warn!(device_id = %record.id, error = %e, "cannot restore device"),
                }
            }
            registered.insert(record.id.clone(), record);
        }
        debug!(devices = self.inner.store.len(), "cached devices restored");
    }

    /// One full pass: list every bridge, update or create its devices, and
    /// hand the host the accessories to register and unregister.
    pub async fn resync(&self) -> SyncReport {
        let mut present: HashMap<DeviceId, AccessoryRecord> = HashMap::new();
        let mut failed: HashSet<u64> = HashSet::new();
        let mut created: Vec<Device> = Vec::new();

        for bridge in self.inner.registry.bridges() {
            debug!(bridge = %bridge, "listing devices");
            match bridge.list().await {
                Ok(listed) => {
                    for entry in listed {
                        match self.reconcile(&bridge, entry).await {
                            Ok((device, is_new)) => {
                                if is_new {
                                    created.push(device.clone());
                                }
                                present.insert(device.id().clone(), device.record());
                            }
                            Err(e) => warn!(bridge = %bridge, error = %e, "skipping device"),
                        }
                    }
                }
                Err(e) => {
                    warn!(bridge = %bridge, error = %e, "cannot list devices; keeping them");
                    failed.insert(bridge.id());
                }
            }
        }

        let mut registered = self.inner.registered.lock().await;

        let mut to_unregister = Vec::new();
        for (id, record) in registered.iter() {
            match present.get(id) {
                Some(now) if now == record => {}
                Some(_) => to_unregister.push(record.clone()),
                None if failed.contains(&record.bridge_id) => {
                    present.insert(id.clone(), record.clone());
                }
                None => to_unregister.push(record.clone()),
            }
        }
        let to_register: Vec<AccessoryRecord> = present
            .iter()
            .filter(|(id, record)| registered.get(*id) != Some(*record))
            .map(|(_, record)| record.clone())
            .collect();

        for record in &to_unregister {
            if !present.contains_key(&record.id) {
                self.inner.store.remove(&record.id);
            }
        }

        if !to_unregister.is_empty() {
            if let Err(e) = self.inner.ctx.host.unregister(&to_unregister) {
                warn!(error = %e, "host failed to unregister accessories");
            }
        }
        if !to_register.is_empty() {
            if let Err(e) = self.inner.ctx.host.register(&to_register) {
                warn!(error = %e, "host failed to register accessories");
            }
        }

        let report = SyncReport {
            devices: present.len(),
            registered: to_register.len(),
            unregistered: to_unregister.len(),
            failed_bridges: {
                let mut ids: Vec<u64> = failed.into_iter().collect();
                ids.sort_unstable();
                ids
            },
        };
        *registered = present;
        drop(registered);

        for device in created {
            if let Device::Opener(opener) = device {
                if let Err(e) = opener.refresh_cloud_config().await {
                    warn!(device_id = %opener.id(), error = %e, "cannot read opener cloud config");
                }
            }
        }

        report
    }

    /// Match one listed device against the store and apply its state.
    async fn reconcile(
        &self,
        bridge: &Arc<BridgeClient>,
        entry: ListedDevice,
    ) -> Result<(Device, bool), CoreError> {
        let device_type = DeviceType::try_from(entry.device_type)?;
        let info = DeviceInfo {
            id: entry.nuki_id,
            name: entry.name,
            device_type,
            bridge_id: bridge.id(),
        };

        let (device, is_new) = match self.inner.store.get(&info.id) {
            Some(existing) if existing.info() == &info => (existing, false),
            _ => {
                let device = self.build_device(info, Arc::clone(bridge))?;
                info!(device_id = %device.id(), device_type = %device_type, "adding device");
                self.inner.store.upsert(device.clone());
                (device, true)
            }
        };

        if let Some(raw) = entry.last_known_state {
            device.update(raw).await;
        }
        Ok((device, is_new))
    }

    fn build_device(
        &self,
        info: DeviceInfo,
        bridge: Arc<BridgeClient>,
    ) -> Result<Device, CoreError> {
        Device::build(info, bridge, self.inner.ctx.clone(), &self.inner.config)
    }

    // ── Host-facing ──────────────────────────────────────────────────

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.inner.store.get(id)
    }

    /// Forward a user interaction to a device.
    pub async fn dispatch(&self, id: &DeviceId, action: HostAction) -> Result<(), CoreError> {
        let device = self.device(id).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: id.to_string(),
        })?;
        device.dispatch(action).await
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn refresh_task(coordinator: SyncCoordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let report = coordinator.resync().await;
                debug!(
                    devices = report.devices,
                    registered = report.registered,
                    unregistered = report.unregistered,
                    "periodic resync complete"
                );
            }
        }
    }
}
