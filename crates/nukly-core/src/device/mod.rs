// ── Devices ──
//
// Each device wraps a pure state machine (`lock::apply`, `opener::apply`)
// with the mutable state, timers, and bridge handle it needs at runtime.
// The state machines never perform I/O; they return the new projection
// plus the timer changes the wrapper must carry out.

pub mod lock;
pub mod opener;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nukly_api::{BridgeClient, DeviceId, DeviceType, RawDeviceState};
use serde::Serialize;

use crate::config::PlatformConfig;
use crate::error::CoreError;
use crate::host::{AccessoryHost, AccessoryRecord};
use crate::scheduler::{Scheduler, TimerKind};

pub use lock::{LockDevice, LockProjection, LockServices};
pub use opener::{OpenerDevice, OpenerProjection, OpenerServices};

// ── Projection building blocks ───────────────────────────────────────

/// One side of a current/target pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LockState {
    Unsecured,
    Secured,
    Jammed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockPair {
    pub current: LockState,
    pub target: LockState,
}

impl LockPair {
    pub const SECURED: Self = Self {
        current: LockState::Secured,
        target: LockState::Secured,
    };
    pub const UNSECURED: Self = Self {
        current: LockState::Unsecured,
        target: LockState::Unsecured,
    };
    pub const UNKNOWN: Self = Self {
        current: LockState::Unknown,
        target: LockState::Unknown,
    };
}

/// A mapping-table cell: either a new value or "keep what was there".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cell {
    Set(LockState),
    Keep,
}

impl Cell {
    pub(crate) fn resolve(self, previous: LockState) -> LockState {
        match self {
            Self::Set(state) => state,
            Self::Keep => previous,
        }
    }
}

/// Door contact as derived from the sensor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactState {
    Detected,
    NotDetected,
    Fault,
}

// ── State machine output ─────────────────────────────────────────────

/// A timer change requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Schedule { kind: TimerKind, after: Duration },
    Cancel(TimerKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition<P> {
    pub projection: P,
    pub follow_ups: Vec<FollowUp>,
}

/// What the host renders for a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DeviceProjection {
    SmartLock {
        state: LockProjection,
        services: LockServices,
    },
    Opener {
        state: OpenerProjection,
        services: OpenerServices,
    },
}

/// A user interaction forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    LockTarget(LockState),
    LockSwitch(bool),
    UnlatchTarget(LockState),
    RingToOpen(bool),
    ContinuousMode(bool),
    DoorbellMute(bool),
    SoundLevel(u8),
}

// ── Capabilities ─────────────────────────────────────────────────────

/// Static facts about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub bridge_id: u64,
}

impl DeviceInfo {
    pub fn record(&self) -> AccessoryRecord {
        AccessoryRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            device_type: self.device_type,
            bridge_id: self.bridge_id,
        }
    }
}

impl From<&AccessoryRecord> for DeviceInfo {
    fn from(record: &AccessoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            device_type: record.device_type,
            bridge_id: record.bridge_id,
        }
    }
}

pub trait Identifiable {
    fn info(&self) -> &DeviceInfo;

    fn id(&self) -> &DeviceId {
        &self.info().id
    }

    fn record(&self) -> AccessoryRecord {
        self.info().record()
    }
}

pub trait StateConsumer {
    /// Apply one raw observation (poll result or callback payload).
    fn update(&self, raw: RawDeviceState) -> impl Future<Output = ()> + Send;
}

pub trait ActionDispatcher {
    fn dispatch(&self, action: HostAction) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Shared runtime collaborators handed to every device.
#[derive(Clone)]
pub struct DeviceContext {
    pub scheduler: Scheduler,
    pub host: Arc<dyn AccessoryHost>,
}

// ── Device ───────────────────────────────────────────────────────────

/// A managed device of either family. Cheap to clone.
#[derive(Clone)]
pub enum Device {
    SmartLock(LockDevice),
    Opener(OpenerDevice),
}

impl Device {
    /// Build the device matching `info.device_type`, picking up its
    /// per-device configuration.
    pub fn build(
        info: DeviceInfo,
        bridge: Arc<BridgeClient>,
        ctx: DeviceContext,
        config: &PlatformConfig,
    ) -> Result<Self, CoreError> {
        match info.device_type.family() {
            nukly_api::DeviceFamily::Lock => {
                let cfg = config.smart_lock(&info.id);
                Ok(Self::SmartLock(LockDevice::new(info, cfg, bridge, ctx)))
            }
            nukly_api::DeviceFamily::Opener => {
                let cfg = config.opener(&info.id);
                let web = match &cfg.web_api_token {
                    Some(token) => Some(nukly_api::WebClient::new(
                        &config.web_api_url,
                        token,
                        &config.transport,
                    )?),
                    None => None,
                };
                Ok(Self::Opener(OpenerDevice::new(info, cfg, bridge, web, ctx)))
            }
        }
    }

    pub async fn projection(&self) -> DeviceProjection {
        match self {
            Self::SmartLock(d) => d.projection().await,
            Self::Opener(d) => d.projection().await,
        }
    }

    /// Abort this device's timers.
    pub fn retire(&self) {
        match self {
            Self::SmartLock(d) => d.retire(),
            Self::Opener(d) => d.retire(),
        }
    }
}

impl Identifiable for Device {
    fn info(&self) -> &DeviceInfo {
        match self {
            Self::SmartLock(d) => d.info(),
            Self::Opener(d) => d.info(),
        }
    }
}

impl StateConsumer for Device {
    async fn update(&self, raw: RawDeviceState) {
        match self {
            Self::SmartLock(d) => d.update(raw).await,
            Self::Opener(d) => d.update(raw).await,
        }
    }
}

impl ActionDispatcher for Device {
    async fn dispatch(&self, action: HostAction) -> Result<(), CoreError> {
        match self {
            Self::SmartLock(d) => d.dispatch(action).await,
            Self::Opener(d) => d.dispatch(action).await,
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        f.debug_struct("Device")
            .field("id", &info.id)
            .field("type", &info.device_type)
            .field("bridge_id", &info.bridge_id)
            .finish_non_exhaustive()
    }
}
