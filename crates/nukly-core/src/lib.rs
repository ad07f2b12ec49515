// nukly-core: Bridge registry, callback ingestion, and device reconciliation on top of nukly-api.

pub mod callback;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod host;
pub mod registry;
pub mod scheduler;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CallbackServerConfig, OpenerConfig, PlatformConfig, SmartLockConfig};
pub use coordinator::{SyncCoordinator, SyncReport};
pub use device::{
    ActionDispatcher, ContactState, Device, DeviceInfo, DeviceProjection, HostAction,
    Identifiable, LockPair, LockState, StateConsumer,
};
pub use error::CoreError;
pub use host::{AccessoryHost, AccessoryRecord};
pub use registry::{BridgeRegistry, Verification};
pub use scheduler::{Scheduler, TimerKind};
pub use store::DeviceStore;
