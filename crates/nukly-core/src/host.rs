// ── Host accessory framework seam ──
//
// The accessory server that devices are rendered into lives outside this
// crate. The coordinator only talks to it through `AccessoryHost`.

use nukly_api::{DeviceId, DeviceType};
use serde::{Deserialize, Serialize};

use crate::device::DeviceProjection;
use crate::error::CoreError;

/// A device as the host persists it across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryRecord {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub bridge_id: u64,
}

/// The external accessory layer.
///
/// `register`/`unregister` are called in bulk at the end of each resync
/// pass; `publish` after every observation or timer-driven change.
pub trait AccessoryHost: Send + Sync {
    /// Records persisted by a previous run.
    fn cached_accessories(&self) -> Vec<AccessoryRecord>;

    fn register(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError>;

    fn unregister(&self, accessories: &[AccessoryRecord]) -> Result<(), CoreError>;

    fn publish(&self, device: &DeviceId, projection: &DeviceProjection);
}
