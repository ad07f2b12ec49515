// ── Wire-level enumerations shared by every API surface ──

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;
use thiserror::Error;

/// Vendor-assigned device identifier (`nukiId`).
///
/// Bridges report it as a JSON number in `/list` and callbacks; persisted
/// host records may carry it as a string. Both deserialize here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for DeviceId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrString {
            Num(u64),
            Str(String),
        }

        Ok(match NumOrString::deserialize(deserializer)? {
            NumOrString::Num(n) => Self(n.to_string()),
            NumOrString::Str(s) => Self(s),
        })
    }
}

/// Rejected `deviceType` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown device type code {0}")]
pub struct UnknownDeviceType(pub u8);

/// Closed set of device types the bridge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeviceType {
    #[strum(to_string = "smartlock")]
    SmartLock,
    #[strum(to_string = "opener")]
    Opener,
    #[strum(to_string = "smartdoor")]
    SmartDoor,
    #[strum(to_string = "smartlock3")]
    SmartLock3,
}

/// Which state machine a device type runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Lock,
    Opener,
}

impl DeviceType {
    /// The numeric `deviceType` code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::SmartLock => 0,
            Self::Opener => 2,
            Self::SmartDoor => 3,
            Self::SmartLock3 => 4,
        }
    }

    pub fn family(self) -> DeviceFamily {
        match self {
            Self::Opener => DeviceFamily::Opener,
            Self::SmartLock | Self::SmartDoor | Self::SmartLock3 => DeviceFamily::Lock,
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = UnknownDeviceType;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::SmartLock),
            2 => Ok(Self::Opener),
            3 => Ok(Self::SmartDoor),
            4 => Ok(Self::SmartLock3),
            other => Err(UnknownDeviceType(other)),
        }
    }
}

impl From<DeviceType> for u8 {
    fn from(t: DeviceType) -> Self {
        t.code()
    }
}

/// Lock-family actions for `/lockAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LockAction {
    Unlock,
    Lock,
    Unlatch,
    LockNGo,
    LockNGoWithUnlatch,
}

impl LockAction {
    pub fn code(self) -> u8 {
        match self {
            Self::Unlock => 1,
            Self::Lock => 2,
            Self::Unlatch => 3,
            Self::LockNGo => 4,
            Self::LockNGoWithUnlatch => 5,
        }
    }
}

/// Opener-family actions for `/lockAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OpenerAction {
    ActivateRto,
    DeactivateRto,
    ElectricStrikeActuation,
    ActivateContinuousMode,
    DeactivateContinuousMode,
}

impl OpenerAction {
    pub fn code(self) -> u8 {
        match self {
            Self::ActivateRto => 1,
            Self::DeactivateRto => 2,
            Self::ElectricStrikeActuation => 3,
            Self::ActivateContinuousMode => 4,
            Self::DeactivateContinuousMode => 5,
        }
    }
}

/// An action code from either family. The codes overlap numerically, so
/// the family travels with the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Lock(LockAction),
    Opener(OpenerAction),
}

impl DeviceAction {
    pub fn code(self) -> u8 {
        match self {
            Self::Lock(a) => a.code(),
            Self::Opener(a) => a.code(),
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock(a) => write!(f, "lock:{a}"),
            Self::Opener(a) => write!(f, "opener:{a}"),
        }
    }
}

impl From<LockAction> for DeviceAction {
    fn from(a: LockAction) -> Self {
        Self::Lock(a)
    }
}

impl From<OpenerAction> for DeviceAction {
    fn from(a: OpenerAction) -> Self {
        Self::Opener(a)
    }
}
