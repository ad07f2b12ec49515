// ── Lock-family devices ──
//
// Smart lock, smart door and smart lock 3.0 share one state machine.

use std::sync::Arc;
use std::time::Duration;

use nukly_api::{BridgeClient, DeviceAction, LockAction, RawDeviceState};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    ActionDispatcher, Cell, ContactState, DeviceContext, DeviceInfo, DeviceProjection, FollowUp,
    HostAction, Identifiable, LockPair, LockState, StateConsumer, Transition,
};
use crate::config::SmartLockConfig;
use crate::error::CoreError;
use crate::scheduler::TimerKind;

/// How long the unlatch pair stays unsecured before snapping back.
pub const UNLATCH_RESET_DELAY: Duration = Duration::from_millis(1500);

/// Raw lock-state codes.
mod code {
    pub const UNCALIBRATED: u8 = 0;
    pub const LOCKED: u8 = 1;
    pub const UNLOCKING: u8 = 2;
    pub const UNLOCKED: u8 = 3;
    pub const LOCKING: u8 = 4;
    pub const UNLATCHED: u8 = 5;
    pub const UNLOCKED_LOCK_N_GO: u8 = 6;
    pub const UNLATCHING: u8 = 7;
    pub const MOTOR_BLOCKED_LEGACY: u8 = 8;
    pub const MOTOR_BLOCKED: u8 = 254;
}

/// Normalized lock-family state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockProjection {
    pub lock: LockPair,
    /// Plain switch view of the lock; on = secured.
    pub switch_on: bool,
    pub unlatch: LockPair,
    /// `None` while the door sensor is deactivated or absent.
    pub contact: Option<ContactState>,
    pub battery_low: bool,
}

impl Default for LockProjection {
    fn default() -> Self {
        Self {
            lock: LockPair::UNKNOWN,
            switch_on: false,
            unlatch: LockPair::SECURED,
            contact: None,
            battery_low: false,
        }
    }
}

/// Which lock views the host should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockServices {
    pub lock_mechanism: bool,
    pub switch: bool,
}

impl From<&SmartLockConfig> for LockServices {
    fn from(cfg: &SmartLockConfig) -> Self {
        Self {
            lock_mechanism: cfg.secure_lock_service,
            switch: cfg.unsecure_lock_service,
        }
    }
}

/// Mapping table row for a raw lock state: (current, target).
fn lock_row(state: u8) -> (Cell, Cell) {
    use Cell::{Keep, Set};
    use LockState::{Jammed, Secured, Unknown, Unsecured};

    match state {
        code::LOCKED => (Set(Secured), Set(Secured)),
        code::LOCKING => (Set(Unsecured), Set(Secured)),
        code::MOTOR_BLOCKED | code::MOTOR_BLOCKED_LEGACY | code::UNCALIBRATED => {
            (Set(Jammed), Keep)
        }
        code::UNLATCHED | code::UNLOCKED => (Set(Unsecured), Set(Unsecured)),
        code::UNLATCHING | code::UNLOCKING => (Keep, Set(Unsecured)),
        code::UNLOCKED_LOCK_N_GO => (Keep, Set(Secured)),
        // 255 and anything unrecognised
        _ => (Set(Unknown), Set(Unknown)),
    }
}

pub(crate) fn contact_state(doorsensor_state: u8) -> Option<ContactState> {
    match doorsensor_state {
        0 | 1 => None,
        2 => Some(ContactState::Detected),
        3 => Some(ContactState::NotDetected),
        _ => Some(ContactState::Fault),
    }
}

/// Derive the next projection from a raw observation.
///
/// Pure: the same `(previous, raw)` always yields the same result, and
/// applying a snapshot twice is the same as applying it once.
pub fn apply(previous: &LockProjection, raw: &RawDeviceState) -> Transition<LockProjection> {
    let (current, target) = lock_row(raw.state);

    let lock = LockPair {
        current: current.resolve(previous.lock.current),
        target: target.resolve(previous.lock.target),
    };

    let switch_on = match target {
        Cell::Set(LockState::Secured) => true,
        Cell::Set(LockState::Unsecured) => false,
        _ => previous.switch_on,
    };

    let unlatching = matches!(raw.state, code::UNLATCHING | code::UNLATCHED);
    let unlatch = if unlatching {
        LockPair::UNSECURED
    } else {
        LockPair::SECURED
    };

    let follow_ups = if unlatching {
        vec![FollowUp::Schedule {
            kind: TimerKind::UnlatchReset,
            after: UNLATCH_RESET_DELAY,
        }]
    } else {
        Vec::new()
    };

    Transition {
        projection: LockProjection {
            lock,
            switch_on,
            unlatch,
            contact: contact_state(raw.doorsensor_state),
            battery_low: raw.battery_critical,
        },
        follow_ups,
    }
}

// ── LockDevice ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LockDevice {
    inner: Arc<LockInner>,
}

struct LockInner {
    info: DeviceInfo,
    config: SmartLockConfig,
    bridge: Arc<BridgeClient>,
    ctx: DeviceContext,
    state: Mutex<LockProjection>,
}

impl LockDevice {
    pub fn new(
        info: DeviceInfo,
        config: SmartLockConfig,
        bridge: Arc<BridgeClient>,
        ctx: DeviceContext,
    ) -> Self {
        Self {
            inner: Arc::new(LockInner {
                info,
                config,
                bridge,
                ctx,
                state: Mutex::new(LockProjection::default()),
            }),
        }
    }

    pub fn config(&self) -> &SmartLockConfig {
        &self.inner.config
    }

    pub async fn state(&self) -> LockProjection {
        *self.inner.state.lock().await
    }

    pub async fn projection(&self) -> DeviceProjection {
        self.inner.render(self.state().await)
    }

    pub(crate) fn retire(&self) {
        self.inner.ctx.scheduler.cancel_device(&self.inner.info.id);
    }

    /// Lock or unlock through the lock mechanism.
    pub async fn handle_lock_set(&self, target: LockState) -> Result<(), CoreError> {
        let action = match target {
            LockState::Secured => LockAction::Lock,
            LockState::Unsecured => LockAction::Unlock,
            other => {
                return Err(CoreError::Unsupported {
                    operation: format!("lock target {other}"),
                });
            }
        };
        self.send(action).await?;

        let mut state = self.inner.state.lock().await;
        state.lock.target = target;
        state.switch_on = target == LockState::Secured;
        self.inner.publish(*state);
        Ok(())
    }

    /// The plain switch: on locks, off unlocks.
    pub async fn handle_lock_switch_set(&self, on: bool) -> Result<(), CoreError> {
        let target = if on {
            LockState::Secured
        } else {
            LockState::Unsecured
        };
        self.handle_lock_set(target).await
    }

    /// The unlatch pair.
    ///
    /// Unlatching a thrown bolt is refused locally unless
    /// `unlatch_when_locked` is set; the pair then springs back to
    /// secured after [`UNLATCH_RESET_DELAY`] without any bridge call.
    pub async fn handle_unlatch_set(&self, target: LockState) -> Result<(), CoreError> {
        if target != LockState::Unsecured {
            let mut state = self.inner.state.lock().await;
            state.unlatch.target = target;
            self.inner.publish(*state);
            return Ok(());
        }

        {
            let mut state = self.inner.state.lock().await;
            if !self.inner.config.unlatch_when_locked && state.lock.current == LockState::Secured {
                warn!(device_id = %self.inner.info.id, "unlatch refused while locked");
                state.unlatch.target = LockState::Unsecured;
                self.inner.publish(*state);
                self.inner.schedule_unlatch_reset();
                return Ok(());
            }
        }

        match self.send(LockAction::Unlatch).await {
            Ok(()) => {
                let mut state = self.inner.state.lock().await;
                state.unlatch = LockPair::UNSECURED;
                self.inner.publish(*state);
                self.inner.schedule_unlatch_reset();
                Ok(())
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                state.unlatch = LockPair::SECURED;
                self.inner.publish(*state);
                Err(e)
            }
        }
    }

    async fn send(&self, action: LockAction) -> Result<(), CoreError> {
        let info = &self.inner.info;
        info!(device_id = %info.id, %action, "lock action");
        self.inner
            .bridge
            .lock_action(&info.id, info.device_type, DeviceAction::Lock(action))
            .await
            .map_err(CoreError::from)
    }
}

impl LockInner {
    fn render(&self, state: LockProjection) -> DeviceProjection {
        DeviceProjection::SmartLock {
            state,
            services: LockServices::from(&self.config),
        }
    }

    fn publish(&self, state: LockProjection) {
        self.ctx.host.publish(&self.info.id, &self.render(state));
    }

    fn schedule_unlatch_reset(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.ctx.scheduler.schedule(
            &self.info.id,
            TimerKind::UnlatchReset,
            UNLATCH_RESET_DELAY,
            async move {
                let mut state = inner.state.lock().await;
                state.unlatch = LockPair::SECURED;
                debug!(device_id = %inner.info.id, "unlatch reset");
                inner.publish(*state);
            },
        );
    }

    fn run_follow_ups(self: &Arc<Self>, follow_ups: &[FollowUp]) {
        for follow_up in follow_ups {
            match *follow_up {
                FollowUp::Schedule {
                    kind: TimerKind::UnlatchReset,
                    ..
                } => self.schedule_unlatch_reset(),
                FollowUp::Cancel(kind) => {
                    self.ctx.scheduler.cancel(&self.info.id, kind);
                }
                FollowUp::Schedule { kind, .. } => {
                    debug!(device_id = %self.info.id, %kind, "ignoring timer for another family");
                }
            }
        }
    }
}

impl Identifiable for LockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }
}

impl StateConsumer for LockDevice {
    async fn update(&self, raw: RawDeviceState) {
        let mut state = self.inner.state.lock().await;
        let transition = apply(&state, &raw);
        *state = transition.projection;
        debug!(
            device_id = %self.inner.info.id,
            raw_state = raw.state,
            current = %state.lock.current,
            target = %state.lock.target,
            "lock state applied"
        );
        self.inner.publish(*state);
        self.inner.run_follow_ups(&transition.follow_ups);
    }
}

impl ActionDispatcher for LockDevice {
    async fn dispatch(&self, action: HostAction) -> Result<(), CoreError> {
        match action {
            HostAction::LockTarget(target) => self.handle_lock_set(target).await,
            HostAction::LockSwitch(on) => self.handle_lock_switch_set(on).await,
            HostAction::UnlatchTarget(target) => self.handle_unlatch_set(target).await,
            other => Err(CoreError::Unsupported {
                operation: format!("{other:?} on a lock"),
            }),
        }
    }
}
