// ── Opener-family devices ──
//
// The opener drives an intercom's door buzzer. Beyond the lock pair it
// tracks ring-to-open (RTO), continuous mode, and doorbell rings. Ring
// suppression and sound level live in the vendor cloud, not on the
// bridge.

use std::sync::Arc;
use std::time::Duration;

use nukly_api::{BridgeClient, DeviceAction, OpenerAction, RawDeviceState, WebClient};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    ActionDispatcher, DeviceContext, DeviceInfo, DeviceProjection, FollowUp, HostAction,
    Identifiable, LockPair, LockState, StateConsumer, Transition,
};
use crate::config::OpenerConfig;
use crate::error::CoreError;
use crate::scheduler::TimerKind;

const ONLINE: u8 = 1;
const RTO_ACTIVE: u8 = 3;
const OPEN: u8 = 5;
const OPENING: u8 = 7;
const UNDEFINED: u8 = 255;

const CONTINUOUS_MODE: u8 = 3;

/// Normalized opener state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpenerProjection {
    pub lock: LockPair,
    /// Set only on the observation that carried a fresh ring.
    pub ring: bool,
    pub rto_on: bool,
    pub continuous_mode_on: bool,
    pub battery_low: bool,
    /// Timestamp of the last ring seen, used to drop replays.
    pub last_ring_at: Option<String>,
    /// Cloud-side settings; `None` until fetched.
    pub ring_muted: Option<bool>,
    pub sound_level: Option<u8>,
}

/// Which opener views the host should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenerServices {
    pub rto_switch: bool,
    pub continuous_mode_switch: bool,
    pub doorbell: bool,
    pub doorbell_mute: bool,
}

impl From<&OpenerConfig> for OpenerServices {
    fn from(cfg: &OpenerConfig) -> Self {
        Self {
            rto_switch: cfg.rto_switch_service,
            continuous_mode_switch: cfg.continuous_mode_switch_service,
            doorbell: cfg.doorbell_service,
            doorbell_mute: cfg.doorbell_mute_service,
        }
    }
}

/// Derive the next projection from a raw observation.
///
/// `rto_timeout` is the configured delay after which ring-to-open is
/// disarmed following the first ring.
pub fn apply(
    previous: &OpenerProjection,
    raw: &RawDeviceState,
    rto_timeout: Option<Duration>,
) -> Transition<OpenerProjection> {
    let available = matches!(raw.state, ONLINE | RTO_ACTIVE);

    let lock = match raw.state {
        ONLINE | RTO_ACTIVE => LockPair::SECURED,
        OPEN => LockPair::UNSECURED,
        OPENING => LockPair {
            current: previous.lock.current,
            target: LockState::Unsecured,
        },
        UNDEFINED => LockPair::UNKNOWN,
        _ => previous.lock,
    };

    let continuous_mode_on = raw.mode == CONTINUOUS_MODE;
    let rto_on = if available {
        raw.state == RTO_ACTIVE
    } else {
        previous.rto_on
    };

    let fresh_ring = raw.ringaction_state
        && raw.ringaction_timestamp.is_some()
        && raw.ringaction_timestamp != previous.last_ring_at;
    let ring = fresh_ring && available && !continuous_mode_on;

    let last_ring_at = if raw.ringaction_state && raw.ringaction_timestamp.is_some() {
        raw.ringaction_timestamp.clone()
    } else {
        previous.last_ring_at.clone()
    };

    let mut follow_ups = Vec::new();
    match rto_timeout {
        Some(after) if ring && rto_on => follow_ups.push(FollowUp::Schedule {
            kind: TimerKind::RtoDeactivation,
            after,
        }),
        _ if available && !rto_on => follow_ups.push(FollowUp::Cancel(TimerKind::RtoDeactivation)),
        _ => {}
    }

    Transition {
        projection: OpenerProjection {
            lock,
            ring,
            rto_on,
            continuous_mode_on,
            battery_low: raw.battery_critical,
            last_ring_at,
            ring_muted: previous.ring_muted,
            sound_level: previous.sound_level,
        },
        follow_ups,
    }
}

// ── OpenerDevice ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OpenerDevice {
    inner: Arc<OpenerInner>,
}

struct OpenerInner {
    info: DeviceInfo,
    config: OpenerConfig,
    bridge: Arc<BridgeClient>,
    web: Option<WebClient>,
    ctx: DeviceContext,
    state: Mutex<OpenerProjection>,
}

impl OpenerDevice {
    pub fn new(
        info: DeviceInfo,
        config: OpenerConfig,
        bridge: Arc<BridgeClient>,
        web: Option<WebClient>,
        ctx: DeviceContext,
    ) -> Self {
        Self {
            inner: Arc::new(OpenerInner {
                info,
                config,
                bridge,
                web,
                ctx,
                state: Mutex::new(OpenerProjection::default()),
            }),
        }
    }

    pub fn config(&self) -> &OpenerConfig {
        &self.inner.config
    }

    pub async fn state(&self) -> OpenerProjection {
        self.inner.state.lock().await.clone()
    }

    pub async fn projection(&self) -> DeviceProjection {
        self.inner.render(self.state().await)
    }

    pub(crate) fn retire(&self) {
        self.inner.ctx.scheduler.cancel_device(&self.inner.info.id);
    }

    /// Unsecured buzzes the door; secured is only reflected.
    pub async fn handle_lock_set(&self, target: LockState) -> Result<(), CoreError> {
        match target {
            LockState::Unsecured => {
                self.send(OpenerAction::ElectricStrikeActuation).await?;
            }
            LockState::Secured => {}
            other => {
                return Err(CoreError::Unsupported {
                    operation: format!("opener target {other}"),
                });
            }
        }
        let mut state = self.inner.state.lock().await;
        state.lock.target = target;
        self.inner.publish(state.clone());
        Ok(())
    }

    /// Arm or disarm ring-to-open. Drops any pending auto-deactivation.
    pub async fn handle_rto_switch_set(&self, on: bool) -> Result<(), CoreError> {
        self.inner
            .ctx
            .scheduler
            .cancel(&self.inner.info.id, TimerKind::RtoDeactivation);

        let action = if on {
            OpenerAction::ActivateRto
        } else {
            OpenerAction::DeactivateRto
        };
        self.send(action).await?;

        let mut state = self.inner.state.lock().await;
        state.rto_on = on;
        self.inner.publish(state.clone());
        Ok(())
    }

    pub async fn handle_continuous_mode_set(&self, on: bool) -> Result<(), CoreError> {
        let action = if on {
            OpenerAction::ActivateContinuousMode
        } else {
            OpenerAction::DeactivateContinuousMode
        };
        self.send(action).await?;

        let mut state = self.inner.state.lock().await;
        state.continuous_mode_on = on;
        self.inner.publish(state.clone());
        Ok(())
    }

    /// Toggle the ring-suppression bit in the cloud config.
    pub async fn handle_doorbell_mute_set(&self, muted: bool) -> Result<(), CoreError> {
        let web = self.web("doorbell mute")?;
        let id = &self.inner.info.id;

        let mut config = web.opener_advanced_config(id).await?;
        config.set_ring_muted(muted);
        web.update_opener_advanced_config(id, &config).await?;
        info!(device_id = %id, muted, "doorbell mute updated");

        let mut state = self.inner.state.lock().await;
        state.ring_muted = Some(muted);
        state.sound_level = Some(config.sound_level);
        self.inner.publish(state.clone());
        Ok(())
    }

    pub async fn handle_sound_level_set(&self, level: u8) -> Result<(), CoreError> {
        let web = self.web("sound level")?;
        let id = &self.inner.info.id;

        let mut config = web.opener_advanced_config(id).await?;
        config.sound_level = level;
        web.update_opener_advanced_config(id, &config).await?;
        info!(device_id = %id, level, "sound level updated");

        let mut state = self.inner.state.lock().await;
        state.sound_level = Some(level);
        state.ring_muted = Some(config.ring_muted());
        self.inner.publish(state.clone());
        Ok(())
    }

    /// Pull mute and sound level from the cloud, if a token is configured.
    pub async fn refresh_cloud_config(&self) -> Result<(), CoreError> {
        let Some(web) = &self.inner.web else {
            return Ok(());
        };
        let config = web.opener_advanced_config(&self.inner.info.id).await?;

        let mut state = self.inner.state.lock().await;
        state.ring_muted = Some(config.ring_muted());
        state.sound_level = Some(config.sound_level);
        self.inner.publish(state.clone());
        Ok(())
    }

    fn web(&self, operation: &str) -> Result<&WebClient, CoreError> {
        self.inner.web.as_ref().ok_or_else(|| CoreError::Unsupported {
            operation: format!("{operation} without a web API token"),
        })
    }

    async fn send(&self, action: OpenerAction) -> Result<(), CoreError> {
        self.inner.send(action).await
    }
}

impl OpenerInner {
    fn render(&self, state: OpenerProjection) -> DeviceProjection {
        DeviceProjection::Opener {
            state,
            services: OpenerServices::from(&self.config),
        }
    }

    fn publish(&self, state: OpenerProjection) {
        self.ctx.host.publish(&self.info.id, &self.render(state));
    }

    async fn send(&self, action: OpenerAction) -> Result<(), CoreError> {
        info!(device_id = %self.info.id, %action, "opener action");
        self.bridge
            .lock_action(&self.info.id, self.info.device_type, DeviceAction::Opener(action))
            .await
            .map_err(CoreError::from)
    }

    fn schedule_rto_deactivation(self: &Arc<Self>, after: Duration) {
        let inner = Arc::clone(self);
        debug!(device_id = %self.info.id, ?after, "ring-to-open deactivation scheduled");
        self.ctx
            .scheduler
            .schedule(&self.info.id, TimerKind::RtoDeactivation, after, async move {
                match inner.send(OpenerAction::DeactivateRto).await {
                    Ok(()) => {
                        let mut state = inner.state.lock().await;
                        state.rto_on = false;
                        inner.publish(state.clone());
                    }
                    Err(e) => {
                        warn!(
                            device_id = %inner.info.id,
                            error = %e,
                            "ring-to-open deactivation failed"
                        );
                    }
                }
            });
    }

    fn run_follow_ups(self: &Arc<Self>, follow_ups: &[FollowUp]) {
        for follow_up in follow_ups {
            match *follow_up {
                FollowUp::Schedule {
                    kind: TimerKind::RtoDeactivation,
                    after,
                } => self.schedule_rto_deactivation(after),
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

impl Identifiable for OpenerDevice {
    fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }
}

impl StateConsumer for OpenerDevice {
    async fn update(&self, raw: RawDeviceState) {
        let mut state = self.inner.state.lock().await;
        let transition = apply(
            &state,
            &raw,
            self.inner.config.deactivate_rto_after_first_ring_timeout,
        );
        *state = transition.projection;
        if state.ring {
            info!(device_id = %self.inner.info.id, rto = state.rto_on, "doorbell ring");
        }
        self.inner.publish(state.clone());
        self.inner.run_follow_ups(&transition.follow_ups);
    }
}

impl ActionDispatcher for OpenerDevice {
    async fn dispatch(&self, action: HostAction) -> Result<(), CoreError> {
        match action {
            HostAction::LockTarget(target) => self.handle_lock_set(target).await,
            HostAction::RingToOpen(on) => self.handle_rto_switch_set(on).await,
            HostAction::ContinuousMode(on) => self.handle_continuous_mode_set(on).await,
            HostAction::DoorbellMute(muted) => self.handle_doorbell_mute_set(muted).await,
            HostAction::SoundLevel(level) => self.handle_sound_level_set(level).await,
            other => Err(CoreError::Unsupported {
                operation: format!("{other:?} on an opener"),
            }),
        }
    }
}
