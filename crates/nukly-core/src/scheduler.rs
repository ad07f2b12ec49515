// ── Per-device timers ──
//
// Deferred device work (unlatch auto-reset, ring-to-open deactivation)
// runs as a spawned task keyed by (device, kind). At most one task per
// key is alive: scheduling a key aborts whatever was pending for it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nukly_api::DeviceId;
use tokio::task::JoinHandle;
use tracing::trace;

/// What a pending timer will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimerKind {
    UnlatchReset,
    RtoDeactivation,
}

type TimerKey = (DeviceId, TimerKind);

/// Cheaply cloneable handle to the shared timer table.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<DashMap<TimerKey, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any timer pending for the key.
    pub fn schedule<F>(&self, device: &DeviceId, kind: TimerKind, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        trace!(device_id = %device, %kind, ?delay, "timer scheduled");
        if let Some(previous) = self.tasks.insert((device.clone(), kind), handle) {
            previous.abort();
        }
    }

    /// Abort the pending timer for the key. Returns `true` if one was
    /// still waiting.
    pub fn cancel(&self, device: &DeviceId, kind: TimerKind) -> bool {
        match self.tasks.remove(&(device.clone(), kind)) {
            Some((_, handle)) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    trace!(device_id = %device, %kind, "timer cancelled");
                }
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self, device: &DeviceId, kind: TimerKind) -> bool {
        self.tasks
            .get(&(device.clone(), kind))
            .is_some_and(|h| !h.is_finished())
    }

    /// Abort every timer belonging to a device.
    pub fn cancel_device(&self, device: &DeviceId) {
        self.tasks.retain(|(id, _), handle| {
            if id == device {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Abort everything.
    pub fn shutdown(&self) {
        self.tasks.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = DeviceId::from("1");

        scheduler.schedule(
            &id,
            TimerKind::UnlatchReset,
            Duration::from_millis(1500),
            counter_task(&fired),
        );
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending(&id, TimerKind::UnlatchReset));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&id, TimerKind::UnlatchReset));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_timer() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = DeviceId::from("1");

        scheduler.schedule(
            &id,
            TimerKind::RtoDeactivation,
            Duration::from_secs(10),
            counter_task(&fired),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.schedule(
            &id,
            TimerKind::RtoDeactivation,
            Duration::from_secs(10),
            counter_task(&fired),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = DeviceId::from("1");

        scheduler.schedule(
            &id,
            TimerKind::RtoDeactivation,
            Duration::from_secs(3),
            counter_task(&fired),
        );
        assert!(scheduler.cancel(&id, TimerKind::RtoDeactivation));
        assert!(!scheduler.cancel(&id, TimerKind::RtoDeactivation));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_and_devices_are_independent() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let a = DeviceId::from("a");
        let b = DeviceId::from("b");

        scheduler.schedule(
            &a,
            TimerKind::UnlatchReset,
            Duration::from_secs(1),
            counter_task(&fired),
        );
        scheduler.schedule(
            &a,
            TimerKind::RtoDeactivation,
            Duration::from_secs(1),
            counter_task(&fired),
        );
        scheduler.schedule(
            &b,
            TimerKind::UnlatchReset,
            Duration::from_secs(1),
            counter_task(&fired),
        );
        scheduler.cancel_device(&a);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
