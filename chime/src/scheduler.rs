use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{device::DeviceId, property::PropertyName};

#[derive(Debug)]
struct Fired {
    device: DeviceId,
    property: PropertyName,
    generation: u64,
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Auto-clear timer registry for ephemeral properties.
///
/// At most one timer per (device, property) pair: arming a pair that
/// already has one aborts and replaces it, restarting the countdown. Each
/// timer carries a generation token so a firing that raced its own
/// replacement is discarded in [`ResetScheduler::fired`].
#[derive(Debug)]
pub struct ResetScheduler {
    timers: HashMap<(DeviceId, PropertyName), Timer>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<Fired>,
    rx: mpsc::UnboundedReceiver<Fired>,
}

impl ResetScheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { timers: HashMap::new(), next_generation: 0, tx, rx }
    }

    /// Schedules a reset for the pair after `delay`, replacing any timer
    /// already armed for it.
    pub fn arm(&mut self, device: DeviceId, property: PropertyName, delay: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;

        let handle = tokio::spawn({
            let tx = self.tx.clone();
            let device = device.clone();

            async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Fired { device, property, generation });
            }
        });

        if let Some(replaced) = self.timers.insert((device, property), Timer { generation, handle })
        {
            replaced.handle.abort();
        }
    }

    pub fn cancel(&mut self, device: &DeviceId, property: PropertyName) {
        if let Some(timer) = self.timers.remove(&(device.clone(), property)) {
            timer.handle.abort();
        }
    }

    /// Cancels every timer for the device (used on device removal).
    pub fn cancel_all(&mut self, device: &DeviceId) {
        self.timers.retain(|(id, _), timer| {
            if id == device {
                timer.handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn is_armed(&self, device: &DeviceId, property: PropertyName) -> bool {
        self.timers.contains_key(&(device.clone(), property))
    }

    /// Resolves with the next pair whose timer fired and is still current.
    /// Firings from superseded timers are silently dropped. Pends forever
    /// while nothing is armed.
    pub async fn fired(&mut self) -> (DeviceId, PropertyName) {
        loop {
            let Some(fired) = self.rx.recv().await else {
                // both channel ends live in this struct, so the sender
                // cannot drop while we hold &mut self
                return std::future::pending().await;
            };
            let key = (fired.device, fired.property);

            match self.timers.get(&key) {
                Some(timer) if timer.generation == fired.generation => {
                    self.timers.remove(&key);
                    return key;
                }
                _ => continue,
            }
        }
    }
}

impl Default for ResetScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt as _;
    use tokio::time::advance;

    use super::*;

    fn doorbell() -> DeviceId {
        DeviceId::new("doorbell_v3", 1)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_configured_delay() {
        let mut scheduler = ResetScheduler::new();
        scheduler.arm(doorbell(), PropertyName::Ding, Duration::from_secs(18));

        advance(Duration::from_secs(17)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.fired().now_or_never().is_none());

        advance(Duration::from_secs(1)).await;
        let (device, property) = scheduler.fired().await;
        assert_eq!(device, doorbell());
        assert_eq!(property, PropertyName::Ding);
        assert!(!scheduler.is_armed(&doorbell(), PropertyName::Ding));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_countdown() {
        let mut scheduler = ResetScheduler::new();
        scheduler.arm(doorbell(), PropertyName::Ding, Duration::from_secs(18));

        advance(Duration::from_secs(5)).await;
        scheduler.arm(doorbell(), PropertyName::Ding, Duration::from_secs(18));

        // past the original deadline, before the new one
        advance(Duration::from_secs(17)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.fired().now_or_never().is_none());

        advance(Duration::from_secs(1)).await;
        let (_, property) = scheduler.fired().await;
        assert_eq!(property, PropertyName::Ding);
    }

    #[tokio::test(start_paused = true)]
    async fn late_firing_from_a_replaced_timer_is_discarded() {
        let mut scheduler = ResetScheduler::new();
        scheduler.arm(doorbell(), PropertyName::Motion, Duration::from_secs(1));

        // let the first timer deliver before it is replaced
        advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        scheduler.arm(doorbell(), PropertyName::Motion, Duration::from_secs(5));
        tokio::task::yield_now().await;
        assert!(scheduler.fired().now_or_never().is_none());

        advance(Duration::from_secs(5)).await;
        let (device, _) = scheduler.fired().await;
        assert_eq!(device, doorbell());
        assert!(!scheduler.is_armed(&doorbell(), PropertyName::Motion));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_every_timer_for_the_device() {
        let mut scheduler = ResetScheduler::new();
        let other = DeviceId::new("stickup_cam", 2);

        scheduler.arm(doorbell(), PropertyName::Ding, Duration::from_secs(1));
        scheduler.arm(doorbell(), PropertyName::Motion, Duration::from_secs(1));
        scheduler.arm(other.clone(), PropertyName::Motion, Duration::from_secs(1));

        scheduler.cancel_all(&doorbell());
        assert!(!scheduler.is_armed(&doorbell(), PropertyName::Ding));
        assert!(!scheduler.is_armed(&doorbell(), PropertyName::Motion));
        assert!(scheduler.is_armed(&other, PropertyName::Motion));

        advance(Duration::from_secs(1)).await;
        let (device, _) = scheduler.fired().await;
        assert_eq!(device, other);
        tokio::task::yield_now().await;
        assert!(scheduler.fired().now_or_never().is_none());
    }
}
