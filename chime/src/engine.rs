use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

use crate::{
    Error, Result,
    client::{ActivityEvent, ClientError, CloudClient, DeviceDescriptor},
    device::{Capability, DeviceId},
    gateway::Gateway,
    guard::{WriteGuard, WriteToken},
    property::{Origin, PropertyName, Value},
    registry::DeviceRegistry,
    scheduler::ResetScheduler,
};

/// Battery percentage at or below which `lowBattery` is reported.
const LOW_BATTERY_THRESHOLD: i64 = 15;

/// Event name used for the host's write-failure notifications.
const WRITE_FAILED_EVENT: &str = "writeFailed";

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Cadence of the full device-state poll.
    pub device_poll_interval: Duration,
    /// Cadence of the activity poll.
    pub activity_poll_interval: Duration,
    /// How long an ephemeral property stays true without a superseding
    /// event. Long enough to be visibly active in a UI, short enough to
    /// avoid stuck states.
    pub reset_delay: Duration,
    /// How long an unconfirmed local write keeps suppressing remote deltas.
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_poll_interval: Duration::from_secs(60),
            activity_poll_interval: Duration::from_secs(10),
            reset_delay: Duration::from_secs(18),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.device_poll_interval.is_zero() {
            return Err(Error::InvalidConfig("device poll interval must be greater than zero"));
        }
        if self.activity_poll_interval.is_zero() {
            return Err(Error::InvalidConfig("activity poll interval must be greater than zero"));
        }

        Ok(())
    }
}

enum Command {
    DeviceSnapshot(Result<Vec<DeviceDescriptor>, ClientError>),
    Activity(Result<Vec<ActivityEvent>, ClientError>),
    WriteResolved {
        device: DeviceId,
        property: PropertyName,
        token: WriteToken,
        result: Result<(), ClientError>,
    },
    SetProperty {
        device: DeviceId,
        property: PropertyName,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveDevice {
        device: DeviceId,
        reply: oneshot::Sender<Result<()>>,
    },
    Refresh,
}

/// Clonable handle for talking to a running [`SyncEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Requests a local write. Resolves once the engine has accepted (or
    /// synchronously rejected) the write; remote confirmation is reported
    /// asynchronously through the gateway.
    pub async fn set_property(
        &self,
        device: DeviceId,
        property: PropertyName,
        value: Value,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::SetProperty { device, property, value, reply })
            .await
            .map_err(|_| Error::EngineClosed)?;

        rx.await.map_err(|_| Error::EngineClosed)?
    }

    /// Unpairs a device: forgets it, cancels its reset timers, and drops
    /// its pending writes.
    pub async fn remove_device(&self, device: DeviceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveDevice { device, reply })
            .await
            .map_err(|_| Error::EngineClosed)?;

        rx.await.map_err(|_| Error::EngineClosed)?
    }

    /// Triggers an immediate device poll, off-schedule (used when the host
    /// starts pairing).
    pub async fn refresh_devices(&self) -> Result<()> {
        self.tx
            .send(Command::Refresh)
            .await
            .map_err(|_| Error::EngineClosed)
    }
}

/// The synchronization engine. Owns the registry, the suppression table,
/// and the reset timers; every property mutation happens on its event loop,
/// one task at a time, so no two updates of the same property ever race.
pub struct SyncEngine<C, G> {
    client: Arc<C>,
    gateway: Arc<G>,
    config: Config,
    registry: DeviceRegistry,
    guard: WriteGuard,
    scheduler: ResetScheduler,
    commands: mpsc::Receiver<Command>,
    tx: mpsc::Sender<Command>,
    last_activity_id: u64,
}

impl<C: CloudClient, G: Gateway> SyncEngine<C, G> {
    pub fn new(client: C, gateway: G, config: Config) -> Result<(Self, EngineHandle)> {
        config.validate()?;

        let (tx, commands) = mpsc::channel(64);
        let handle = EngineHandle { tx: tx.clone() };

        let engine = Self {
            client: Arc::new(client),
            gateway: Arc::new(gateway),
            config,
            registry: DeviceRegistry::default(),
            guard: WriteGuard::default(),
            scheduler: ResetScheduler::new(),
            commands,
            tx,
            last_activity_id: 0,
        };

        Ok((engine, handle))
    }

    /// Runs the engine event loop. Poll ticks only spawn the fetch; results
    /// come back as commands, so a slow remote call never blocks timer
    /// firings or write completions.
    pub async fn run(mut self) {
        let mut device_poll = tokio::time::interval(self.config.device_poll_interval);
        device_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut activity_poll = tokio::time::interval(self.config.activity_poll_interval);
        activity_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = device_poll.tick() => self.spawn_device_poll(),
                _ = activity_poll.tick() => self.spawn_activity_poll(),
                (device, property) = self.scheduler.fired() => {
                    self.handle_reset(device, property);
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }
    }

    fn spawn_device_poll(&self) {
        let client = self.client.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = client.list_devices().await;
            let _ = tx.send(Command::DeviceSnapshot(result)).await;
        });
    }

    fn spawn_activity_poll(&self) {
        let client = self.client.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = client.list_activity().await;
            let _ = tx.send(Command::Activity(result)).await;
        });
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::DeviceSnapshot(Ok(descriptors)) => self.apply_snapshot(descriptors),
            Command::DeviceSnapshot(Err(e)) => {
                tracing::warn!("device poll failed, skipping tick: {e}");
            }
            Command::Activity(Ok(events)) => self.apply_activity(events),
            Command::Activity(Err(e)) => {
                tracing::warn!("activity poll failed, skipping tick: {e}");
            }
            Command::WriteResolved { device, property, token, result } => {
                self.handle_write_resolved(device, property, token, result);
            }
            Command::SetProperty { device, property, value, reply } => {
                let _ = reply.send(self.handle_local_write(device, property, value));
            }
            Command::RemoveDevice { device, reply } => {
                let _ = reply.send(self.handle_remove(device));
            }
            Command::Refresh => self.spawn_device_poll(),
        }
    }

    fn apply_snapshot(&mut self, descriptors: Vec<DeviceDescriptor>) {
        for descriptor in descriptors {
            let (device, added) = self.registry.upsert(&descriptor);
            let id = device.id().clone();

            if added {
                tracing::info!(device = %id, name = %device.name(), "registered new device");
                self.gateway.device_added(device);
            }

            for (property, value) in project_deltas(&descriptor) {
                self.apply_delta(&id, property, value, Origin::RemotePoll);
            }
        }
    }

    fn apply_activity(&mut self, mut events: Vec<ActivityEvent>) {
        events.sort_by_key(|event| event.id);

        for event in events {
            // the same event can show up on consecutive polls
            if event.id <= self.last_activity_id {
                continue;
            }
            self.last_activity_id = event.id;

            let device = event.device_id();
            if self.registry.get(&device).is_none() {
                tracing::debug!(%device, "discarding activity for unknown device");
                continue;
            }

            let property = event.kind.property();
            tracing::info!(%device, kind = event.kind.as_str(), "device activity");

            self.apply_delta(&device, property, Value::Bool(true), Origin::RemotePoll);
            self.gateway.event_fired(
                &device,
                event.kind.as_str(),
                serde_json::json!({
                    "id": event.id,
                    "createdAt": event.created_at.to_rfc3339(),
                }),
            );

            self.scheduler.arm(device, property, self.config.reset_delay);
        }
    }

    fn handle_reset(&mut self, device: DeviceId, property: PropertyName) {
        tracing::debug!(%device, %property, "clearing ephemeral property");
        self.apply_delta(&device, property, Value::Bool(false), Origin::SchedulerReset);
    }

    fn handle_local_write(
        &mut self,
        device: DeviceId,
        property: PropertyName,
        value: Value,
    ) -> Result<()> {
        let dev = self
            .registry
            .get_mut(&device)
            .ok_or_else(|| Error::UnknownDevice(device.clone()))?;

        let prop = dev
            .properties()
            .get(property)
            .ok_or(Error::UnknownProperty(property))?;
        let prior = prop.value().clone();
        let target = prop.kind().normalize(property, value)?;

        let Some(capability) = Capability::for_write(property) else {
            return Err(Error::ReadOnly(property));
        };

        // optimistic: cache the new value before the remote confirms it
        let changed = dev
            .properties_mut()
            .set(property, target.clone(), Origin::LocalWrite)?;
        if changed {
            self.notify_changed(&device, property);
        }

        let token = self.guard.begin(device.clone(), property, target.clone(), prior);
        tracing::debug!(%device, %property, "local write pending remote confirmation");

        let client = self.client.clone();
        let tx = self.tx.clone();
        let timeout = self.config.write_timeout;
        let external_id = device.external_id();
        let on = target.truthy();

        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(timeout, client.set_capability(external_id, capability, on))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::TimedOut),
                };

            let _ = tx
                .send(Command::WriteResolved { device, property, token, result })
                .await;
        });

        Ok(())
    }

    fn handle_write_resolved(
        &mut self,
        device: DeviceId,
        property: PropertyName,
        token: WriteToken,
        result: Result<(), ClientError>,
    ) {
        let Some(pending) = self.guard.resolve(&device, property, token) else {
            // superseded by a newer write; its own completion handles state
            tracing::debug!(%device, %property, "ignoring completion of superseded write");
            return;
        };

        match result {
            Ok(()) => {
                tracing::debug!(%device, %property, "local write confirmed");
                // write-through of the confirmed value; a no-op unless a
                // reset slipped in between
                self.apply_delta(&device, property, pending.target, Origin::LocalWrite);
            }
            Err(ClientError::TimedOut) => {
                tracing::warn!(%device, %property, "local write unconfirmed within timeout");
                self.notify_write_failed(&device, property, &ClientError::TimedOut);
            }
            Err(e) => {
                tracing::warn!(%device, %property, "local write failed, rolling back: {e}");
                self.apply_delta(&device, property, pending.prior, Origin::LocalWrite);
                self.notify_write_failed(&device, property, &e);
            }
        }
    }

    fn handle_remove(&mut self, device: DeviceId) -> Result<()> {
        if self.registry.remove(&device).is_none() {
            return Err(Error::UnknownDevice(device));
        }

        self.scheduler.cancel_all(&device);
        self.guard.clear_device(&device);

        tracing::info!(%device, "device unpaired");
        self.gateway.device_removed(&device);

        Ok(())
    }

    /// The single funnel for every delta: WriteGuard, then the store, then
    /// the host notification on an actual change.
    fn apply_delta(&mut self, device: &DeviceId, property: PropertyName, value: Value, origin: Origin) {
        if origin != Origin::LocalWrite && self.guard.is_suppressed(device, property) {
            tracing::debug!(%device, %property, "dropping remote delta for in-flight local write");
            return;
        }

        let Some(dev) = self.registry.get_mut(device) else {
            return;
        };

        match dev.properties_mut().set(property, value, origin) {
            Ok(true) => self.notify_changed(device, property),
            Ok(false) => {}
            Err(e) => tracing::debug!(%device, %property, "rejected delta: {e}"),
        }
    }

    fn notify_changed(&self, device: &DeviceId, property: PropertyName) {
        if let Some(dev) = self.registry.get(device)
            && let Some(prop) = dev.properties().get(property)
        {
            self.gateway.property_changed(dev, prop);
        }
    }

    fn notify_write_failed(&self, device: &DeviceId, property: PropertyName, reason: &ClientError) {
        self.gateway.event_fired(
            device,
            WRITE_FAILED_EVENT,
            serde_json::json!({
                "property": property,
                "reason": reason.to_string(),
            }),
        );
    }
}

/// Projects a poll descriptor into property deltas for the known
/// capability properties.
fn project_deltas(descriptor: &DeviceDescriptor) -> Vec<(PropertyName, Value)> {
    let mut deltas = Vec::new();

    if let Some(level) = descriptor.battery_level {
        deltas.push((PropertyName::Battery, Value::Int(level)));
        deltas.push((PropertyName::LowBattery, Value::Bool(level <= LOW_BATTERY_THRESHOLD)));
    }

    if let Some(on) = descriptor.light_on {
        deltas.push((PropertyName::Light, Value::Bool(on)));
    }

    if let Some(on) = descriptor.siren_on {
        deltas.push((PropertyName::Siren, Value::Bool(on)));
    }

    deltas
}
