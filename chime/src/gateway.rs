use crate::{
    device::{Device, DeviceId},
    property::Property,
};

/// The host framework's notification surface.
///
/// Callbacks are invoked from the engine's event loop and must not block;
/// implementations typically hand the notification off to a channel.
pub trait Gateway: Send + Sync + 'static {
    /// A device identity was seen for the first time. Called exactly once
    /// per identity for the process lifetime.
    fn device_added(&self, device: &Device);

    /// A device was unpaired on request.
    fn device_removed(&self, device: &DeviceId);

    /// A property's cached value changed. Called exactly once per distinct
    /// value transition.
    fn property_changed(&self, device: &Device, property: &Property);

    /// A transient event (activity, write failure) for the host's event
    /// stream.
    fn event_fired(&self, device: &DeviceId, event: &str, payload: serde_json::Value);
}

impl<G: Gateway> Gateway for std::sync::Arc<G> {
    fn device_added(&self, device: &Device) {
        (**self).device_added(device);
    }

    fn device_removed(&self, device: &DeviceId) {
        (**self).device_removed(device);
    }

    fn property_changed(&self, device: &Device, property: &Property) {
        (**self).property_changed(device, property);
    }

    fn event_fired(&self, device: &DeviceId, event: &str, payload: serde_json::Value) {
        (**self).event_fired(device, event, payload);
    }
}
