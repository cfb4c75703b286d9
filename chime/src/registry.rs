use std::collections::{HashMap, hash_map::Entry};

use crate::{
    client::DeviceDescriptor,
    device::{Device, DeviceId},
};

/// Idempotent device registry keyed by composite identity.
///
/// Devices are created on first poll sighting and live for the process
/// lifetime unless explicitly removed by an unpair request. Descriptor
/// fields (name, model) are frozen at creation; later polls only feed
/// property values.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Returns the device for the descriptor's identity, creating it if
    /// unseen. The flag is `true` iff the device was just created.
    pub fn upsert(&mut self, descriptor: &DeviceDescriptor) -> (&mut Device, bool) {
        match self.devices.entry(descriptor.id()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(Device::from_descriptor(descriptor)), true),
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<Device> {
        self.devices.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
