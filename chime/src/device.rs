use core::fmt::{self, Display};
use std::collections::BTreeSet;

use crate::{
    client::DeviceDescriptor,
    property::{PropertyName, PropertyStore},
};

/// Prefix of the composite device identifier exposed to the host framework.
pub const ID_PREFIX: &str = "chime";

/// Composite device identity: remote device kind plus remote numeric id.
///
/// Rendered as `chime-<kind>-<external-id>`, stable for the process
/// lifetime, and the sole join key between poll results, activity events,
/// and registered devices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    kind: String,
    external_id: u64,
}

impl DeviceId {
    pub fn new(kind: impl Into<String>, external_id: u64) -> Self {
        Self { kind: kind.into(), external_id }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn external_id(&self) -> u64 {
        self.external_id
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_PREFIX}-{}-{}", self.kind, self.external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Motion,
    Ding,
    Light,
    Siren,
    Battery,
    Video,
}

impl Capability {
    /// The properties a device gains by having this capability.
    pub(crate) fn properties(self) -> &'static [PropertyName] {
        match self {
            Capability::Motion => &[PropertyName::Motion],
            Capability::Ding => &[PropertyName::Ding],
            Capability::Light => &[PropertyName::Light],
            Capability::Siren => &[PropertyName::Siren],
            Capability::Battery => &[PropertyName::Battery, PropertyName::LowBattery],
            Capability::Video => &[PropertyName::StreamActive, PropertyName::Video],
        }
    }

    /// The capability a local write to `property` acts on, if any.
    pub(crate) fn for_write(property: PropertyName) -> Option<Capability> {
        match property {
            PropertyName::Light => Some(Capability::Light),
            PropertyName::Siren => Some(Capability::Siren),
            _ => None,
        }
    }
}

/// A registered device: identity, descriptor fields frozen at first
/// sighting, and the property cache. Composed from the capability set, no
/// subtype hierarchy.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    name: String,
    model: String,
    capabilities: BTreeSet<Capability>,
    properties: PropertyStore,
}

impl Device {
    pub(crate) fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        let mut properties = PropertyStore::default();
        for capability in &descriptor.capabilities {
            for name in capability.properties() {
                properties.insert_template(*name);
            }
        }

        Self {
            id: descriptor.id(),
            name: descriptor.name.clone(),
            model: descriptor.kind.clone(),
            capabilities: descriptor.capabilities.clone(),
            properties,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(DeviceId::new("doorbell_v3", 12345).to_string(), "chime-doorbell_v3-12345");
    }

    #[test]
    fn capabilities_determine_property_set() {
        let descriptor = DeviceDescriptor {
            kind: "doorbell_v3".to_string(),
            external_id: 1,
            name: "Front Door".to_string(),
            capabilities: BTreeSet::from([Capability::Ding, Capability::Battery]),
            battery_level: Some(80),
            light_on: None,
            siren_on: None,
        };

        let device = Device::from_descriptor(&descriptor);

        assert!(device.properties().get(PropertyName::Ding).is_some());
        assert!(device.properties().get(PropertyName::Battery).is_some());
        assert!(device.properties().get(PropertyName::LowBattery).is_some());
        assert!(device.properties().get(PropertyName::Light).is_none());
        assert!(device.properties().get(PropertyName::Siren).is_none());
    }
}
