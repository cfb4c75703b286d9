use core::fmt::{self, Display};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The fixed set of properties a device can expose to the host framework.
///
/// The host-facing string form is camelCase (`lowBattery`, `streamActive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyName {
    Motion,
    Ding,
    Battery,
    LowBattery,
    Light,
    Siren,
    StreamActive,
    Video,
}

impl PropertyName {
    pub const fn as_str(self) -> &'static str {
        match self {
            PropertyName::Motion => "motion",
            PropertyName::Ding => "ding",
            PropertyName::Battery => "battery",
            PropertyName::LowBattery => "lowBattery",
            PropertyName::Light => "light",
            PropertyName::Siren => "siren",
            PropertyName::StreamActive => "streamActive",
            PropertyName::Video => "video",
        }
    }

    pub(crate) fn template(self) -> Property {
        use PropertyKind::{Boolean, BoundedInt, Opaque};

        let (kind, read_only, ephemeral, value) = match self {
            PropertyName::Motion => (Boolean, true, true, Value::Bool(false)),
            PropertyName::Ding => (Boolean, true, true, Value::Bool(false)),
            PropertyName::Battery => (BoundedInt { min: 0, max: 100 }, true, false, Value::Int(0)),
            PropertyName::LowBattery => (Boolean, true, false, Value::Bool(false)),
            PropertyName::Light => (Boolean, false, false, Value::Bool(false)),
            PropertyName::Siren => (Boolean, false, false, Value::Bool(false)),
            PropertyName::StreamActive => (Boolean, true, false, Value::Bool(false)),
            PropertyName::Video => (Opaque, true, false, Value::Text(String::new())),
        };

        Property { name: self, kind, value, read_only, ephemeral, origin: Origin::RemotePoll }
    }
}

impl Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value as cached locally and delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

/// Provenance of a property write, used to arbitrate conflicting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    RemotePoll,
    LocalWrite,
    SchedulerReset,
}

/// The shape of a property, carrying its normalization rule as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Any input is coerced to a strict boolean.
    Boolean,
    /// Input is rounded to the nearest integer, then clamped to the bounds.
    BoundedInt { min: i64, max: i64 },
    /// Stored verbatim.
    Opaque,
}

impl PropertyKind {
    pub fn normalize(self, property: PropertyName, value: Value) -> Result<Value> {
        match self {
            PropertyKind::Boolean => Ok(Value::Bool(value.truthy())),
            PropertyKind::BoundedInt { min, max } => {
                let Some(number) = value.as_number() else {
                    return Err(Error::InvalidValue { property, value });
                };
                Ok(Value::Int((number.round() as i64).clamp(min, max)))
            }
            PropertyKind::Opaque => Ok(value),
        }
    }
}

/// One property of one device. Mutated only through [`PropertyStore::set`].
#[derive(Debug, Clone)]
pub struct Property {
    name: PropertyName,
    kind: PropertyKind,
    value: Value,
    read_only: bool,
    ephemeral: bool,
    origin: Origin,
}

impl Property {
    pub fn name(&self) -> PropertyName {
        self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the true state is momentary and self-clears (motion, ding).
    pub fn ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

/// Per-device property cache. Sole owner of the device's [`Property`] set.
#[derive(Debug, Default)]
pub struct PropertyStore {
    properties: BTreeMap<PropertyName, Property>,
}

impl PropertyStore {
    pub(crate) fn insert_template(&mut self, name: PropertyName) {
        self.properties.entry(name).or_insert_with(|| name.template());
    }

    pub fn get(&self, name: PropertyName) -> Option<&Property> {
        self.properties.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Normalizes `value` and stores it, returning `true` iff the normalized
    /// value differs from the cached one. Local writes to read-only
    /// properties are rejected with the cache untouched.
    pub fn set(&mut self, name: PropertyName, value: Value, origin: Origin) -> Result<bool> {
        let property = self
            .properties
            .get_mut(&name)
            .ok_or(Error::UnknownProperty(name))?;

        if property.read_only && origin == Origin::LocalWrite {
            return Err(Error::ReadOnly(name));
        }

        let value = property.kind.normalize(name, value)?;

        if property.value == value {
            return Ok(false);
        }

        property.value = value;
        property.origin = origin;

        Ok(true)
    }
}
