use std::collections::HashMap;

use crate::{
    device::DeviceId,
    property::{PropertyName, Value},
};

/// Identifies one in-flight local write. A completion carrying a stale
/// token belongs to a superseded write and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteToken(u64);

/// An outstanding local write awaiting remote confirmation.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub token: WriteToken,
    /// The normalized value the local side wants.
    pub target: Value,
    /// The cached value from before the optimistic write, for rollback.
    pub prior: Value,
}

/// Suppression table for in-flight local writes.
///
/// While a write is pending for a (device, property) pair, remote-origin
/// deltas for that pair are dropped so a slow poll cannot overwrite a value
/// the local side just set. At most one pending write per pair; a new one
/// supersedes the old.
#[derive(Debug, Default)]
pub struct WriteGuard {
    pending: HashMap<(DeviceId, PropertyName), PendingWrite>,
    next_token: u64,
}

impl WriteGuard {
    /// Opens a suppression window for the pair, superseding any
    /// outstanding write (whose eventual completion will no longer match).
    pub fn begin(
        &mut self,
        device: DeviceId,
        property: PropertyName,
        target: Value,
        prior: Value,
    ) -> WriteToken {
        self.next_token += 1;
        let token = WriteToken(self.next_token);

        self.pending.insert((device, property), PendingWrite { token, target, prior });

        token
    }

    pub fn is_suppressed(&self, device: &DeviceId, property: PropertyName) -> bool {
        self.pending.contains_key(&(device.clone(), property))
    }

    pub fn pending(&self, device: &DeviceId, property: PropertyName) -> Option<&PendingWrite> {
        self.pending.get(&(device.clone(), property))
    }

    /// Closes the window if `token` still identifies the outstanding write.
    /// Returns `None` for a stale token (the write was superseded).
    pub fn resolve(
        &mut self,
        device: &DeviceId,
        property: PropertyName,
        token: WriteToken,
    ) -> Option<PendingWrite> {
        let key = (device.clone(), property);

        match self.pending.get(&key) {
            Some(pending) if pending.token == token => self.pending.remove(&key),
            _ => None,
        }
    }

    /// Drops every pending write for the device (used on device removal).
    pub fn clear_device(&mut self, device: &DeviceId) {
        self.pending.retain(|(id, _), _| id != device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doorbell() -> DeviceId {
        DeviceId::new("doorbell_v3", 1)
    }

    #[test]
    fn suppresses_while_pending() {
        let mut guard = WriteGuard::default();
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Light));

        let token =
            guard.begin(doorbell(), PropertyName::Light, Value::Bool(true), Value::Bool(false));
        assert!(guard.is_suppressed(&doorbell(), PropertyName::Light));
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Siren));

        let pending = guard.resolve(&doorbell(), PropertyName::Light, token).unwrap();
        assert_eq!(pending.target, Value::Bool(true));
        assert_eq!(pending.prior, Value::Bool(false));
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Light));
    }

    #[test]
    fn superseding_write_invalidates_the_prior_token() {
        let mut guard = WriteGuard::default();

        let first =
            guard.begin(doorbell(), PropertyName::Light, Value::Bool(true), Value::Bool(false));
        let second =
            guard.begin(doorbell(), PropertyName::Light, Value::Bool(false), Value::Bool(true));

        assert!(guard.resolve(&doorbell(), PropertyName::Light, first).is_none());
        assert!(guard.is_suppressed(&doorbell(), PropertyName::Light));

        assert!(guard.resolve(&doorbell(), PropertyName::Light, second).is_some());
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Light));
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let mut guard = WriteGuard::default();

        let token =
            guard.begin(doorbell(), PropertyName::Siren, Value::Bool(true), Value::Bool(false));
        assert!(guard.resolve(&doorbell(), PropertyName::Siren, token).is_some());
        assert!(guard.resolve(&doorbell(), PropertyName::Siren, token).is_none());
    }

    #[test]
    fn clear_device_drops_all_pairs() {
        let mut guard = WriteGuard::default();
        let other = DeviceId::new("stickup_cam", 2);

        guard.begin(doorbell(), PropertyName::Light, Value::Bool(true), Value::Bool(false));
        guard.begin(doorbell(), PropertyName::Siren, Value::Bool(true), Value::Bool(false));
        guard.begin(other.clone(), PropertyName::Light, Value::Bool(true), Value::Bool(false));

        guard.clear_device(&doorbell());
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Light));
        assert!(!guard.is_suppressed(&doorbell(), PropertyName::Siren));
        assert!(guard.is_suppressed(&other, PropertyName::Light));
    }
}
