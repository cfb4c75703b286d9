use core::future::Future;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::{
    device::{Capability, DeviceId},
    property::PropertyName,
};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status code {0}")]
    Status(u16),
    #[error("bad payload: {0}")]
    Payload(String),
    #[error("request timed out")]
    TimedOut,
}

/// One device as reported by a full-state poll.
///
/// The optional state fields double as capability evidence: an adapter only
/// fills in what the remote side actually reports.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub kind: String,
    pub external_id: u64,
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    pub battery_level: Option<i64>,
    pub light_on: Option<bool>,
    pub siren_on: Option<bool>,
}

impl DeviceDescriptor {
    pub fn id(&self) -> DeviceId {
        DeviceId::new(self.kind.clone(), self.external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Motion,
    Ding,
}

impl ActivityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Motion => "motion",
            ActivityKind::Ding => "ding",
        }
    }

    pub(crate) fn property(self) -> PropertyName {
        match self {
            ActivityKind::Motion => PropertyName::Motion,
            ActivityKind::Ding => PropertyName::Ding,
        }
    }
}

/// A short-lived activity report (doorbell press, motion detection).
/// Consumed immediately by the engine, never retained.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    /// Monotonically increasing sequence id assigned by the remote side.
    pub id: u64,
    pub kind: ActivityKind,
    pub device_kind: String,
    pub external_id: u64,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.device_kind.clone(), self.external_id)
    }
}

/// The remote cloud collaborator. Every operation is fallible and
/// latency-bearing; the engine never calls any of them on its own task.
pub trait CloudClient: Send + Sync + 'static {
    fn list_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ClientError>> + Send;

    fn list_activity(&self)
    -> impl Future<Output = Result<Vec<ActivityEvent>, ClientError>> + Send;

    fn set_capability(
        &self,
        external_id: u64,
        capability: Capability,
        on: bool,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

impl<C: CloudClient> CloudClient for std::sync::Arc<C> {
    fn list_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ClientError>> + Send {
        (**self).list_devices()
    }

    fn list_activity(
        &self,
    ) -> impl Future<Output = Result<Vec<ActivityEvent>, ClientError>> + Send {
        (**self).list_activity()
    }

    fn set_capability(
        &self,
        external_id: u64,
        capability: Capability,
        on: bool,
    ) -> impl Future<Output = Result<(), ClientError>> + Send {
        (**self).set_capability(external_id, capability, on)
    }
}
