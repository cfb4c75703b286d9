pub mod client;
pub mod device;
pub mod engine;
pub mod gateway;
pub mod guard;
pub mod log;
pub mod property;
pub mod registry;
pub mod scheduler;

pub use self::{
    client::{ActivityEvent, ActivityKind, ClientError, CloudClient, DeviceDescriptor},
    device::{Capability, Device, DeviceId},
    engine::{Config, EngineHandle, SyncEngine},
    gateway::Gateway,
    property::{Origin, Property, PropertyName, Value},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Synchronous failures of the engine. Remote failures (poll errors, write
/// rejections) are carried by [`ClientError`] and surface as skipped ticks
/// or `writeFailed` gateway events; none of these are fatal, the engine
/// degrades to a stale cache rather than stopping.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("property {0} is read-only")]
    ReadOnly(PropertyName),
    #[error("no such property: {0}")]
    UnknownProperty(PropertyName),
    #[error("value {value:?} is not valid for property {property}")]
    InvalidValue { property: PropertyName, value: Value },
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("sync engine is no longer running")]
    EngineClosed,
}
