use std::collections::BTreeSet;

use chime::{ActivityEvent, ActivityKind, Capability, ClientError, CloudClient, DeviceDescriptor};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const DEFAULT_API_BASE: &str = "https://api.ring.com";

const API_VERSION: &str = "11";

/// Ring cloud API client. Token acquisition and refresh are the caller's
/// problem; this client only spends a bearer token it was given.
pub struct RingClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl RingClient {
    pub fn new(base: &str, token: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;

        Ok(Self { http, base: base.trim_end_matches('/').to_string(), token: token.to_string() })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .bearer_auth(&self.token)
            .query(&[("api_version", API_VERSION)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Payload(e.to_string()))
    }

    async fn put(&self, path: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .put(format!("{}{path}", self.base))
            .bearer_auth(&self.token)
            .query(&[("api_version", API_VERSION)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        Ok(())
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::TimedOut
    } else {
        ClientError::Transport(e.to_string())
    }
}

impl CloudClient for RingClient {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, ClientError> {
        let response: DevicesResponse = self.get_json("/clients_api/ring_devices").await?;

        let mut descriptors = Vec::new();
        for wire in response.doorbots {
            descriptors.push(wire.into_descriptor(Family::Doorbot));
        }
        for wire in response.stickup_cams {
            descriptors.push(wire.into_descriptor(Family::StickupCam));
        }

        Ok(descriptors)
    }

    async fn list_activity(&self) -> Result<Vec<ActivityEvent>, ClientError> {
        let dings: Vec<WireDing> = self.get_json("/clients_api/dings/active").await?;

        Ok(dings.into_iter().filter_map(WireDing::into_event).collect())
    }

    async fn set_capability(
        &self,
        external_id: u64,
        capability: Capability,
        on: bool,
    ) -> Result<(), ClientError> {
        let action = match (capability, on) {
            (Capability::Light, true) => "floodlight_light_on",
            (Capability::Light, false) => "floodlight_light_off",
            (Capability::Siren, true) => "siren_on",
            (Capability::Siren, false) => "siren_off",
            _ => {
                return Err(ClientError::Payload(format!(
                    "capability {capability:?} is not remotely settable"
                )));
            }
        };

        self.put(&format!("/clients_api/doorbots/{external_id}/{action}"))
            .await
    }
}

#[derive(Debug, Clone, Copy)]
enum Family {
    Doorbot,
    StickupCam,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    doorbots: Vec<WireDevice>,
    #[serde(default)]
    stickup_cams: Vec<WireDevice>,
}

#[derive(Debug, Deserialize)]
struct WireDevice {
    id: u64,
    description: String,
    kind: String,
    /// Number or numeric string, depending on device firmware.
    #[serde(default)]
    battery_life: Option<serde_json::Value>,
    /// `"on"` / `"off"`, only present on devices with a floodlight.
    #[serde(default)]
    led_status: Option<String>,
    #[serde(default)]
    siren_status: Option<SirenStatus>,
}

#[derive(Debug, Deserialize)]
struct SirenStatus {
    #[serde(default)]
    seconds_remaining: u64,
}

impl WireDevice {
    fn into_descriptor(self, family: Family) -> DeviceDescriptor {
        let mut capabilities = BTreeSet::from([Capability::Motion, Capability::Video]);
        if let Family::Doorbot = family {
            capabilities.insert(Capability::Ding);
        }

        let battery_level = self.battery_life.as_ref().and_then(parse_battery);
        if battery_level.is_some() {
            capabilities.insert(Capability::Battery);
        }

        let light_on = self.led_status.as_deref().map(|status| status == "on");
        if light_on.is_some() {
            capabilities.insert(Capability::Light);
        }

        let siren_on = self.siren_status.as_ref().map(|siren| siren.seconds_remaining > 0);
        if siren_on.is_some() {
            capabilities.insert(Capability::Siren);
        }

        DeviceDescriptor {
            kind: self.kind,
            external_id: self.id,
            name: self.description,
            capabilities,
            battery_level,
            light_on,
            siren_on,
        }
    }
}

fn parse_battery(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().map(|x| x.round() as i64))
        }
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct WireDing {
    id: u64,
    doorbot_id: u64,
    device_kind: String,
    kind: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl WireDing {
    fn into_event(self) -> Option<ActivityEvent> {
        let kind = match self.kind.as_str() {
            "ding" => ActivityKind::Ding,
            "motion" => ActivityKind::Motion,
            other => {
                tracing::debug!(kind = other, "ignoring unsupported activity kind");
                return None;
            }
        };

        Some(ActivityEvent {
            id: self.id,
            kind,
            device_kind: self.device_kind,
            external_id: self.doorbot_id,
            created_at: self.created_at,
        })
    }
}
