use std::time::Duration;

use anyhow::Context as _;
use chime::{Config, Device, DeviceId, Gateway, Property, SyncEngine};
use chime_ring::RingClient;
use clap::Parser;

#[derive(Parser)]
struct Args {
    /// Ring API bearer token
    #[arg(long, env = "RING_TOKEN")]
    token: String,

    /// Ring API base URL
    #[arg(long, default_value = chime_ring::DEFAULT_API_BASE)]
    api_base: String,

    /// Device state poll interval in seconds
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Activity poll interval in seconds
    #[arg(long, default_value_t = 10)]
    activity_interval: u64,

    /// Seconds before an ephemeral property (motion, ding) clears itself
    #[arg(long, default_value_t = 18)]
    reset_delay: u64,

    /// Seconds to wait for remote confirmation of a local write
    #[arg(long, default_value_t = 10)]
    write_timeout: u64,
}

/// Gateway that writes every host notification to the log. Stands in for a
/// real host framework integration.
struct LogGateway;

impl Gateway for LogGateway {
    fn device_added(&self, device: &Device) {
        tracing::info!(id = %device.id(), name = device.name(), model = device.model(), "device added");
    }

    fn device_removed(&self, device: &DeviceId) {
        tracing::info!(id = %device, "device removed");
    }

    fn property_changed(&self, device: &Device, property: &Property) {
        tracing::info!(
            id = %device.id(),
            property = %property.name(),
            value = ?property.value(),
            "property changed"
        );
    }

    fn event_fired(&self, device: &DeviceId, event: &str, payload: serde_json::Value) {
        tracing::info!(id = %device, event, %payload, "event");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chime::log::init();

    let args = Args::parse();

    let client =
        RingClient::new(&args.api_base, &args.token).context("failed to build ring client")?;

    let config = Config {
        device_poll_interval: Duration::from_secs(args.poll_interval),
        activity_poll_interval: Duration::from_secs(args.activity_interval),
        reset_delay: Duration::from_secs(args.reset_delay),
        write_timeout: Duration::from_secs(args.write_timeout),
    };

    let (engine, _handle) =
        SyncEngine::new(client, LogGateway, config).context("invalid configuration")?;

    engine.run().await;

    Ok(())
}
