use std::sync::Arc;

pub mod args;
pub mod config;
pub mod daemon;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod logging;
pub mod relay;
pub mod rotation;
pub mod stats;
pub mod threads;

pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::UdpStatsRelay;
pub use stats::{StatsSnapshot, StatsTable};

/// Build and start a relay for `config`.
pub fn start(config: RelayConfig) -> Result<UdpStatsRelay, RelayError> {
    let mut relay = UdpStatsRelay::new(Arc::new(config));
    relay.start()?;
    Ok(relay)
}
