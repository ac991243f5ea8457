//! Relay infrastructure for the log hub

pub use relay_core as core;
pub use relay_core::{FanoutRelay, RelayConfig, RelayServer};
