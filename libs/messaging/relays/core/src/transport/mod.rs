//! Transport adapters that attach client sessions to a [`crate::FanoutRelay`]

pub mod local;

pub use local::LocalTransport;
