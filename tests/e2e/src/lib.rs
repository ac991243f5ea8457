//! End-to-End Test Framework for the log hub
//!
//! Runs real relays on loopback ports and drives them with shipping sinks
//! and viewer connections over WebSocket.

pub mod fixtures;
pub mod framework;
pub mod scenarios;

pub use fixtures::*;
pub use framework::{TestFramework, TestResult, TestScenario};
pub use scenarios::*;
