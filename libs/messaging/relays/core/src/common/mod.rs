//! # Session Plumbing
//!
//! Per-connection handling shared by the relay front ends.

pub mod client;

pub use client::{handle_connection, SessionOptions};
