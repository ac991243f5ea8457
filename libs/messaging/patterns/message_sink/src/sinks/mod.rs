//! Delivery strategies for [`crate::BatchingSink`]
//!
//! - **RemoteDispatch**: sends batches to a remote relay over a
//!   [`crate::ConnectionManager`]
//! - **DirectDispatch**: pushes batches straight into an in-process
//!   [`relay_core::FanoutRelay`]

pub mod direct;
pub mod relay;

pub use direct::DirectDispatch;
pub use relay::{RemoteDispatch, SendMode};
