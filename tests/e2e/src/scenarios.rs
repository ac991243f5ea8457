//! End-to-end test scenarios

pub mod relay_restart;
pub mod sink_to_viewer;

pub use relay_restart::RelayRestartTest;
pub use sink_to_viewer::SinkToViewerTest;
