pub mod batch;
pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod layer;
pub mod scheduler;
pub mod sinks;
pub mod test_utils;

pub use batch::{BatchingSink, FlushResult, GroupDispatch};
pub use builder::{ShippingSink, SinkBuilder};
pub use config::SinkConfig;
pub use connection::{
    ConnectionManager, ConnectionObserver, ConnectionOptions, ConnectionState, ConnectionStatus,
    HandlerError, NoopObserver, RetryOutcome, StartTimeout, Subscription, TracingObserver,
    DEFAULT_RETRY_DELAY,
};
pub use error::{ConnectionError, SinkError};
pub use layer::{level_from_tracing, LogShippingLayer, SOURCE_CONTEXT_PROPERTY};
pub use scheduler::{
    BatchOptions, BatchScheduler, SchedulerStats, SinkHandle, DEFAULT_BATCH_POSTING_LIMIT,
    DEFAULT_CLIENT_PERIOD, DEFAULT_LOCAL_PERIOD, DEFAULT_QUEUE_CAPACITY, MIN_PERIOD,
};
pub use sinks::{DirectDispatch, RemoteDispatch, SendMode};

// Wire and domain types callers need alongside the sink API
pub use loghub_codec::HubFrame;
pub use loghub_network::{HubTransport, TransportError, TransportOptions, WsTransport};
pub use loghub_types::{GroupSet, GroupTemplate, Level, LogEvent, LogMessage};
