//! Assembling a sink from configuration
//!
//! A remote sink wires `WsTransport -> ConnectionManager -> RemoteDispatch`
//! under a [`BatchingSink`] and starts connecting in the background, so the
//! application can log before the relay is reachable. An in-process sink
//! feeds a [`FanoutRelay`] directly.

use crate::{
    BatchScheduler, BatchingSink, ConnectionManager, ConnectionObserver, DirectDispatch,
    GroupDispatch, RemoteDispatch, SchedulerStats, SendMode, SinkConfig, SinkError, SinkHandle,
};
use loghub_network::{HubTransport, WsTransport};
use relay_core::FanoutRelay;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A running sink: the producer handle plus what keeps it going
#[derive(Debug)]
pub struct ShippingSink {
    handle: SinkHandle,
    scheduler: BatchScheduler,
    connection: Option<ConnectionManager>,
}

impl ShippingSink {
    /// A producer handle; clone it freely
    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// The relay connection, for remote sinks
    pub fn connection(&self) -> Option<&ConnectionManager> {
        self.connection.as_ref()
    }

    /// Flush buffered events, then close the relay connection
    pub async fn shutdown(self) -> SchedulerStats {
        let Self {
            handle,
            scheduler,
            connection,
        } = self;
        drop(handle);

        let stats = scheduler.shutdown().await;
        if let Some(connection) = connection {
            if let Err(e) = connection.stop(&CancellationToken::new()).await {
                debug!(error = %e, "Relay connection did not close cleanly");
            }
        }
        stats
    }
}

pub struct SinkBuilder {
    config: SinkConfig,
    mode: SendMode,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl SinkBuilder {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            mode: SendMode::Group,
            observer: None,
        }
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ship to the configured relay over WebSocket
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect(self) -> Result<ShippingSink, SinkError> {
        self.config.validate()?;
        let url = self.config.resolve_url()?;
        let transport = WsTransport::new(&url, self.config.transport_options())
            .map_err(|e| SinkError::invalid_config(e.to_string()))?;
        self.connect_with(Arc::new(transport))
    }

    /// Ship over an already built transport
    pub fn connect_with(self, transport: Arc<dyn HubTransport>) -> Result<ShippingSink, SinkError> {
        self.config.validate()?;

        let mut options = self.config.connection_options();
        if let Some(observer) = self.observer {
            options.observer = observer;
        }
        let connection = ConnectionManager::with_options(transport, options);
        let dispatch = RemoteDispatch::new(connection.clone()).with_mode(self.mode);

        let sink = Self::spawn(&self.config, Arc::new(dispatch), false)?;
        connection.start_in_background();
        info!(endpoint = %connection.endpoint(), "Log shipping sink started");

        Ok(ShippingSink {
            connection: Some(connection),
            ..sink
        })
    }

    /// Feed an in-process relay
    pub fn in_process(self, relay: FanoutRelay) -> Result<ShippingSink, SinkError> {
        self.config.validate()?;
        let sink = Self::spawn(&self.config, Arc::new(DirectDispatch::new(relay)), true)?;
        info!("In-process log shipping sink started");
        Ok(sink)
    }

    fn spawn(
        config: &SinkConfig,
        dispatch: Arc<dyn GroupDispatch>,
        in_process: bool,
    ) -> Result<ShippingSink, SinkError> {
        let sink = BatchingSink::new(config.group_set()?, dispatch);
        let (handle, scheduler) = BatchScheduler::spawn(sink, config.batch_options(in_process));
        Ok(ShippingSink {
            handle: handle.restricted_to_minimum_level(config.minimum_level),
            scheduler,
            connection: None,
        })
    }
}

impl std::fmt::Debug for SinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkBuilder")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
