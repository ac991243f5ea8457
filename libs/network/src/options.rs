use std::time::Duration;

pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Session timing and buffering knobs
///
/// The server timeout should be at least twice the peer's keep-alive
/// interval, otherwise an idle but healthy session is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Close the session when nothing arrives for this long
    pub server_timeout: Duration,
    /// Upper bound on the opening handshake
    pub handshake_timeout: Duration,
    /// How often a ping is sent to the peer
    pub keep_alive_interval: Duration,
    /// Outbound frames queued before `send` starts waiting
    pub outbound_buffer: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl TransportOptions {
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }
}
