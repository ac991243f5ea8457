//! Periodic batching
//!
//! Producers hand events to a [`SinkHandle`]; a [`BatchScheduler`] task
//! buffers them and flushes the buffer through a [`BatchingSink`] every
//! `period`, or as soon as `batch_posting_limit` events are waiting. Whatever
//! is still buffered is flushed when the scheduler shuts down or the last
//! handle is dropped.
//!
//! Emitting never blocks: when the queue is full the event is dropped and
//! counted.

use crate::BatchingSink;
use loghub_types::{Level, LogEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const DEFAULT_BATCH_POSTING_LIMIT: usize = 5;
/// Flush period for sinks shipping to a remote relay
pub const DEFAULT_CLIENT_PERIOD: Duration = Duration::from_secs(1);
/// Flush period for sinks feeding an in-process relay
pub const DEFAULT_LOCAL_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Shortest flush period the scheduler runs with
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Flush as soon as this many events are buffered
    pub batch_posting_limit: usize,
    pub period: Duration,
    /// Events queued between producers and the scheduler
    pub queue_capacity: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            period: DEFAULT_CLIENT_PERIOD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl BatchOptions {
    /// Defaults for a sink feeding an in-process relay
    pub fn in_process() -> Self {
        Self {
            period: DEFAULT_LOCAL_PERIOD,
            ..Self::default()
        }
    }

    pub fn with_batch_posting_limit(mut self, limit: usize) -> Self {
        self.batch_posting_limit = limit;
        self
    }

    /// Periods below [`MIN_PERIOD`] are raised to it
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(MIN_PERIOD);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Producer side of a scheduled sink
#[derive(Debug, Clone)]
pub struct SinkHandle {
    events: mpsc::Sender<LogEvent>,
    minimum_level: Level,
    dropped: Arc<AtomicU64>,
}

impl SinkHandle {
    /// Queue an event for the next flush
    ///
    /// Returns `false` when the event is below the minimum level, the queue
    /// is full, or the scheduler has stopped.
    pub fn emit(&self, event: LogEvent) -> bool {
        if !self.is_enabled(event.level()) {
            return false;
        }
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Ignore events below `level` from this handle on
    pub fn restricted_to_minimum_level(mut self, level: Level) -> Self {
        self.minimum_level = level;
        self
    }

    pub fn minimum_level(&self) -> Level {
        self.minimum_level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.minimum_level
    }

    /// Events rejected because the queue was full or closed
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Counters returned when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub events: u64,
    pub flushes: u64,
    pub batches_dispatched: u64,
    pub batches_failed: u64,
}

/// Background task driving a [`BatchingSink`]
#[derive(Debug)]
pub struct BatchScheduler {
    shutdown: CancellationToken,
    task: JoinHandle<SchedulerStats>,
}

impl BatchScheduler {
    pub fn spawn(sink: BatchingSink, options: BatchOptions) -> (SinkHandle, BatchScheduler) {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(sink, rx, options, shutdown.clone()));

        let handle = SinkHandle {
            events: tx,
            minimum_level: Level::Verbose,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, BatchScheduler { shutdown, task })
    }

    /// Flush whatever is buffered and stop
    pub async fn shutdown(self) -> SchedulerStats {
        self.shutdown.cancel();
        Self::finished(self.task).await
    }

    /// Wait for the scheduler to stop on its own, after every handle is dropped
    pub async fn join(self) -> SchedulerStats {
        Self::finished(self.task).await
    }

    async fn finished(task: JoinHandle<SchedulerStats>) -> SchedulerStats {
        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Batch scheduler task failed; buffered events were lost");
                SchedulerStats::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    sink: BatchingSink,
    mut events: mpsc::Receiver<LogEvent>,
    options: BatchOptions,
    shutdown: CancellationToken,
) -> SchedulerStats {
    let limit = options.batch_posting_limit.max(1);
    // Public fields bypass `with_period`
    let period = options.period.max(MIN_PERIOD);
    let mut stats = SchedulerStats::default();
    let mut buffer = Vec::with_capacity(limit);

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        dispatcher = sink.dispatcher(),
        limit,
        period_ms = period.as_millis() as u64,
        "Batch scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Some(event) => {
                    stats.events += 1;
                    buffer.push(event);
                    if buffer.len() >= limit {
                        flush(&sink, &buffer, &mut stats).await;
                        buffer.clear();
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&sink, &buffer, &mut stats).await;
                    buffer.clear();
                }
            }
        }
    }

    events.close();
    while let Ok(event) = events.try_recv() {
        stats.events += 1;
        buffer.push(event);
    }
    for chunk in buffer.chunks(limit) {
        flush(&sink, chunk, &mut stats).await;
    }

    debug!(
        dispatcher = sink.dispatcher(),
        events = stats.events,
        flushes = stats.flushes,
        "Batch scheduler stopped"
    );
    stats
}

async fn flush(sink: &BatchingSink, events: &[LogEvent], stats: &mut SchedulerStats) {
    let result = sink.flush(events).await;
    stats.flushes += 1;
    stats.batches_dispatched += result.dispatched.len() as u64;
    stats.batches_failed += result.failed.len() as u64;

    for (group, error) in &result.failed {
        warn!(
            group = %group,
            events = events.len(),
            error = %error,
            "Dropping batch that could not be dispatched"
        );
    }
}
