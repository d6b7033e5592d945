//! Event-server telemetry counters: events dropped under backpressure
//! are counted, not silently lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServerTelemetry {
    /// Watcher events dropped because the intake queue was full.
    pub events_dropped: AtomicU64,
    /// Request files that made it through the full dispatch pipeline.
    pub requests_processed: AtomicU64,
    /// Times the watcher was restarted after reporting an error.
    pub watcher_restarts: AtomicU64,
    /// Set once the watcher has failed past its one restart attempt; the
    /// server keeps running on the periodic poll-rescan alone.
    pub degraded: AtomicBool,
}

impl ServerTelemetry {
    pub fn snapshot(&self) -> ServerTelemetrySnapshot {
        ServerTelemetrySnapshot {
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            watcher_restarts: self.watcher_restarts.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerTelemetrySnapshot {
    pub events_dropped: u64,
    pub requests_processed: u64,
    pub watcher_restarts: u64,
    pub degraded: bool,
}
