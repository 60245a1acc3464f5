//! Server-side session accounting.
//!
//! Tracks live connections and bytes sent across every worker thread.
//! The first checkin opens the measurement window; the checkout that brings
//! the live count back to zero closes it, emits the final report once and
//! stops the server.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::runtime::Shutdown;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Throughput summary for one measurement window.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub bytes: u64,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl Report {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self {
            bytes,
            elapsed,
            finished_at: Utc::now(),
        }
    }

    /// Megabytes per second, or `None` if no time elapsed.
    pub fn mb_per_sec(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.bytes as f64 / BYTES_PER_MB / secs)
    }

    /// Megabits per second, or `None` if no time elapsed.
    pub fn mbit_per_sec(&self) -> Option<f64> {
        self.mb_per_sec().map(|mb| mb * 8.0)
    }

    /// Emit the report as a structured log event.
    pub fn log(&self, label: &str) {
        match (self.mb_per_sec(), self.mbit_per_sec()) {
            (Some(mb_per_sec), Some(mbit_per_sec)) => info!(
                bytes = self.bytes,
                megabytes = self.bytes as f64 / BYTES_PER_MB,
                elapsed_secs = self.elapsed.as_secs_f64(),
                mb_per_sec,
                mbit_per_sec,
                finished_at = %self.finished_at,
                "{label}"
            ),
            _ => info!(
                bytes = self.bytes,
                megabytes = self.bytes as f64 / BYTES_PER_MB,
                elapsed_secs = 0.0,
                finished_at = %self.finished_at,
                "{label} (throughput undefined: no measurable elapsed time)"
            ),
        }
    }
}

/// Live-connection and throughput accounting shared by all connections.
pub struct SessionTracker {
    live: AtomicUsize,
    bytes_sent: AtomicU64,
    /// Reference point for the window timestamps below.
    epoch: Instant,
    start_nanos: AtomicU64,
    stop_nanos: AtomicU64,
    report: OnceLock<Report>,
    shutdown: Shutdown,
}

impl SessionTracker {
    /// Create a tracker that triggers `shutdown` once the session ends.
    pub fn new(shutdown: Shutdown) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicUsize::new(0),
            bytes_sent: AtomicU64::new(0),
            epoch: Instant::now(),
            start_nanos: AtomicU64::new(0),
            stop_nanos: AtomicU64::new(0),
            report: OnceLock::new(),
            shutdown,
        })
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Register a new live connection.
    pub fn checkin(&self) {
        let previous = self.live.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.start_nanos.store(self.now_nanos(), Ordering::Release);
            debug!("Measurement window opened");
        }
        debug!(live = previous + 1, "Checkin");
    }

    /// Unregister a live connection, finalizing the session at zero.
    pub fn checkout(&self) {
        let previous = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "checkout without matching checkin");
        debug!(live = previous - 1, "Checkout");
        if previous == 1 {
            self.stop_nanos.store(self.now_nanos(), Ordering::Release);
            self.finalize();
        }
    }

    /// Add `bytes` to the total sent.
    pub fn add_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// The final report, once the session has ended.
    pub fn report(&self) -> Option<&Report> {
        self.report.get()
    }

    fn finalize(&self) {
        let start = self.start_nanos.load(Ordering::Acquire);
        let stop = self.stop_nanos.load(Ordering::Acquire);
        let elapsed = Duration::from_nanos(stop.saturating_sub(start));

        let mut emitted = false;
        let report = self.report.get_or_init(|| {
            emitted = true;
            Report::new(self.bytes_sent(), elapsed)
        });

        if emitted {
            report.log("Final report");
            self.shutdown.trigger();
        }
    }
}

/// Holds one checkin for as long as it lives.
///
/// Dropping the guard checks out, so a connection is accounted for on
/// every exit path.
pub struct SessionGuard {
    tracker: Arc<SessionTracker>,
}

impl SessionGuard {
    pub fn checkin(tracker: Arc<SessionTracker>) -> Self {
        tracker.checkin();
        Self { tracker }
    }

    pub fn add_sent(&self, bytes: u64) {
        self.tracker.add_sent(bytes);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.checkout();
    }
}
