use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for the polling loops.
#[derive(Debug)]
pub struct PollMetrics {
    // Counters
    polls_completed: AtomicU64,
    poll_failures: AtomicU64,
    rate_limited: AtomicU64,
    parse_errors: AtomicU64,
    events_emitted: AtomicU64,
    stale_snapshots: AtomicU64,
    unreconciled_fills: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_success_time: Option<Instant>,
    last_failure_time: Option<Instant>,
}

impl Default for PollMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PollMetrics {
    pub fn new() -> Self {
        Self {
            polls_completed: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            stale_snapshots: AtomicU64::new(0),
            unreconciled_fills: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_success_time: None,
                last_failure_time: None,
            }),
        }
    }

    // --- Increment methods ---

    /// A poll cycle finished without any failed item.
    pub fn inc_polls_completed(&self) {
        self.polls_completed.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_success_time = Some(Instant::now());
    }

    /// One pair, order or whole request failed.
    pub fn inc_poll_failures(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_failure_time = Some(Instant::now());
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_failure_time = Some(Instant::now());
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_events_emitted(&self, count: u64) {
        self.events_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// A snapshot arrived with a version not newer than the applied one.
    pub fn inc_stale_snapshots(&self) {
        self.stale_snapshots.fetch_add(1, Ordering::Relaxed);
    }

    /// An order reported filled was dropped before its trades covered it.
    pub fn inc_unreconciled_fills(&self) {
        self.unreconciled_fills.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn polls_completed(&self) -> u64 {
        self.polls_completed.load(Ordering::Relaxed)
    }

    pub fn poll_failures(&self) -> u64 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn stale_snapshots(&self) -> u64 {
        self.stale_snapshots.load(Ordering::Relaxed)
    }

    pub fn unreconciled_fills(&self) -> u64 {
        self.unreconciled_fills.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_success(&self) -> Option<f64> {
        self.inner
            .read()
            .last_success_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_failure(&self) -> Option<f64> {
        self.inner
            .read()
            .last_failure_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_completed: self.polls_completed(),
            poll_failures: self.poll_failures(),
            rate_limited: self.rate_limited(),
            parse_errors: self.parse_errors(),
            events_emitted: self.events_emitted(),
            stale_snapshots: self.stale_snapshots(),
            unreconciled_fills: self.unreconciled_fills(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_success: self.secs_since_last_success(),
            secs_since_last_failure: self.secs_since_last_failure(),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub polls_completed: u64,
    pub poll_failures: u64,
    pub rate_limited: u64,
    pub parse_errors: u64,
    pub events_emitted: u64,
    pub stale_snapshots: u64,
    pub unreconciled_fills: u64,
    pub uptime_secs: f64,
    pub secs_since_last_success: Option<f64>,
    pub secs_since_last_failure: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Polls are succeeding.
    Healthy,
    /// No successful poll for a while, e.g. during a rate-limit backoff.
    Degraded,
    /// No successful poll for an extended period.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    const DEGRADED_THRESHOLD_SECS: f64 = 30.0;
    /// Longer than the default rate-limit backoff.
    const UNHEALTHY_THRESHOLD_SECS: f64 = 120.0;

    /// Health from the age of the last fully successful poll.
    pub fn health_status(&self) -> HealthStatus {
        let secs = self.secs_since_last_success.unwrap_or(self.uptime_secs);

        if secs > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if secs > Self::DEGRADED_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Poll Metrics ===")?;
        writeln!(f, "Uptime:            {:.1}s", self.uptime_secs)?;
        writeln!(f, "Polls completed:   {}", self.polls_completed)?;
        writeln!(f, "Poll failures:     {}", self.poll_failures)?;
        writeln!(f, "Rate limited:      {}", self.rate_limited)?;
        writeln!(f, "Parse errors:      {}", self.parse_errors)?;
        writeln!(f, "Events emitted:    {}", self.events_emitted)?;
        writeln!(f, "Stale snapshots:   {}", self.stale_snapshots)?;
        writeln!(f, "Unreconciled fills: {}", self.unreconciled_fills)?;
        if let Some(secs) = self.secs_since_last_success {
            writeln!(f, "Since last success: {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_failure {
            writeln!(f, "Since last failure: {:.1}s", secs)?;
        }
        Ok(())
    }
}

pub type SharedMetrics = Arc<PollMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(PollMetrics::new())
}
