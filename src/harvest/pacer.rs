//! Request pacing for catalog calls.
//!
//! Every call issued by the batch client first acquires a slot from the
//! pacer. The sliding window pacer enforces both a minimum spacing between
//! consecutive requests and a cap on requests within a rolling window.
//! Time is read from the tokio clock so tests can pause and advance it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitSettings;

/// Trait for request pacing.
#[async_trait]
pub trait RequestPacer: Send + Sync {
    /// Wait until a request may be issued, then record it.
    async fn acquire(&self);

    /// Get current usage stats for monitoring.
    async fn get_stats(&self) -> PacerStats;
}

/// Current pacer statistics.
#[derive(Debug, Clone, Default)]
pub struct PacerStats {
    /// Requests issued in the current window
    pub requests_in_window: u32,
    /// Maximum requests per window
    pub max_requests_per_window: u32,
    /// Total requests issued since creation
    pub total_requests: u64,
    /// Total time spent waiting for a slot
    pub total_wait: Duration,
}

/// Configuration for the sliding window pacer.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Minimum spacing between two consecutive requests
    pub min_interval: Duration,
    /// Maximum requests allowed per window
    pub max_requests_per_window: u32,
    /// Length of the rolling window
    pub window: Duration,
}

impl From<&RateLimitSettings> for PacerConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            min_interval: Duration::from_millis(settings.min_interval_ms),
            max_requests_per_window: settings.max_requests_per_window,
            window: Duration::from_secs(settings.window_secs),
        }
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

#[derive(Debug, Default)]
struct PacerState {
    issued: VecDeque<Instant>,
    total_requests: u64,
    total_wait: Duration,
}

/// Sliding window request pacer.
pub struct SlidingWindowPacer {
    state: Mutex<PacerState>,
    config: PacerConfig,
}

impl SlidingWindowPacer {
    pub fn new(config: PacerConfig) -> Self {
        Self {
            state: Mutex::new(PacerState::default()),
            config,
        }
    }

    /// Prune entries older than the window.
    fn prune_old_entries(issued: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = issued.front() {
            if now.duration_since(*front) >= window {
                issued.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long to wait before the next request may be issued.
    fn wait_needed(&self, issued: &VecDeque<Instant>, now: Instant) -> Duration {
        let spacing = issued
            .back()
            .map(|last| (*last + self.config.min_interval).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        let window = if issued.len() >= self.config.max_requests_per_window as usize {
            issued
                .front()
                .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };

        spacing.max(window)
    }
}

#[async_trait]
impl RequestPacer for SlidingWindowPacer {
    async fn acquire(&self) {
        // The lock is held across the sleep so callers are served in order.
        let mut state = self.state.lock().await;
        let now = Instant::now();
        Self::prune_old_entries(&mut state.issued, now, self.config.window);

        let wait = self.wait_needed(&state.issued, now);
        if !wait.is_zero() {
            debug!("Pacing catalog request, sleeping {:?}", wait);
            tokio::time::sleep(wait).await;
            state.total_wait += wait;
        }

        let now = Instant::now();
        Self::prune_old_entries(&mut state.issued, now, self.config.window);
        state.issued.push_back(now);
        state.total_requests += 1;
    }

    async fn get_stats(&self) -> PacerStats {
        let mut state = self.state.lock().await;
        Self::prune_old_entries(&mut state.issued, Instant::now(), self.config.window);

        PacerStats {
            requests_in_window: state.issued.len() as u32,
            max_requests_per_window: self.config.max_requests_per_window,
            total_requests: state.total_requests,
            total_wait: state.total_wait,
        }
    }
}

/// No-op pacer that never waits.
/// Used when rate limiting is disabled.
pub struct NoOpPacer;

#[async_trait]
impl RequestPacer for NoOpPacer {
    async fn acquire(&self) {}

    async fn get_stats(&self) -> PacerStats {
        PacerStats::default()
    }
}

/// Build the pacer described by the rate limit settings.
pub fn pacer_from_settings(settings: &RateLimitSettings) -> Box<dyn RequestPacer> {
    if settings.enabled {
        Box::new(SlidingWindowPacer::new(PacerConfig::from(settings)))
    } else {
        Box::new(NoOpPacer)
    }
}
