//! Throughput sampling for in-flight transfers.

use std::time::{Duration, Instant};

use crate::constants::SPEED_SAMPLE_INTERVAL;

/// Computes a smoothed instantaneous throughput from byte-count deltas.
///
/// The tracker keeps `(last_sample_time, last_sample_bytes)` and refuses to
/// recompute more often than its sample interval, so single-chunk timing
/// jitter never reaches the published rate.
#[derive(Debug)]
pub struct SpeedTracker {
    last_sample_time: Instant,
    last_sample_bytes: u64,
    interval: Duration,
}

impl SpeedTracker {
    /// Starts tracking from the given byte offset (non-zero when resuming).
    #[must_use]
    pub fn new(initial_bytes: u64) -> Self {
        Self::with_interval(initial_bytes, SPEED_SAMPLE_INTERVAL)
    }

    /// Starts tracking with a custom sample interval.
    #[must_use]
    pub fn with_interval(initial_bytes: u64, interval: Duration) -> Self {
        Self {
            last_sample_time: Instant::now(),
            last_sample_bytes: initial_bytes,
            interval,
        }
    }

    /// Offers the current downloaded byte count for sampling.
    ///
    /// Returns `Some(bytes_per_sec)` when at least one interval has elapsed
    /// since the last sample (resetting the sample point), `None` otherwise.
    pub fn sample(&mut self, downloaded_bytes: u64) -> Option<f64> {
        let elapsed = self.last_sample_time.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let delta = downloaded_bytes.saturating_sub(self.last_sample_bytes);
        #[allow(clippy::cast_precision_loss)]
        let rate = delta as f64 / elapsed.as_secs_f64();

        self.last_sample_time = Instant::now();
        self.last_sample_bytes = downloaded_bytes;
        Some(rate)
    }
}
