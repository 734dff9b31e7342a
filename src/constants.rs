//! Constants for the transfer engine (timeouts, sampling).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between throughput samples.
///
/// Bounds the update frequency of `speed_bytes_per_sec` and avoids noisy
/// instantaneous rates from single-chunk timing jitter.
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the engine's event broadcast channel.
///
/// Slow subscribers that fall more than this many events behind lose the
/// oldest events (tokio broadcast lag semantics); snapshots via `list`/`get`
/// remain authoritative.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
