//! Transfer records, status state machine, and engine events.
//!
//! A [`TransferRecord`] is the fixed-shape bookkeeping entry for one logical
//! download. Records are owned exclusively by the registry; callers and
//! workers only ever see point-in-time clones (snapshots), never live
//! references.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one transfer, stable for its active lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(u64);

impl TransferId {
    /// Wraps a raw id value. Ids are normally allocated by the registry.
    #[must_use]
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a transfer.
///
/// ```text
/// Starting --(headers received)--> Downloading
/// Downloading --(all bytes written)--> Completed
/// Downloading --(pause signal observed)--> Paused
/// Downloading --(cancel signal observed)--> Cancelled  [partial file deleted]
/// Downloading --(network/IO error)--> Failed
/// Paused --(resume requested)--> Downloading  [new worker, Range continuation]
/// Paused --(cancel)--> Cancelled
/// ```
///
/// `Completed`, `Cancelled`, and `Failed` are terminal; a record is evicted
/// from the active registry immediately upon entering any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Record created, worker spawned, response headers not yet received.
    Starting,
    /// Worker is streaming bytes to disk.
    Downloading,
    /// Worker halted cooperatively; partial bytes remain on disk.
    Paused,
    /// All bytes written; terminal.
    Completed,
    /// Cancelled by the caller; partial file deleted; terminal.
    Cancelled,
    /// Network or IO failure; partial bytes left on disk; terminal.
    Failed,
}

impl TransferStatus {
    /// Returns true for states from which no further transition occurs.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for one transfer.
///
/// `id`, `url`, and `destination_path` are immutable after creation
/// (the destination is collision-resolved before the record exists).
/// `total_size` is 0 until known from the server response and may be revised
/// once when a ranged continuation reveals the true full size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Unique identifier, assigned at creation.
    pub id: TransferId,
    /// Source URL.
    pub url: String,
    /// Absolute destination path on disk.
    pub destination_path: PathBuf,
    /// Total byte count; 0 until known.
    pub total_size: u64,
    /// Bytes written so far; reset to the on-disk size at worker (re)start.
    pub downloaded_bytes: u64,
    /// Current lifecycle state.
    pub status: TransferStatus,
    /// Last sampled throughput; 0.0 when not actively transferring.
    pub speed_bytes_per_sec: f64,
    /// When the transfer was created.
    pub started_at: SystemTime,
    /// Set only on reaching `Completed`.
    pub completed_at: Option<SystemTime>,
    /// Human-readable failure description; present only when `Failed`.
    pub error: Option<String>,
}

impl TransferRecord {
    /// Creates a fresh record in the `Starting` state.
    #[must_use]
    pub(crate) fn new(id: TransferId, url: String, destination_path: PathBuf) -> Self {
        Self {
            id,
            url,
            destination_path,
            total_size: 0,
            downloaded_bytes: 0,
            status: TransferStatus::Starting,
            speed_bytes_per_sec: 0.0,
            started_at: SystemTime::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// Notifications the engine emits for the UI surface to subscribe to.
///
/// Every variant carries a full record snapshot so subscribers never need
/// a follow-up `get` to render the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferEvent {
    /// A transfer was registered and its worker spawned.
    Created(TransferRecord),
    /// Progress update, throttled to throughput sample refreshes.
    Progress(TransferRecord),
    /// The transfer reached `Completed`, `Cancelled`, or `Failed`.
    Terminal(TransferRecord),
}

impl TransferEvent {
    /// Returns the record snapshot carried by this event.
    #[must_use]
    pub fn record(&self) -> &TransferRecord {
        match self {
            Self::Created(record) | Self::Progress(record) | Self::Terminal(record) => record,
        }
    }
}
