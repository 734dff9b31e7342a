//! The shared registry of active transfers.
//!
//! The registry is the single ownership point for transfer records: workers
//! and the engine façade mutate records only through it, under a per-entry
//! exclusive guard held for the duration of the field update and never across
//! I/O. Reads hand out snapshots, never live references.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::EngineError;
use crate::filename::resolve_unique_path;
use crate::record::{TransferEvent, TransferId, TransferRecord, TransferStatus};

/// Cooperative control signal observed by a worker at chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    /// Keep streaming.
    Run,
    /// Halt the I/O loop, keep the partial file, leave the record `Paused`.
    Pause,
    /// Halt the I/O loop, delete the partial file, finish as `Cancelled`.
    Cancel,
}

/// Outcome of a cancel request, telling the engine who owns cleanup.
#[derive(Debug)]
pub(crate) enum CancelOutcome {
    /// An active worker was signalled; it deletes the file and finishes
    /// the record itself.
    SignalledWorker,
    /// The transfer was paused with no worker; the entry has been removed
    /// and the engine must delete the file and emit the terminal event.
    Detached(TransferRecord),
}

#[derive(Debug)]
struct TransferEntry {
    record: TransferRecord,
    control: watch::Sender<ControlSignal>,
    worker_active: bool,
}

/// Concurrency-safe map of transfer id to transfer record.
///
/// Enforces the one-active-worker-per-id invariant: `resume` refuses to spawn
/// a second worker while one is running, and terminal records are evicted
/// immediately so control operations on them report `NotFound`.
#[derive(Debug)]
pub(crate) struct TransferRegistry {
    transfers: DashMap<TransferId, TransferEntry>,
    next_id: AtomicU64,
    events: broadcast::Sender<TransferEvent>,
    /// Serializes destination resolution with record insertion; see
    /// [`TransferRegistry::insert_new`].
    destination_lock: Mutex<()>,
}

impl TransferRegistry {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transfers: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
            destination_lock: Mutex::new(()),
        }
    }

    /// Allocates a fresh transfer id.
    pub(crate) fn allocate_id(&self) -> TransferId {
        TransferId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribes to engine events.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    /// Resolves a collision-free destination for `leaf_name` in
    /// `destination_dir` and inserts a fresh `Starting` record for it.
    ///
    /// The disk probe, the active-destination check, and the insertion all
    /// happen under one lock, so two simultaneous starts with colliding
    /// names always receive distinct paths.
    pub(crate) fn insert_new(
        &self,
        url: String,
        destination_dir: &Path,
        leaf_name: &str,
    ) -> (TransferRecord, watch::Receiver<ControlSignal>) {
        let _guard = self
            .destination_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let destination_path = resolve_unique_path(destination_dir, leaf_name, |candidate| {
            self.is_destination_active(candidate)
        });
        let record = TransferRecord::new(self.allocate_id(), url, destination_path);
        let receiver = self.insert(record.clone());
        (record, receiver)
    }

    /// Inserts a fresh `Starting` record with an active worker slot and
    /// returns the control receiver for that worker.
    ///
    /// Emits [`TransferEvent::Created`].
    pub(crate) fn insert(&self, record: TransferRecord) -> watch::Receiver<ControlSignal> {
        let (control, receiver) = watch::channel(ControlSignal::Run);
        self.emit(TransferEvent::Created(record.clone()));
        self.transfers.insert(
            record.id,
            TransferEntry {
                record,
                control,
                worker_active: true,
            },
        );
        receiver
    }

    /// Returns a point-in-time copy of the record for `id`.
    pub(crate) fn snapshot(&self, id: TransferId) -> Option<TransferRecord> {
        self.transfers.get(&id).map(|entry| entry.record.clone())
    }

    /// Returns point-in-time copies of all active records.
    pub(crate) fn snapshot_all(&self) -> Vec<TransferRecord> {
        self.transfers
            .iter()
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// True when some active record already claims `path` as its destination.
    pub(crate) fn is_destination_active(&self, path: &Path) -> bool {
        self.transfers
            .iter()
            .any(|entry| entry.record.destination_path == path)
    }

    /// Applies a short mutation to the record for `id` under the entry guard.
    ///
    /// Returns false when the record no longer exists (evicted).
    pub(crate) fn update(&self, id: TransferId, f: impl FnOnce(&mut TransferRecord)) -> bool {
        match self.transfers.get_mut(&id) {
            Some(mut entry) => {
                f(&mut entry.record);
                true
            }
            None => false,
        }
    }

    /// Emits a throttled progress event carrying the current snapshot.
    pub(crate) fn emit_progress(&self, id: TransferId) {
        if let Some(record) = self.snapshot(id) {
            self.emit(TransferEvent::Progress(record));
        }
    }

    /// Signals the worker owning `id` to pause.
    ///
    /// The status flips to `Paused` only when the worker observes the signal,
    /// within at most one chunk's latency.
    pub(crate) fn request_pause(&self, id: TransferId) -> Result<(), EngineError> {
        let entry = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(id))?;
        match entry.record.status {
            TransferStatus::Starting | TransferStatus::Downloading => {
                entry.control.send_replace(ControlSignal::Pause);
                debug!(id = %id, "pause requested");
                Ok(())
            }
            status => Err(EngineError::invalid_state(id, status, "downloading")),
        }
    }

    /// Reclaims a paused transfer for a fresh worker.
    ///
    /// Flips the record to `Downloading`, marks the worker slot active, and
    /// returns a new control receiver. Refuses when the transfer is not
    /// `Paused` or a worker is still winding down.
    pub(crate) fn claim_for_resume(
        &self,
        id: TransferId,
    ) -> Result<watch::Receiver<ControlSignal>, EngineError> {
        let mut entry = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(id))?;
        if entry.record.status != TransferStatus::Paused || entry.worker_active {
            return Err(EngineError::invalid_state(id, entry.record.status, "paused"));
        }
        entry.record.status = TransferStatus::Downloading;
        entry.worker_active = true;
        entry.control.send_replace(ControlSignal::Run);
        debug!(id = %id, "resume claimed");
        Ok(entry.control.subscribe())
    }

    /// Requests cancellation of the transfer for `id`.
    pub(crate) fn request_cancel(&self, id: TransferId) -> Result<CancelOutcome, EngineError> {
        // Signal under the guard when a worker is alive; otherwise detach the
        // paused entry so the engine can clean up its file.
        {
            let entry = self
                .transfers
                .get_mut(&id)
                .ok_or_else(|| EngineError::not_found(id))?;
            if entry.worker_active {
                entry.control.send_replace(ControlSignal::Cancel);
                debug!(id = %id, "cancel signalled to worker");
                return Ok(CancelOutcome::SignalledWorker);
            }
        }

        match self.transfers.remove(&id) {
            Some((_, entry)) => {
                let mut record = entry.record;
                record.status = TransferStatus::Cancelled;
                record.speed_bytes_per_sec = 0.0;
                Ok(CancelOutcome::Detached(record))
            }
            // Lost a race with another cancel between the guard scopes.
            None => Err(EngineError::not_found(id)),
        }
    }

    /// Marks the worker slot for `id` free and leaves the record `Paused`.
    ///
    /// Called by a worker acknowledging a pause signal; flushed bytes remain
    /// on disk for a later ranged continuation. Returns false when a cancel
    /// signal arrived after the worker observed the pause; the worker must
    /// then carry out the cancellation instead of parking.
    pub(crate) fn park_paused(&self, id: TransferId) -> bool {
        match self.transfers.get_mut(&id) {
            Some(mut entry) => {
                if *entry.control.borrow() == ControlSignal::Cancel {
                    return false;
                }
                entry.record.status = TransferStatus::Paused;
                entry.record.speed_bytes_per_sec = 0.0;
                entry.worker_active = false;
                true
            }
            None => {
                warn!(id = %id, "pause acknowledgement for evicted transfer");
                true
            }
        }
    }

    /// Moves the record for `id` to a terminal status and evicts it.
    ///
    /// Emits [`TransferEvent::Terminal`] with the final snapshot. Returns
    /// `None` when the record was already evicted.
    pub(crate) fn finish(
        &self,
        id: TransferId,
        status: TransferStatus,
        error: Option<String>,
    ) -> Option<TransferRecord> {
        debug_assert!(status.is_terminal());
        let (_, entry) = self.transfers.remove(&id)?;
        let mut record = entry.record;
        record.status = status;
        record.speed_bytes_per_sec = 0.0;
        record.error = error;
        if status == TransferStatus::Completed {
            record.completed_at = Some(std::time::SystemTime::now());
        }
        self.emit(TransferEvent::Terminal(record.clone()));
        Some(record)
    }

    /// Emits a terminal event for a record already detached from the map.
    pub(crate) fn emit_terminal(&self, record: TransferRecord) {
        self.emit(TransferEvent::Terminal(record));
    }

    fn emit(&self, event: TransferEvent) {
        // Delivery is best-effort: no subscribers is not an error.
        let _ = self.events.send(event);
    }
}
