//! Public façade of the transfer engine.
//!
//! The engine accepts URLs from the browsing surface, allocates
//! collision-free destination paths, and spawns one worker task per transfer.
//! Control operations (`pause`/`resume`/`cancel`) signal the owning worker
//! through the registry; reads (`list`/`get`) return snapshots.
//!
//! # Example
//!
//! ```no_run
//! use download_engine::DownloadEngine;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new();
//! let id = engine.start_download(
//!     "https://example.com/archive.zip",
//!     Path::new("./downloads"),
//!     None,
//! )?;
//! let record = engine.get(id)?;
//! println!("{}: {}", record.destination_path.display(), record.status);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use url::Url;

use crate::client::HttpClient;
use crate::error::EngineError;
use crate::filename::{filename_from_url, sanitize_filename};
use crate::record::{TransferEvent, TransferId, TransferRecord};
use crate::registry::{CancelOutcome, TransferRegistry};
use crate::worker;

/// Orchestrates concurrent resumable transfers.
///
/// Cloning is cheap and shares the registry and the HTTP connection pool.
///
/// # Concurrency Model
///
/// - Each transfer runs in its own Tokio task (one worker per active id)
/// - Workers share no mutable state except through the registry
/// - Control signals are cooperative: a worker observes pause/cancel within
///   at most one chunk's latency
/// - Terminal records are evicted from the active set immediately; history
///   is a caller concern
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    registry: Arc<TransferRegistry>,
    client: HttpClient,
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadEngine {
    /// Creates an engine with default HTTP timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    /// Creates an engine using a pre-configured HTTP client.
    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            registry: Arc::new(TransferRegistry::new()),
            client,
        }
    }

    /// Starts a new transfer and returns its id without waiting for any I/O.
    ///
    /// The destination leaf name comes from `suggested_name` when provided
    /// (sanitized), otherwise from the URL's last path segment. The final
    /// path is probed against the target directory and all active transfer
    /// destinations, so colliding names get ` (1)`, ` (2)`, ... suffixes;
    /// resolution and registration are atomic, so simultaneous starts can
    /// never claim the same path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidUrl`] when the URL cannot be parsed.
    #[instrument(skip(self, destination_dir), fields(dir = %destination_dir.display()))]
    pub fn start_download(
        &self,
        url: &str,
        destination_dir: &Path,
        suggested_name: Option<&str>,
    ) -> Result<TransferId, EngineError> {
        let parsed = Url::parse(url).map_err(|_| EngineError::invalid_url(url))?;

        let leaf_name = suggested_name
            .map(sanitize_filename)
            .filter(|name| !name.trim_matches('_').is_empty())
            .unwrap_or_else(|| filename_from_url(&parsed));
        let (record, control) = self
            .registry
            .insert_new(url.to_string(), destination_dir, &leaf_name);
        let id = record.id;

        info!(id = %id, path = %record.destination_path.display(), "transfer created");
        tokio::spawn(worker::run_transfer(
            Arc::clone(&self.registry),
            self.client.clone(),
            id,
            url.to_string(),
            record.destination_path,
            control,
        ));

        Ok(id)
    }

    /// Signals the worker owning `id` to suspend.
    ///
    /// The record flips to `Paused` when the worker observes the signal;
    /// bytes already flushed stay on disk for a later ranged continuation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no active record exists for
    /// `id`, and [`EngineError::InvalidState`] when the transfer is not
    /// starting or downloading.
    pub fn pause(&self, id: TransferId) -> Result<(), EngineError> {
        self.registry.request_pause(id)
    }

    /// Resumes a paused transfer on the same id and destination file.
    ///
    /// Spawns a fresh worker that reopens the source with
    /// `Range: bytes=<downloaded_bytes>-` and appends to the partial file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no active record exists for
    /// `id`, and [`EngineError::InvalidState`] when the transfer is not
    /// currently paused.
    pub fn resume(&self, id: TransferId) -> Result<(), EngineError> {
        let control = self.registry.claim_for_resume(id)?;
        let record = self
            .registry
            .snapshot(id)
            .ok_or_else(|| EngineError::not_found(id))?;

        info!(id = %id, offset = record.downloaded_bytes, "resuming transfer");
        tokio::spawn(worker::run_transfer(
            Arc::clone(&self.registry),
            self.client.clone(),
            id,
            record.url,
            record.destination_path,
            control,
        ));
        Ok(())
    }

    /// Cancels the transfer for `id`.
    ///
    /// An active worker observes the signal within one chunk and deletes the
    /// partially-written file itself; for a paused transfer the engine
    /// deletes the file directly. Either way the record finishes as
    /// `Cancelled` and leaves the active set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no active record exists for
    /// `id`; no state is mutated in that case.
    pub async fn cancel(&self, id: TransferId) -> Result<(), EngineError> {
        match self.registry.request_cancel(id)? {
            CancelOutcome::SignalledWorker => Ok(()),
            CancelOutcome::Detached(record) => {
                if let Err(error) = tokio::fs::remove_file(&record.destination_path).await {
                    if error.kind() != std::io::ErrorKind::NotFound {
                        debug!(
                            path = %record.destination_path.display(),
                            error = %error,
                            "failed to remove partial file of paused transfer"
                        );
                    }
                }
                info!(id = %id, "paused transfer cancelled");
                self.registry.emit_terminal(record);
                Ok(())
            }
        }
    }

    /// Returns point-in-time snapshots of all active transfers.
    #[must_use]
    pub fn list(&self) -> Vec<TransferRecord> {
        self.registry.snapshot_all()
    }

    /// Returns a point-in-time snapshot of the transfer for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no active record exists for
    /// `id` (terminal records are evicted immediately).
    pub fn get(&self, id: TransferId) -> Result<TransferRecord, EngineError> {
        self.registry
            .snapshot(id)
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Subscribes to transfer notifications: `Created`, throttled `Progress`,
    /// and `Terminal` with the final record snapshot.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.registry.subscribe()
    }
}
