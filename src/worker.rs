//! The range transfer worker: drives exactly one transfer from start to a
//! terminal or paused state.
//!
//! A worker owns its destination file exclusively for its lifetime. It reacts
//! to pause/cancel signals cooperatively at chunk boundaries (and, via
//! `select!`, even while a read is stalled), so control requests take effect
//! within at most one chunk's latency.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::client::HttpClient;
use crate::error::TransferError;
use crate::record::{TransferId, TransferStatus};
use crate::registry::{ControlSignal, TransferRegistry};
use crate::speed::SpeedTracker;

/// How a worker's streaming loop ended, short of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndCause {
    /// Stream exhausted with no error.
    Completed,
    /// Pause signal observed; flushed bytes remain on disk.
    Paused,
    /// Cancel signal observed; the caller deletes the partial file.
    Cancelled,
}

/// Runs one transfer to completion, pause, cancellation, or failure.
///
/// All outcomes are recorded through the registry; this function never
/// propagates an error to its spawner.
#[instrument(skip_all, fields(id = %id, url = %url))]
pub(crate) async fn run_transfer(
    registry: Arc<TransferRegistry>,
    client: HttpClient,
    id: TransferId,
    url: String,
    path: PathBuf,
    control: watch::Receiver<ControlSignal>,
) {
    match drive(&registry, &client, id, &url, &path, control).await {
        Ok(EndCause::Completed) => {
            info!(path = %path.display(), "transfer completed");
            registry.finish(id, TransferStatus::Completed, None);
        }
        Ok(EndCause::Paused) => {
            if registry.park_paused(id) {
                info!(path = %path.display(), "transfer paused");
            } else {
                // A cancel landed while this worker was acknowledging the
                // pause; honor the cancel.
                remove_partial_file(&path).await;
                info!(path = %path.display(), "transfer cancelled during pause");
                registry.finish(id, TransferStatus::Cancelled, None);
            }
        }
        Ok(EndCause::Cancelled) => {
            remove_partial_file(&path).await;
            info!(path = %path.display(), "transfer cancelled, partial file removed");
            registry.finish(id, TransferStatus::Cancelled, None);
        }
        Err(error) => {
            // Partial bytes are left on disk, distinguishing failure from
            // cancellation.
            warn!(error = %error, "transfer failed");
            registry.finish(id, TransferStatus::Failed, Some(error.to_string()));
        }
    }
}

/// The request/stream loop, separated so the caller maps every exit into a
/// registry transition exactly once.
async fn drive(
    registry: &TransferRegistry,
    client: &HttpClient,
    id: TransferId,
    url: &str,
    path: &Path,
    mut control: watch::Receiver<ControlSignal>,
) -> Result<EndCause, TransferError> {
    // A partially-written destination means this is a resumption: continue
    // from the on-disk size with a ranged request.
    let existing_bytes = tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);
    let range_offset = (existing_bytes > 0).then_some(existing_bytes);

    let response = client.send_get(url, range_offset).await?;

    let resumed = range_offset.is_some() && response.status() == StatusCode::PARTIAL_CONTENT;
    if range_offset.is_some() && !resumed {
        // Server ignored the Range header and is replying with the full body
        // from offset 0; restart with truncation instead of corrupting data.
        warn!(
            status = response.status().as_u16(),
            "ranged request not honored, restarting from offset 0"
        );
    }

    let mut downloaded_bytes = if resumed { existing_bytes } else { 0 };
    let total_size = if resumed {
        content_range_total(&response)
            .or_else(|| response.content_length().map(|len| len + existing_bytes))
            .unwrap_or(0)
    } else {
        response.content_length().unwrap_or(0)
    };

    registry.update(id, |record| {
        record.status = TransferStatus::Downloading;
        record.downloaded_bytes = downloaded_bytes;
        if total_size > 0 {
            record.total_size = total_size;
        }
    });
    debug!(total_size, resumed, "headers received, streaming");

    let file = open_destination(path, resumed).await?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut tracker = SpeedTracker::new(downloaded_bytes);

    loop {
        tokio::select! {
            // Poll the control signal first so pause/cancel are observed
            // before the next chunk is written.
            biased;

            changed = control.changed() => {
                let signal = if changed.is_ok() {
                    *control.borrow_and_update()
                } else {
                    // Registry entry gone; treat as cancellation.
                    ControlSignal::Cancel
                };
                match signal {
                    ControlSignal::Pause => {
                        writer
                            .flush()
                            .await
                            .map_err(|e| TransferError::io(path, e))?;
                        return Ok(EndCause::Paused);
                    }
                    ControlSignal::Cancel => return Ok(EndCause::Cancelled),
                    ControlSignal::Run => {}
                }
            }

            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        writer
                            .write_all(&bytes)
                            .await
                            .map_err(|e| TransferError::io(path, e))?;

                        downloaded_bytes += bytes.len() as u64;
                        if total_size > 0 {
                            downloaded_bytes = downloaded_bytes.min(total_size);
                        }

                        let sampled = tracker.sample(downloaded_bytes);
                        registry.update(id, |record| {
                            record.downloaded_bytes = downloaded_bytes;
                            if let Some(rate) = sampled {
                                record.speed_bytes_per_sec = rate;
                            }
                        });
                        if sampled.is_some() {
                            registry.emit_progress(id);
                        }
                    }
                    Some(Err(error)) => {
                        return Err(TransferError::network(url, error));
                    }
                    None => {
                        writer
                            .flush()
                            .await
                            .map_err(|e| TransferError::io(path, e))?;
                        return Ok(EndCause::Completed);
                    }
                }
            }
        }
    }
}

/// Opens the destination for append (resume) or create/truncate (fresh).
async fn open_destination(path: &Path, resumed: bool) -> Result<File, TransferError> {
    let result = if resumed {
        OpenOptions::new().append(true).open(path).await
    } else {
        File::create(path).await
    };
    result.map_err(|e| TransferError::io(path, e))
}

/// Deletes the partially-written destination file, best-effort.
async fn remove_partial_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %error, "failed to remove partial file");
        }
    }
}

/// Extracts the total-size component of a `Content-Range: bytes a-b/total`
/// header. Returns `None` for an absent header or an unknown (`*`) total.
fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse::<u64>()
        .ok()
}
