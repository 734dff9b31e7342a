//! Error types for the transfer engine.
//!
//! Two layers, matching how errors surface to callers:
//!
//! - [`EngineError`] — control-plane errors returned synchronously from
//!   `start_download`/`pause`/`resume`/`cancel`/`get`.
//! - [`TransferError`] — failures inside a running worker. These never cross
//!   the registry boundary as errors; the worker captures them into the
//!   record's `error` field and moves the record to `Failed`.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::{TransferId, TransferStatus};

/// Errors returned synchronously by engine control operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The provided URL is malformed or unparseable.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// No active transfer exists for the given id.
    #[error("no active transfer with id {id}")]
    NotFound {
        /// The unknown or expired id.
        id: TransferId,
    },

    /// The operation is illegal for the transfer's current status
    /// (e.g. resuming a transfer that is not paused).
    #[error("transfer {id} is {status}, expected {expected}")]
    InvalidState {
        /// The transfer the operation referenced.
        id: TransferId,
        /// The status the transfer was actually in.
        status: TransferStatus,
        /// The status the operation requires.
        expected: &'static str,
    },
}

impl EngineError {
    /// Creates an invalid URL error.
    pub(crate) fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a not-found error.
    pub(crate) fn not_found(id: TransferId) -> Self {
        Self::NotFound { id }
    }

    /// Creates an invalid-state error.
    pub(crate) fn invalid_state(
        id: TransferId,
        status: TransferStatus,
        expected: &'static str,
    ) -> Self {
        Self::InvalidState {
            id,
            status,
            expected,
        }
    }
}

/// Failures inside a transfer worker.
///
/// These are rendered into the record's `error` string; callers observe them
/// only by polling or subscribing for `status = Failed`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS resolution, connection refused, TLS, or a
    /// mid-stream read failure).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Creates a network error from a reqwest error.
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub(crate) fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub(crate) fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error with path context.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// Note: no `From<reqwest::Error>` / `From<std::io::Error>` impls. The
// variants require context (url, path) the source errors don't carry, so the
// helper constructors are the conversion surface.
