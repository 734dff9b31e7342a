//! HTTP client wrapper for streaming transfers.
//!
//! Owns the reqwest client configuration (timeouts, pooling) and maps
//! transport failures and error statuses into [`TransferError`]. Created once
//! by the engine and cloned per worker to share the connection pool.

use reqwest::Client;
use reqwest::header::RANGE;
use std::time::Duration;
use tracing::debug;

use crate::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::error::TransferError;

/// HTTP client for streaming downloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Sends a GET request, optionally ranged from `range_offset`.
    ///
    /// Applies raise-for-status semantics: any non-success response becomes
    /// [`TransferError::HttpStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Timeout`] on request timeout,
    /// [`TransferError::Network`] on transport failure, and
    /// [`TransferError::HttpStatus`] on 4xx/5xx responses.
    pub async fn send_get(
        &self,
        url: &str,
        range_offset: Option<u64>,
    ) -> Result<reqwest::Response, TransferError> {
        let mut request = self.client.get(url);
        if let Some(offset) = range_offset {
            debug!(url = %url, offset, "sending ranged request");
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::timeout(url)
            } else {
                TransferError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }
}
