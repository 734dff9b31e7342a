//! Resumable HTTP Transfer Engine
//!
//! This library is the download engine of a browser-like application: it
//! accepts URLs, opens streaming HTTP transfers, writes bytes to disk
//! incrementally, tracks throughput, and supports pause/resume/cancel of
//! in-flight transfers, including resumption via byte-range requests.
//!
//! # Architecture
//!
//! - [`engine`] - the [`DownloadEngine`] façade: start/pause/resume/cancel,
//!   snapshot reads, event subscription
//! - [`record`] - transfer records, the status state machine, and events
//! - [`filename`] - safe filename derivation and collision-free paths
//! - [`client`] - reqwest wrapper with timeout and status handling
//! - [`speed`] - throttled throughput sampling
//!
//! The registry and worker modules are internal: callers interact with
//! transfers only through the engine façade.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod constants;
pub mod engine;
pub mod error;
pub mod filename;
pub mod record;
mod registry;
pub mod speed;
mod worker;

// Re-export commonly used types
pub use client::HttpClient;
pub use engine::DownloadEngine;
pub use error::{EngineError, TransferError};
pub use filename::{filename_from_url, is_downloadable_url, resolve_unique_path, sanitize_filename};
pub use record::{TransferEvent, TransferId, TransferRecord, TransferStatus};
pub use speed::SpeedTracker;
