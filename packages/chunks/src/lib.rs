#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Activity chunk pipeline: download, preprocessing, and the
//! aggregation merge step.
//!
//! Each chunk is one time-bucketed slice of the source activity dataset,
//! downloaded and processed independently: parse the raw tab-separated
//! rows, group them by (hour, weekday, cell), and optionally re-key the
//! result onto aggregated base stations produced by the assignment run.

pub mod activity;
pub mod download;
pub mod merge;
pub mod progress;
pub mod sink;

use thiserror::Error;

/// Errors that can occur in the chunk pipeline.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A required input file does not exist.
    #[error("Input path does not exist: {path}")]
    MissingInput {
        /// The missing path.
        path: String,
    },

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}: {body}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The response status code.
        status: u16,
        /// The response body, for diagnosis.
        body: String,
    },

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A chunk row could not be interpreted.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },
}
