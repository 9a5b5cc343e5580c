//! Centralized error types for mailbinder.
//!
//! Failures are layered by the smallest unit that caused them:
//!
//! * [`EmbedError`]: one attachment payload could not be embedded. Always
//!   downgraded to a broken-attachment outcome, never propagated.
//! * [`MessageError`]: one message could not be parsed or rendered. Turned
//!   into a placeholder document or a recorded failure; the batch continues.
//! * [`BinderError`]: fatal for the run: bad configuration, an internal
//!   invariant violation, or output that cannot be written.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors produced by the mailbinder library.
#[derive(Error, Debug)]
pub enum BinderError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input does not exist.
    #[error("Input not found: {0}")]
    FileNotFound(PathBuf),

    /// The input is neither an `.eml` file, an MBOX archive, nor a directory.
    #[error("Unsupported input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// Split thresholds contradict each other or are out of range.
    #[error("Invalid split policy: {0}")]
    SplitPolicy(String),

    /// Any other configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fingerprint was recorded twice within one ledger scope.
    #[error("Fingerprint {fingerprint} already recorded in this part (first seen in '{first_seen}')")]
    DuplicateRecord {
        fingerprint: String,
        first_seen: String,
    },

    /// A worker thread panicked while processing a submission.
    #[error("Worker panicked while processing submission #{sequence}")]
    WorkerPanicked { sequence: u64 },

    /// PDF serialisation or merging failed.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// An output artifact could not be written.
    #[error("Failed to write output '{path}': {reason}")]
    Output { path: PathBuf, reason: String },

    /// The pipeline lost track of a submission.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Convenience alias for `Result<T, BinderError>`.
pub type Result<T> = std::result::Result<T, BinderError>;

impl BinderError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for BinderError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// A non-fatal failure of a whole message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The raw bytes are not a parseable RFC 5322 message.
    #[error("parse error: {0}")]
    Parse(String),

    /// The render backend could not produce the body document.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// The source could not be read.
    #[error("unreadable input: {0}")]
    Unreadable(String),

    /// The worker processing this message panicked.
    #[error("worker panicked")]
    Panicked,
}

/// A render backend failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RenderError(pub String);

/// An attachment payload that cannot be embedded as a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The payload is empty.
    #[error("attachment is empty")]
    Empty,

    /// The payload is not a readable PDF.
    #[error("malformed PDF: {0}")]
    Malformed(String),

    /// The PDF parsed but has no pages.
    #[error("PDF has no pages")]
    NoPages,
}
