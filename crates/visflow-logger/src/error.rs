//! Error types for the recorder and its sinks.
//!
//! Uses `thiserror` for structured, matchable variants. Sink failures never
//! reach `run()` callers; they surface here only so sinks can report them to
//! the recorder, which logs and swallows them.

use thiserror::Error;

/// Errors surfaced to users of the logging primitives.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// A logging primitive was called outside any `run` scope. This is a
    /// programming error; dropping the entry silently would corrupt the
    /// trace's completeness guarantees, so it fails loudly instead.
    #[error("no active operation context; logging calls must run inside FlowLogger::run")]
    NoActiveContext,
}

/// Errors produced while shipping a finalized trace.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The POST request itself failed (connection, timeout, ...).
    #[error("trace transmission failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with a non-2xx status.
    #[error("trace collector rejected the batch: {status}")]
    Rejected { status: String },

    /// The 2xx response body was not valid base64 (or not UTF-8 once decoded).
    #[error("artifact decode failed: {reason}")]
    Decode { reason: String },
}
