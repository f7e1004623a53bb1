use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Buckets per-record failures are counted in.
///
/// Framing problems and missing fields share the JSON-parse bucket with
/// genuine syntax errors; only producer-reported errors are counted apart.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailureKind {
    JsonSyntax,
    ProducerReported,
    MissingStartFields,
    MissingEndFields,
}

/// A frame that was opened and closed but could not be accumulated intact.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameError {
    #[error("invalid UTF-8 on line {line_number}")]
    InvalidUtf8 { line_number: usize },
    #[error(
        "line {line_number} too long (observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})"
    )]
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    #[error("frame exceeds {max_frame_bytes} bytes")]
    FrameTooLarge { max_frame_bytes: usize },
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to parse the JSON of an iperf3 measurement: {0}")]
    JsonSyntax(#[source] serde_json::Error),
    #[error("found an iperf3 measurement reporting an error: {0}")]
    ProducerReported(String),
    #[error("some key related to the 'start' object was not found: {0}")]
    MissingStartFields(#[source] serde_json::Error),
    #[error("some key related to the 'end' object was not found: {0}")]
    MissingEndFields(#[source] serde_json::Error),
    #[error("measurement duration {seconds} is not a positive number of seconds")]
    InvalidDuration { seconds: f64 },
}

impl NormalizeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            NormalizeError::JsonSyntax(_) => FailureKind::JsonSyntax,
            NormalizeError::ProducerReported(_) => FailureKind::ProducerReported,
            NormalizeError::MissingStartFields(_) => FailureKind::MissingStartFields,
            NormalizeError::MissingEndFields(_) | NormalizeError::InvalidDuration { .. } => {
                FailureKind::MissingEndFields
            }
        }
    }
}

/// The CSV destination could not be opened or written.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open CSV output {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write CSV row: {0}")]
    Write(#[from] csv::Error),
    #[error("failed to flush CSV output: {0}")]
    Flush(#[source] io::Error),
}

/// Failures that end a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("failed to read input at line {line_number}: {source}")]
    Source {
        line_number: usize,
        #[source]
        source: io::Error,
    },
}
