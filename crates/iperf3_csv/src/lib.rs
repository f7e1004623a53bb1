#![forbid(unsafe_code)]
//! Streaming conversion of iperf3 `--json` output into CSV.
//!
//! iperf3 run in a loop prints one pretty-printed JSON report per test, with
//! the report's outer braces alone on their own lines, interleaved with
//! whatever else it writes. This crate provides:
//! - A frame extractor that rebuilds each report from the line stream with
//!   bounded memory.
//! - A normalizer that pulls the measured values out of a report.
//! - A CSV emitter that appends one row per measurement, writing the header
//!   only where the destination lacks one.
//! - Run counters reported at end of input.

mod config;
mod convert;
mod error;
mod frame;
mod measurement;
mod reader;
mod schema;
mod sink;
mod summary;

pub use config::{ConvertConfig, IngestLimits};
pub use convert::{process_frame, Converter};
pub use error::{ConvertError, FailureKind, FrameError, NormalizeError, SinkError};
pub use frame::{FrameExtractor, FrameRecord, RawFrame};
pub use measurement::{bytes_per_second, normalize_frame, Measurement};
pub use reader::{BoundedLine, SyncBoundedLineReader};
pub use schema::{CsvSchema, EpochRenderer, LocalTime, UtcTime};
pub use sink::{CsvEmitter, Destination};
pub use summary::RunSummary;
