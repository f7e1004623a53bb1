use std::io::{Read, Write};

use tracing::warn;

use crate::config::IngestLimits;
use crate::error::{ConvertError, FailureKind, SinkError};
use crate::frame::{FrameExtractor, FrameRecord};
use crate::measurement::normalize_frame;
use crate::sink::CsvEmitter;
use crate::summary::RunSummary;

/// Drives frames from an input stream through normalization into a CSV sink,
/// one frame at a time.
pub struct Converter<W: Write> {
    emitter: CsvEmitter<W>,
    limits: IngestLimits,
    summary: RunSummary,
}

impl<W: Write> Converter<W> {
    pub fn new(emitter: CsvEmitter<W>, limits: IngestLimits) -> Self {
        Self {
            emitter,
            limits,
            summary: RunSummary::default(),
        }
    }

    /// Consumes `input` until end of stream.
    ///
    /// Per-frame failures are logged and counted; only input read errors and
    /// sink failures stop the run. The counters gathered up to that point
    /// stay available through [`Converter::summary`] either way.
    pub fn run<R: Read>(&mut self, input: R) -> Result<(), ConvertError> {
        for record in FrameExtractor::new(input, self.limits) {
            process_frame(record?, &mut self.emitter, &mut self.summary)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn emitter(&self) -> &CsvEmitter<W> {
        &self.emitter
    }
}

/// Normalizes one completed frame and writes its row.
///
/// Returns whether a row was written.
pub fn process_frame<W: Write>(
    record: FrameRecord,
    emitter: &mut CsvEmitter<W>,
    summary: &mut RunSummary,
) -> Result<bool, SinkError> {
    let FrameRecord {
        first_line,
        last_line,
        outcome,
    } = record;

    let frame = match outcome {
        Ok(frame) => frame,
        Err(error) => {
            warn!(first_line, last_line, %error, "discarding unreadable iperf3 measurement frame");
            summary.record_failure(FailureKind::JsonSyntax);
            return Ok(false);
        }
    };

    let measurement = match normalize_frame(&frame) {
        Ok(measurement) => measurement,
        Err(error) => {
            warn!(first_line, last_line, "{error}");
            summary.record_failure(error.kind());
            return Ok(false);
        }
    };
    summary.record_measurement();

    emitter.emit(&measurement)?;
    summary.record_line_written();
    Ok(true)
}
