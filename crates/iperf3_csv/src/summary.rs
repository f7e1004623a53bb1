use std::fmt;
use std::io::{self, Write};

use crate::error::FailureKind;

/// Per-run counters, reported once the input stream ends.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Frames that were not valid JSON or lacked required fields.
    pub json_parse_failures: u64,
    /// Frames that parsed as JSON, whether usable or not.
    pub num_measurements: u64,
    /// Parsed frames carrying a producer `error` key.
    pub measurements_with_errors: u64,
    pub csv_lines_written: u64,
}

impl RunSummary {
    pub fn record_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::JsonSyntax => self.json_parse_failures += 1,
            FailureKind::ProducerReported => {
                self.num_measurements += 1;
                self.measurements_with_errors += 1;
            }
            FailureKind::MissingStartFields | FailureKind::MissingEndFields => {
                self.num_measurements += 1;
                self.json_parse_failures += 1;
            }
        }
    }

    pub fn record_measurement(&mut self) {
        self.num_measurements += 1;
    }

    pub fn record_line_written(&mut self) {
        self.csv_lines_written += 1;
    }

    pub fn entries(&self) -> [(&'static str, u64); 4] {
        [
            ("JsonParseFailures", self.json_parse_failures),
            ("NumMeasurements", self.num_measurements),
            ("MeasurementsWithErrors", self.measurements_with_errors),
            ("CsvLinesWritten", self.csv_lines_written),
        ]
    }

    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{self}")?;
        out.flush()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in self.entries() {
            writeln!(f, "{name}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_count_as_parsed_and_failed() {
        let mut summary = RunSummary::default();
        summary.record_failure(FailureKind::MissingEndFields);
        summary.record_failure(FailureKind::JsonSyntax);
        assert_eq!(summary.num_measurements, 1);
        assert_eq!(summary.json_parse_failures, 2);
        assert_eq!(summary.measurements_with_errors, 0);
    }

    #[test]
    fn report_lists_one_counter_per_line() {
        let summary = RunSummary {
            json_parse_failures: 1,
            num_measurements: 3,
            measurements_with_errors: 1,
            csv_lines_written: 1,
        };
        let mut out = Vec::new();
        summary.write_report(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "JsonParseFailures: 1\nNumMeasurements: 3\nMeasurementsWithErrors: 1\nCsvLinesWritten: 1\n"
        );
    }
}
