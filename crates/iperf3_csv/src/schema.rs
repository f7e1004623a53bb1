use chrono::{Local, TimeZone, Utc};

use crate::measurement::Measurement;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HUMAN_AND_EPOCH_HEADER: [&str; 10] = [
    "#timestampTestStart",
    "epochTestStart",
    "IP",
    "LocalPort",
    "RemotePort",
    "Duration(sec)",
    "BytesReceived",
    "BytesSent",
    "BandwidthRx(Bps)",
    "BandwidthTx(Bps)",
];

const EPOCH_HEADER: [&str; 9] = [
    "EpochStart",
    "IP",
    "LocalPort",
    "RemotePort",
    "Duration(sec)",
    "BytesReceived",
    "BytesSent",
    "BandwidthRx(Bps)",
    "BandwidthTx(Bps)",
];

/// Column layout of the CSV output.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum CsvSchema {
    /// A calendar timestamp column followed by the epoch and the measurement,
    /// for spreadsheet tools that cannot read Unix epochs.
    #[default]
    HumanAndEpoch,
    /// The epoch followed by the measurement.
    Epoch,
}

impl CsvSchema {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            CsvSchema::HumanAndEpoch => &HUMAN_AND_EPOCH_HEADER,
            CsvSchema::Epoch => &EPOCH_HEADER,
        }
    }

    pub fn row(self, measurement: &Measurement, renderer: &dyn EpochRenderer) -> Vec<String> {
        let mut row = Vec::with_capacity(self.header().len());
        if self == CsvSchema::HumanAndEpoch {
            let epoch = measurement.epoch_start();
            row.push(renderer.render(epoch).unwrap_or_else(|| epoch.to_string()));
        }
        row.extend([
            measurement.epoch_start().to_string(),
            measurement.remote_host().to_string(),
            measurement.local_port().to_string(),
            measurement.remote_port().to_string(),
            measurement.duration_sec().to_string(),
            measurement.bytes_received().to_string(),
            measurement.bytes_sent().to_string(),
            measurement.bandwidth_rx().to_string(),
            measurement.bandwidth_tx().to_string(),
        ]);
        row
    }
}

/// Turns a Unix epoch into the human-readable timestamp column.
///
/// `None` means the epoch is outside what the calendar can represent.
pub trait EpochRenderer {
    fn render(&self, epoch: i64) -> Option<String>;
}

/// Renders in the machine's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTime;

impl EpochRenderer for LocalTime {
    fn render(&self, epoch: i64) -> Option<String> {
        Local
            .timestamp_opt(epoch, 0)
            .earliest()
            .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UtcTime;

impl EpochRenderer for UtcTime {
    fn render(&self, epoch: i64) -> Option<String> {
        Utc.timestamp_opt(epoch, 0)
            .single()
            .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
    }
}
