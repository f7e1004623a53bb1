use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::NormalizeError;
use crate::frame::RawFrame;

/// One iperf3 test result, reduced to the columns written out as CSV.
///
/// Only [`normalize_frame`] builds these, and only from a report carrying
/// every required field.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    remote_host: String,
    local_port: u16,
    remote_port: u16,
    epoch_start: i64,
    duration_sec: Number,
    bytes_received: u64,
    bytes_sent: u64,
    bandwidth_rx: u64,
    bandwidth_tx: u64,
}

impl Measurement {
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Test start as Unix seconds.
    pub fn epoch_start(&self) -> i64 {
        self.epoch_start
    }

    /// Receiver-side test duration, as the producer wrote it.
    pub fn duration_sec(&self) -> &Number {
        &self.duration_sec
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Received bytes per second (bytes, not bits).
    pub fn bandwidth_rx(&self) -> u64 {
        self.bandwidth_rx
    }

    /// Sent bytes per second (bytes, not bits).
    pub fn bandwidth_tx(&self) -> u64 {
        self.bandwidth_tx
    }
}

#[derive(Debug, Deserialize)]
struct StartFields {
    start: StartSection,
}

#[derive(Debug, Deserialize)]
struct StartSection {
    #[serde(deserialize_with = "first_connection")]
    connected: Connection,
    timestamp: Timestamp,
}

#[derive(Debug, Deserialize)]
struct Connection {
    remote_host: String,
    local_port: u16,
    remote_port: u16,
}

#[derive(Debug, Deserialize)]
struct Timestamp {
    timesecs: i64,
}

#[derive(Debug, Deserialize)]
struct EndFields {
    end: EndSection,
}

#[derive(Debug, Deserialize)]
struct EndSection {
    sum_received: ReceivedTotals,
    sum_sent: SentTotals,
}

#[derive(Debug, Deserialize)]
struct ReceivedTotals {
    seconds: Number,
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct SentTotals {
    bytes: u64,
}

// iperf3 lists one entry per parallel stream; the first one identifies the test.
fn first_connection<'de, D>(deserializer: D) -> Result<Connection, D::Error>
where
    D: Deserializer<'de>,
{
    struct FirstConnection;

    impl<'de> Visitor<'de> for FirstConnection {
        type Value = Connection;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-empty array of connections")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Connection, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let first = seq
                .next_element::<Connection>()?
                .ok_or_else(|| de::Error::invalid_length(0, &self))?;
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(first)
        }
    }

    deserializer.deserialize_seq(FirstConnection)
}

/// Parses one frame and extracts the fields of a [`Measurement`].
///
/// Checks run in order and the first failure wins: JSON syntax, then a
/// producer-reported `error` key, then the `start` fields, then the `end`
/// fields, then the duration used as divisor.
pub fn normalize_frame(frame: &RawFrame) -> Result<Measurement, NormalizeError> {
    let report: Value = serde_json::from_str(frame.as_str()).map_err(NormalizeError::JsonSyntax)?;

    if let Some(error) = report.get("error") {
        let text = match error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(NormalizeError::ProducerReported(text));
    }

    let StartFields { start } =
        StartFields::deserialize(&report).map_err(NormalizeError::MissingStartFields)?;
    let EndFields { end } =
        EndFields::deserialize(&report).map_err(NormalizeError::MissingEndFields)?;

    let seconds = end.sum_received.seconds.as_f64().unwrap_or(f64::NAN);
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(NormalizeError::InvalidDuration { seconds });
    }

    Ok(Measurement {
        remote_host: start.connected.remote_host,
        local_port: start.connected.local_port,
        remote_port: start.connected.remote_port,
        epoch_start: start.timestamp.timesecs,
        duration_sec: end.sum_received.seconds,
        bytes_received: end.sum_received.bytes,
        bytes_sent: end.sum_sent.bytes,
        bandwidth_rx: bytes_per_second(end.sum_received.bytes, seconds),
        bandwidth_tx: bytes_per_second(end.sum_sent.bytes, seconds),
    })
}

/// Rounds half to even, so `2.5` becomes `2` and `3.5` becomes `4`.
pub fn bytes_per_second(bytes: u64, seconds: f64) -> u64 {
    (bytes as f64 / seconds).round_ties_even() as u64
}
