use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SinkError;
use crate::measurement::Measurement;
use crate::schema::{CsvSchema, EpochRenderer};

/// Where CSV rows go.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Destination {
    Stdout,
    /// Opened once in create+append mode and held for the whole run.
    AppendFile(PathBuf),
}

impl Destination {
    /// An absent or empty path selects standard output.
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => Destination::AppendFile(path),
            _ => Destination::Stdout,
        }
    }
}

/// Writes one CSV row per measurement, preceded by the header row when the
/// destination still lacks one.
///
/// Every row is flushed before [`CsvEmitter::emit`] returns, so a reader of
/// the destination only ever sees whole lines.
pub struct CsvEmitter<W: Write> {
    writer: csv::Writer<W>,
    schema: CsvSchema,
    renderer: Box<dyn EpochRenderer>,
    header_pending: bool,
}

impl<W: Write> CsvEmitter<W> {
    /// `header_pending` says whether the first emitted row must be preceded
    /// by the header.
    pub fn new(
        inner: W,
        schema: CsvSchema,
        renderer: Box<dyn EpochRenderer>,
        header_pending: bool,
    ) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        Self {
            writer,
            schema,
            renderer,
            header_pending,
        }
    }

    pub fn emit(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        if self.header_pending {
            self.writer.write_record(self.schema.header())?;
        }
        let row = self.schema.row(measurement, self.renderer.as_ref());
        self.writer.write_record(&row)?;
        self.writer.flush().map_err(SinkError::Flush)?;

        self.header_pending = false;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl CsvEmitter<File> {
    /// Opens `path` for appending. The header is written with the first row
    /// only if `path` did not already hold a non-empty file.
    pub fn append_to(
        path: &Path,
        schema: CsvSchema,
        renderer: Box<dyn EpochRenderer>,
    ) -> Result<Self, SinkError> {
        let (file, header_pending) = open_append(path)?;
        Ok(Self::new(file, schema, renderer, header_pending))
    }
}

impl CsvEmitter<Box<dyn Write>> {
    pub fn open(
        destination: &Destination,
        schema: CsvSchema,
        renderer: Box<dyn EpochRenderer>,
    ) -> Result<Self, SinkError> {
        let (inner, header_pending): (Box<dyn Write>, bool) = match destination {
            Destination::Stdout => (Box::new(io::stdout()), true),
            Destination::AppendFile(path) => {
                let (file, header_pending) = open_append(path)?;
                (Box::new(file), header_pending)
            }
        };
        Ok(Self::new(inner, schema, renderer, header_pending))
    }
}

// A header is due unless a regular, non-empty file is already there.
fn open_append(path: &Path) -> Result<(File, bool), SinkError> {
    let header_pending = match fs::metadata(path) {
        Ok(meta) => !meta.is_file() || meta.len() == 0,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(source) => {
            return Err(SinkError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = ?path, header = header_pending, "opened CSV output for appending");
    Ok((file, header_pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use crate::measurement::normalize_frame;
    use crate::schema::UtcTime;

    fn measurement(host: &str, bytes: u64) -> Measurement {
        let text = format!(
            r#"{{"start": {{"connected": [{{"remote_host": "{host}", "local_port": 1, "remote_port": 2}}], "timestamp": {{"timesecs": 0}}}},
"end": {{"sum_received": {{"seconds": 2, "bytes": {bytes}}}, "sum_sent": {{"bytes": {bytes}}}}}}}"#
        );
        normalize_frame(&RawFrame::from(text)).unwrap()
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn empty_path_selects_stdout() {
        assert_eq!(Destination::from_path(None), Destination::Stdout);
        assert_eq!(
            Destination::from_path(Some(PathBuf::new())),
            Destination::Stdout
        );
        assert_eq!(
            Destination::from_path(Some(PathBuf::from("out.csv"))),
            Destination::AppendFile(PathBuf::from("out.csv"))
        );
    }

    #[test]
    fn header_precedes_only_the_first_row() {
        let mut emitter = CsvEmitter::new(Vec::new(), CsvSchema::Epoch, Box::new(UtcTime), true);
        emitter.emit(&measurement("a", 10)).unwrap();
        emitter.emit(&measurement("b", 20)).unwrap();

        let out = lines(emitter.get_ref());
        assert_eq!(
            out,
            [
                "EpochStart,IP,LocalPort,RemotePort,Duration(sec),BytesReceived,BytesSent,BandwidthRx(Bps),BandwidthTx(Bps)",
                "0,a,1,2,2,10,10,5,5",
                "0,b,1,2,2,20,20,10,10",
            ]
        );
    }

    #[test]
    fn fields_needing_quotes_are_escaped() {
        let mut emitter = CsvEmitter::new(Vec::new(), CsvSchema::Epoch, Box::new(UtcTime), false);
        emitter.emit(&measurement("odd,\\\"host\\\"", 4)).unwrap();
        let out = lines(emitter.get_ref());
        assert_eq!(out, ["0,\"odd,\"\"host\"\"\",1,2,2,4,4,2,2"]);
    }

    #[test]
    fn existing_file_keeps_its_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        for host in ["first", "second"] {
            let mut emitter =
                CsvEmitter::append_to(&path, CsvSchema::HumanAndEpoch, Box::new(UtcTime)).unwrap();
            emitter.emit(&measurement(host, 8)).unwrap();
            emitter.emit(&measurement(host, 8)).unwrap();
        }

        let out = lines(&std::fs::read(&path).unwrap());
        assert_eq!(out.len(), 5);
        assert!(out[0].starts_with("#timestampTestStart,epochTestStart,IP"));
        assert_eq!(out[1], "1970-01-01 00:00:00,0,first,1,2,2,8,8,4,4");
        assert!(out[3].contains(",second,"));
        assert_eq!(out.iter().filter(|l| l.starts_with('#')).count(), 1);
    }

    #[test]
    fn empty_existing_file_still_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, b"").unwrap();

        let mut emitter = CsvEmitter::append_to(&path, CsvSchema::Epoch, Box::new(UtcTime)).unwrap();
        emitter.emit(&measurement("h", 2)).unwrap();

        let out = lines(&std::fs::read(&path).unwrap());
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("EpochStart,"));
    }

    #[cfg(unix)]
    #[test]
    fn metadata_failure_other_than_not_found_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let path = not_a_dir.join("results.csv");

        let err = CsvEmitter::append_to(&path, CsvSchema::Epoch, Box::new(UtcTime))
            .err()
            .expect("open must fail");
        match err {
            SinkError::Open { source, .. } => {
                assert_ne!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unopenable_path_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("results.csv");
        let err = CsvEmitter::append_to(&path, CsvSchema::Epoch, Box::new(UtcTime))
            .err()
            .expect("open must fail");
        assert!(matches!(err, SinkError::Open { .. }));
    }
}
