use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use iperf3_csv::{
    ConvertConfig, ConvertError, Converter, CsvEmitter, CsvSchema, Destination, LocalTime,
    RunSummary, SinkError,
};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "iperf3tocsv", version)]
#[command(about = "Convert iperf3 --json output read from stdin into CSV rows")]
struct Cli {
    /// CSV file to append rows to; when absent or empty, rows go to stdout.
    #[arg(long, value_name = "PATH")]
    output_csv: Option<PathBuf>,

    /// Column layout of the CSV output.
    #[arg(long, value_enum, default_value_t = Format::Human)]
    format: Format,

    /// Diagnostic verbosity (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
enum Format {
    /// Local date-time and Unix epoch of the test start.
    Human,
    /// Unix epoch of the test start only.
    Epoch,
}

impl From<Format> for CsvSchema {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => CsvSchema::HumanAndEpoch,
            Format::Epoch => CsvSchema::Epoch,
        }
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("invalid log level {level:?}: {source}")]
    LogLevel {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("failed to write run summary: {0}")]
    Report(#[source] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("iperf3tocsv: {err}");
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "conversion aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) -> Result<(), Error> {
    let filter = EnvFilter::try_new(level).map_err(|source| Error::LogLevel {
        level: level.to_string(),
        source,
    })?;
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = ConvertConfig {
        schema: cli.format.into(),
        ..ConvertConfig::default()
    };
    let destination = Destination::from_path(cli.output_csv);

    let emitter = match CsvEmitter::open(&destination, config.schema, Box::new(LocalTime)) {
        Ok(emitter) => emitter,
        Err(err) => {
            report(&RunSummary::default())?;
            return Err(err.into());
        }
    };

    let mut converter = Converter::new(emitter, config.limits);
    let outcome = converter.run(io::stdin().lock());
    report(converter.summary())?;
    Ok(outcome?)
}

fn report(summary: &RunSummary) -> Result<(), Error> {
    summary
        .write_report(&mut io::stderr().lock())
        .map_err(Error::Report)
}
