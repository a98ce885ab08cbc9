//! cadence - frequency fingerprinting of event streams
//!
//! Usage:
//!   cadence analyze --input events.jsonl --config cadence.json
//!   cadence simulate --period 15 --jitter 0.02 --count 200 | cadence analyze
//!   cadence signatures

use cadence_core::simulation::{AmplitudeModel, StreamSpec, generate};
use cadence_core::{DetectionResult, EngineConfig, EngineError, FingerprintEngine};
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const CHANNEL_CAPACITY: usize = 10_000;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Identify periodic event sources by their emission frequency")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse JSON-lines events and print one report per source
    Analyze {
        /// Input file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only report this source
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Print a synthetic periodic stream as JSON lines
    Simulate {
        /// Period in seconds
        #[arg(short, long)]
        period: f64,

        /// Timestamp jitter as a fraction of the period
        #[arg(short, long, default_value = "0.02")]
        jitter: f64,

        /// Number of events
        #[arg(short = 'n', long, default_value = "200")]
        count: usize,

        #[arg(long, default_value = "0")]
        seed: u64,

        #[arg(short, long, default_value = "lognormal")]
        amplitude: AmplitudeKind,

        #[arg(long, default_value = "sim")]
        source: String,
    },

    /// Print the active signature table
    Signatures {
        /// Engine configuration carrying a custom table
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum AmplitudeKind {
    Constant,
    Gaussian,
    Lognormal,
}

impl AmplitudeKind {
    fn model(self) -> AmplitudeModel {
        match self {
            Self::Constant => AmplitudeModel::Constant { value: 1.0 },
            Self::Gaussian => AmplitudeModel::Gaussian {
                mean: 100.0,
                std_dev: 10.0,
            },
            Self::Lognormal => AmplitudeModel::default(),
        }
    }
}

/// Timestamp as epoch seconds or an RFC 3339 string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(alias = "src")]
    source: String,
    #[serde(alias = "timestamp")]
    ts: RawTimestamp,
    #[serde(default = "default_value", alias = "v")]
    value: f64,
}

fn default_value() -> f64 {
    1.0
}

#[derive(Debug, Serialize)]
struct OutputRecord<'a> {
    source: &'a str,
    ts: f64,
    value: f64,
}

#[derive(Debug, Serialize)]
struct SourceReport<'a> {
    #[serde(flatten)]
    result: &'a DetectionResult,
    urgency: f64,
}

/// A parsed event ready for ingestion
#[derive(Debug)]
struct ParsedEvent {
    source: String,
    timestamp: f64,
    value: f64,
}

fn parse_timestamp(raw: &RawTimestamp) -> Option<f64> {
    match raw {
        RawTimestamp::Seconds(secs) => Some(*secs),
        RawTimestamp::Text(text) => text.trim().parse::<f64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|dt| dt.timestamp_micros() as f64 / 1e6)
        }),
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<ParsedEvent, EngineError> {
    let record: InputRecord = serde_json::from_str(line).map_err(|e| EngineError::InvalidInput {
        line: line_no,
        reason: e.to_string(),
    })?;
    let timestamp = parse_timestamp(&record.ts).ok_or_else(|| EngineError::InvalidInput {
        line: line_no,
        reason: "unparseable timestamp".to_string(),
    })?;
    Ok(ParsedEvent {
        source: record.source,
        timestamp,
        value: record.value,
    })
}

fn open_input(input: &str) -> io::Result<Box<dyn BufRead + Send>> {
    if input == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(input)?)))
    }
}

/// Reader thread: parse lines and forward them; stops at the first error.
fn spawn_reader(
    reader: Box<dyn BufRead + Send>,
    tx: Sender<Result<ParsedEvent, EngineError>>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("cadence-reader".into()).spawn(move || {
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let parsed = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_line(line_no, &line),
                Err(e) => Err(EngineError::InvalidInput {
                    line: line_no,
                    reason: e.to_string(),
                }),
            };
            let failed = parsed.is_err();
            if tx.send(parsed).is_err() || failed {
                break;
            }
        }
        debug!("Reader finished");
    })
}

fn ingest(engine: &FingerprintEngine, rx: Receiver<Result<ParsedEvent, EngineError>>) -> Result<usize, EngineError> {
    let mut lines = 0usize;
    for parsed in rx {
        let event = parsed?;
        lines += 1;
        if !engine.add_event(&event.source, event.timestamp, event.value) {
            warn!(source = %event.source, ts = event.timestamp, "Dropped malformed or stale event");
        }
    }
    Ok(lines)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, EngineError> {
    match path {
        Some(path) => EngineConfig::from_json_file(path),
        None => Ok(EngineConfig::default()),
    }
}

fn run_analyze(input: &str, config: Option<&Path>, only: Option<&str>) -> Result<(), Box<dyn Error>> {
    let engine = FingerprintEngine::new(load_config(config)?);
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    let reader = spawn_reader(open_input(input)?, tx)?;

    let ingested = ingest(&engine, rx);
    if reader.join().is_err() {
        warn!("Reader thread panicked");
    }
    let lines = ingested?;

    let stats = engine.stats();
    info!(
        lines,
        sources = stats.sources,
        accepted = stats.events_accepted,
        dropped = stats.events_dropped,
        "Ingestion complete"
    );

    let sources = match only {
        Some(label) => vec![label.to_string()],
        None => engine.sources(),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for source in sources {
        let result = engine.tick_uncached(&source);
        let report = SourceReport {
            result: &result,
            urgency: engine.urgency_score(&source),
        };
        writeln!(out, "{}", serde_json::to_string(&report)?)?;
    }
    Ok(())
}

fn run_simulate(
    period: f64,
    jitter: f64,
    count: usize,
    seed: u64,
    amplitude: AmplitudeKind,
    source: &str,
) -> Result<(), Box<dyn Error>> {
    if !(period.is_finite() && period > 0.0) {
        return Err("period must be positive".into());
    }
    let spec = StreamSpec::new(period, count)
        .jitter(jitter)
        .amplitude(amplitude.model())
        .seed(seed);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in generate(&spec) {
        let record = OutputRecord {
            source,
            ts: event.timestamp,
            value: event.value,
        };
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }
    Ok(())
}

fn run_signatures(config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let library = load_config(config)?.signature_library();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for signature in library.iter() {
        writeln!(out, "{}", serde_json::to_string(signature)?)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Analyze {
            input,
            config,
            source,
        } => run_analyze(&input, config.as_deref(), source.as_deref()),
        Commands::Simulate {
            period,
            jitter,
            count,
            seed,
            amplitude,
            source,
        } => run_simulate(period, jitter, count, seed, amplitude, &source),
        Commands::Signatures { config } => run_signatures(config.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
