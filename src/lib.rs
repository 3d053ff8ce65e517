#![doc = include_str!("../README.md")]

pub mod channel;
pub mod harness;

mod types;
mod errors;
mod instruments;

pub use types::{Cancellation, BENCHMARK_RECORDS, LOG_FILE_PATH, PACING_INTERVAL};
pub use errors::{LogError, Result};
pub use instruments::Instruments;
pub use channel::{Framing, LogReader, LogWriter, Record, ReaderState, TailOutcome, TailStats};
pub use harness::{BenchmarkConfig, BenchmarkHarness, BenchmarkReport, StreamConfig, StreamHarness, StreamReport};
