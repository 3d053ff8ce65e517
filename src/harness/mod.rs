//! The two operating modes built on the file-backed [channel](crate::channel):
//!   - [BenchmarkHarness] -- bounded: round-trips a fixed number of records, measuring each one's produce-to-consume latency;
//!   - [StreamHarness] -- unbounded: produces & consumes the alphabet, over and over, on a fixed pace, until cancelled.

mod benchmark;
mod stream;

pub use benchmark::{BenchmarkConfig, BenchmarkHarness, BenchmarkReport, TimestampSample};
pub use stream::{StreamConfig, StreamHarness, StreamReport};

use crate::errors::{LogError, Result};
use std::{
    fs::OpenOptions,
    path::Path,
};


/// Creates -- or empties -- the log file at `path`, so a new run never tails what a previous one appended
/// and both ends may be opened regardless of which one starts first
pub fn prepare_log_file(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LogError::FileOpen { path: path.display().to_string(), source })
}


/// Unit tests the [harness](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    #[cfg_attr(not(doc),test)]
    fn stale_logs_are_emptied() {
        const PATH: &str = "/tmp/mini_kafka_stale_logs_are_emptied.test.log";
        std::fs::write(PATH, b"left by a previous run").expect("writing the stale log");
        prepare_log_file(PATH).expect("preparing the log");
        assert_eq!(std::fs::metadata(PATH).expect("the log should exist").len(), 0, "the stale log wasn't emptied");
    }

}
