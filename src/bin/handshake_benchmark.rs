//! Measures the produce-to-consume latency of the file-backed log:
//! 128 records are round-tripped through `/tmp/deadbeef.log` by two parallel threads,
//! each latency being printed to stdout, followed by their average.\
//! Aborts the process if not every record was produced & consumed exactly once.

use mini_kafka::{
    channel::wait_strategy::BusySpin,
    BenchmarkConfig, BenchmarkHarness, Instruments,
};
use std::io::{self, Write};
use log::{error, LevelFilter};


const INSTRUMENTS: usize = {Instruments::LogsWithoutMetrics.into()};


fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().with_utc_timestamps().with_level(LevelFilter::Info).init().unwrap_or_else(|_| eprintln!("--> LOGGER WAS ALREADY STARTED"));

    let report = BenchmarkHarness::<INSTRUMENTS>::new(BenchmarkConfig::default())
        .run(BusySpin)?;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    report.write_to(&mut stdout)?;
    stdout.flush()?;

    if let Some(err) = &report.producer_error {
        error!("Handshake benchmark: the producer failed: {err}");
    }
    if let Some(err) = &report.consumer_error {
        error!("Handshake benchmark: the consumer failed: {err}");
    }
    if let Err(err) = report.verify() {
        error!("Handshake benchmark: {err} -- aborting");
        std::process::abort();
    }
    Ok(())
}
