//! Streams 'a', 'b', ..., 'z', 'a', ... through `/tmp/deadbeef.log`, one letter per second,
//! echoing every consumed letter to stdout -- until Ctrl-C is pressed.

use mini_kafka::{Instruments, StreamConfig, StreamHarness};
use std::io;
use log::{info, LevelFilter};


const INSTRUMENTS: usize = {Instruments::LogsWithoutMetrics.into()};


#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().with_utc_timestamps().with_level(LevelFilter::Info).init().unwrap_or_else(|_| eprintln!("--> LOGGER WAS ALREADY STARTED"));

    let harness = StreamHarness::<_, INSTRUMENTS>::start(StreamConfig::default(), io::stdout())?;

    let cancellation = harness.cancellation();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Continuous stream: Ctrl-C received -- stopping");
            cancellation.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || harness.wait()).await??;
    ctrl_c.abort();
    info!("Continuous stream: {} records produced; {} consumed", report.produced, report.consumed);
    Ok(())
}
