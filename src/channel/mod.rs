//! The file-backed channel: a [LogWriter] appending [Record]s to a shared, append-only file
//! and a [LogReader] tailing it from its own offset cursor.\
//! The two ends never reference each other -- the file is their only synchronization object -- and there must be
//! exactly one of each per file: appends are not fenced against concurrent producers.
//!
//! Usage:
//! ```nocompile
//!    let mut writer = LogWriter::<File, 0>::open("/tmp/deadbeef.log", Framing::Tagged)?;
//!    let mut reader = LogReader::<File, BusySpin, 0>::open("/tmp/deadbeef.log", Framing::Tagged, BusySpin)?;
//!    writer.append(Record::Data(42))?;
//!    writer.append(Record::EndOfStream)?;
//!    reader.tail(&Cancellation::new(), |record| { println!("{record:?}"); ControlFlow::Continue(()) })?;
//! ```

mod record;
mod writer;
mod reader;
pub mod wait_strategy;

pub use record::{Decoded, Framing, Record, RecordDecoder};
pub use writer::{LogWriter, MAX_SEQUENCE_LEN};
pub use reader::{AtomicReaderState, LogReader, PollMiss, ReaderState, TailOutcome, TailStats, DEFAULT_READ_BUFFER_SIZE};


/// Tests the two ends working together through a real file
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use super::wait_strategy::BusySpin;
    use crate::types::Cancellation;
    use std::{
        fs::File,
        ops::ControlFlow,
        time::Duration,
    };

    #[ctor::ctor]
    fn suite_setup() {
        simple_logger::SimpleLogger::new().with_utc_timestamps().init().unwrap_or_else(|_| eprintln!("--> LOGGER WAS ALREADY STARTED"));
    }

    /// the reader sees every appended byte, in the append order, through independently opened handles
    #[cfg_attr(not(doc),test)]
    fn file_round_trip() {
        const PATH: &str = "/tmp/mini_kafka_file_round_trip.test.log";
        File::create(PATH).expect("creating the test log");
        let mut reader = LogReader::<File, BusySpin, 0>::open(PATH, Framing::Tagged, BusySpin).expect("opening the reader");
        let cancellation = Cancellation::new();
        crossbeam::scope(|scope| {
            scope.spawn(|_| {
                let mut writer = LogWriter::<File, 0>::open(PATH, Framing::Tagged).expect("opening the writer");
                std::thread::sleep(Duration::from_millis(10));
                for payload in [3, 1, 4, 1, 5] {
                    writer.append(Record::Data(payload)).expect("appending");
                }
                writer.append(Record::EndOfStream).expect("appending the end of stream");
            });
            let mut observed = vec![];
            let outcome = reader.tail(&cancellation, |record| { observed.push(record); ControlFlow::Continue(()) })
                .expect("tailing");
            assert_eq!(outcome, TailOutcome::EndOfStream);
            assert_eq!(observed, [3, 1, 4, 1, 5].into_iter().map(Record::Data).chain([Record::EndOfStream]).collect::<Vec<_>>());
        }).expect("the writer thread panicked");
        assert_eq!(reader.offset(), 12, "5 data frames + the end of stream frame should have been read");
    }

}
