//! Resting place for the [LogReader], the tailing end of the log channel.
//!
//! The reader keeps its own offset cursor into the log and polls for bytes past it:
//! ```text
//!            ┌────────────── retry (wait strategy) ─────────────┐
//!            v                                                  │
//!   ──> SEEKING ──(read = 0 bytes)──────────────────────────> WAITING
//!         │  ^
//!         │  └───────────────────────────────────────┐
//!         ├──(read = n bytes, cursor += n)──> DRAINING ──(end of stream / stop / cancellation)──> DONE
//!         └──(seek / read failed)──> ERROR             └──(corrupt frame)──> ERROR
//! ```

use super::{
    record::{Decoded, Framing, Record, RecordDecoder},
    wait_strategy::{BusySpin, WaitStrategy},
};
use crate::{
    errors::{LogError, Result},
    instruments::Instruments,
    types::Cancellation,
};
use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom},
    ops::ControlFlow,
    path::Path,
    sync::{
        Arc,
        atomic::Ordering::Relaxed,
    },
};
use atomic_enum::atomic_enum;
use keen_retry::RetryResult;
use log::{error, info, trace};


/// Bytes asked from the log on every read attempt
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64;

/// will derive `AtomicReaderState`
#[atomic_enum]
#[derive(PartialEq)]
pub enum ReaderState {
    /// positioning the file at the offset cursor -- the initial state
    Seeking,
    /// the last read returned zero bytes: the writer didn't catch up yet
    Waiting,
    /// delivering the bytes of a nonzero read
    Draining,
    /// terminal: the end of the stream was reached, the consumer asked to stop or the loop was cancelled
    Done,
    /// terminal: the file could not be repositioned, read or decoded
    Error,
}

/// Why [LogReader::tail()] returned without errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailOutcome {
    /// the producer's end-of-stream record was delivered
    EndOfStream,
    /// the consumer callback asked to stop
    Stopped,
    /// the [Cancellation] signal was asserted
    Cancelled,
}

/// Why a [LogReader::poll()] delivered no bytes
#[derive(Debug)]
pub enum PollMiss {
    /// The normal "nothing new yet" condition -- not an error: polling again is the answer
    EmptyRead,
    /// The `read` syscall was interrupted before reading anything
    Interrupted,
    /// The reader can't go on
    Failed(LogError),
}

/// Counters kept by every [LogReader]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    /// read attempts
    pub polls:       u64,
    /// read attempts that returned zero bytes
    pub empty_polls: u64,
    pub bytes_read:  u64,
    /// data records delivered to consumers
    pub records:     u64,
}


/// Tails the shared log from a monotonically advancing offset cursor, decoding & delivering [Record]s in the order they were appended.\
/// There must be a single reader per log file & it only ever reads at or before the file's current end -- so no locking is needed
/// against the (single) writer, which only appends past it.
#[derive(Debug)]
pub struct LogReader<Source: Read + Seek = File, Wait: WaitStrategy = BusySpin, const INSTRUMENTS: usize = 0> {
    name:      String,
    source:    Source,
    wait:      Wait,
    decoder:   RecordDecoder,
    /// the offset cursor: how many bytes were read from the log so far
    offset:    u64,
    buffer:    Box<[u8]>,
    /// bytes in `buffer` returned by the last read
    filled:    usize,
    /// bytes in `buffer` already handed to the decoder -- `buffer[delivered..filled]` is pending delivery
    delivered: usize,
    state:     Arc<AtomicReaderState>,
    stats:     TailStats,
}

impl<Wait: WaitStrategy, const INSTRUMENTS: usize> LogReader<File, Wait, INSTRUMENTS> {

    /// Opens the log file at `path` in read-only mode, with the offset cursor at 0.\
    /// Failing to open the file is fatal: it is reported and never retried.
    pub fn open(path: impl AsRef<Path>, framing: Framing, wait: Wait) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| LogError::FileOpen { path: path.display().to_string(), source })?;
        Ok(Self::from_source(path.display().to_string(), file, framing, wait))
    }

}

impl<Source: Read + Seek, Wait: WaitStrategy, const INSTRUMENTS: usize> LogReader<Source, Wait, INSTRUMENTS> {

    /// Tails any seekable `source` -- `name` is used in logs
    pub fn from_source<IntoString: Into<String>>(name: IntoString, source: Source, framing: Framing, wait: Wait) -> Self {
        let name = name.into();
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: reader '{name}' ready to tail {framing:?} records, waiting with the '{}' strategy", wait.name());
        }
        Self {
            name,
            source,
            wait,
            decoder:   RecordDecoder::new(framing),
            offset:    0,
            buffer:    vec![0; DEFAULT_READ_BUFFER_SIZE].into_boxed_slice(),
            filled:    0,
            delivered: 0,
            state:     Arc::new(AtomicReaderState::new(ReaderState::Seeking)),
            stats:     TailStats::default(),
        }
    }

    /// Changes how many bytes are asked for on each read attempt -- `1` mimics a byte-by-byte consumer
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.buffer = vec![0; read_buffer_size.max(1)].into_boxed_slice();
        self
    }

    /// A single read attempt at the offset cursor.\
    /// Bytes still pending delivery from a previous read are reported again without touching the log, so they are never skipped.
    ///   - `Ok` -- `output` bytes are available; the cursor was advanced by that amount;
    ///   - `Transient` -- nothing new in the log (or an interrupted syscall): the cursor is unchanged & polling again is the way to go;
    ///   - `Fatal` -- the reader can't go on: the log couldn't be repositioned or read.
    pub fn poll(&mut self) -> RetryResult<(), (), usize, PollMiss> {
        if self.delivered < self.filled {
            return RetryResult::Ok { reported_input: (), output: self.filled - self.delivered }
        }
        self.set_state(ReaderState::Seeking);
        if let Err(source) = self.source.seek(SeekFrom::Start(self.offset)) {
            return RetryResult::Fatal { input: (), error: PollMiss::Failed(LogError::Seek { offset: self.offset, source }) }
        }
        self.stats.polls += 1;
        match self.source.read(&mut self.buffer) {
            Ok(0) => {
                self.stats.empty_polls += 1;
                self.set_state(ReaderState::Waiting);
                if Instruments::from(INSTRUMENTS).tracing() {
                    trace!("mini-kafka: reader '{}': nothing new at offset {}", self.name, self.offset);
                }
                RetryResult::Transient { input: (), error: PollMiss::EmptyRead }
            },
            Ok(n) => {
                self.offset += n as u64;
                self.filled = n;
                self.delivered = 0;
                self.stats.bytes_read += n as u64;
                self.set_state(ReaderState::Draining);
                if Instruments::from(INSTRUMENTS).tracing() {
                    trace!("mini-kafka: reader '{}': read {n} bytes -- cursor now at {}", self.name, self.offset);
                }
                RetryResult::Ok { reported_input: (), output: n }
            },
            Err(err) if err.kind() == ErrorKind::Interrupted => RetryResult::Transient { input: (), error: PollMiss::Interrupted },
            Err(source) => RetryResult::Fatal { input: (), error: PollMiss::Failed(LogError::Read { offset: self.offset, source }) },
        }
    }

    /// The tailing loop: delivers, in order, every record appended to the log to `on_record` -- which may stop the loop
    /// by returning [ControlFlow::Break] -- waiting on empty reads as dictated by the [WaitStrategy], without bound.\
    /// Returns when the end of the stream is delivered, when `on_record` asks to stop, when `cancellation` is asserted
    /// or, with the reader in the [ReaderState::Error] state, when the log can't be repositioned, read or decoded.
    /// Records already delivered are unaffected by a failure.
    pub fn tail(&mut self, cancellation: &Cancellation, mut on_record: impl FnMut(Record) -> ControlFlow<()>) -> Result<TailOutcome> {
        let outcome = loop {
            if cancellation.is_cancelled() {
                break Ok(TailOutcome::Cancelled)
            }
            match self.poll() {
                RetryResult::Ok { .. } => match self.drain(&mut on_record) {
                    Ok(None)          => self.wait.on_data(),
                    Ok(Some(outcome)) => break Ok(outcome),
                    Err(err)          => break Err(err),
                },
                RetryResult::Transient { error, .. } |
                RetryResult::Fatal { error, .. } => match error {
                    PollMiss::EmptyRead     => self.wait.on_empty_read(),
                    PollMiss::Interrupted   => {},
                    PollMiss::Failed(err)   => break Err(err),
                },
            }
        };
        match &outcome {
            Ok(tail_outcome) => {
                self.set_state(ReaderState::Done);
                if Instruments::from(INSTRUMENTS).logging() {
                    info!("mini-kafka: reader '{}' finished tailing ({tail_outcome:?}) at offset {}{}",
                          self.name, self.offset, self.metrics_suffix());
                }
            },
            Err(err) => {
                self.set_state(ReaderState::Error);
                error!("mini-kafka: reader '{}' gave up tailing at offset {}: {err}{}", self.name, self.offset, self.metrics_suffix());
            },
        }
        outcome
    }

    /// Hands the pending bytes to the decoder & the decoded records to `on_record`.\
    /// Returns `Some` if the tailing loop should end
    fn drain(&mut self, on_record: &mut impl FnMut(Record) -> ControlFlow<()>) -> Result<Option<TailOutcome>> {
        while self.delivered < self.filled {
            let byte = self.buffer[self.delivered];
            let byte_offset = self.offset - (self.filled - self.delivered) as u64;
            self.delivered += 1;
            match self.decoder.feed(byte, byte_offset)? {
                Decoded::Incomplete => continue,
                Decoded::Record(Record::EndOfStream) => {
                    // the loop ends regardless of what the consumer answers
                    let _ = self.deliver(Record::EndOfStream, on_record);
                    return Ok(Some(TailOutcome::EndOfStream))
                },
                Decoded::Record(record) => if self.deliver(record, on_record).is_break() {
                    return Ok(Some(TailOutcome::Stopped))
                },
                Decoded::LastRecord(payload) => {
                    if self.deliver(Record::Data(payload), on_record).is_break() {
                        return Ok(Some(TailOutcome::Stopped))
                    }
                    // same as above: nothing follows the sentinel
                    let _ = self.deliver(Record::EndOfStream, on_record);
                    return Ok(Some(TailOutcome::EndOfStream))
                },
            }
        }
        Ok(None)
    }

    #[inline(always)]
    fn deliver(&mut self, record: Record, on_record: &mut impl FnMut(Record) -> ControlFlow<()>) -> ControlFlow<()> {
        if let Record::Data(_) = record {
            self.stats.records += 1;
        }
        if Instruments::from(INSTRUMENTS).tracing() {
            trace!("mini-kafka: reader '{}' delivering {record:?}", self.name);
        }
        on_record(record)
    }

    #[inline(always)]
    fn set_state(&self, state: ReaderState) {
        self.state.store(state, Relaxed);
    }

    fn metrics_suffix(&self) -> String {
        if Instruments::from(INSTRUMENTS).metrics() {
            format!(" -- {:?}", self.stats)
        } else {
            String::new()
        }
    }

    /// the offset cursor: how many bytes were read from the log so far -- never more than the log's length
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn state(&self) -> ReaderState {
        self.state.load(Relaxed)
    }

    /// Returns a handle able to observe this reader's [ReaderState] from other threads
    pub fn state_probe(&self) -> Arc<AtomicReaderState> {
        Arc::clone(&self.state)
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

}


/// Unit tests the [reader](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    type MemoryReader = LogReader<Cursor<Vec<u8>>, BusySpin>;

    /// A log whose seeks start failing after `healthy_seeks` of them
    struct FlakySeeks {
        log:           Cursor<Vec<u8>>,
        healthy_seeks: usize,
    }
    impl Read for FlakySeeks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.log.read(buf)
        }
    }
    impl Seek for FlakySeeks {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.healthy_seeks == 0 {
                return Err(io::Error::new(ErrorKind::Other, "forced seek failure"))
            }
            self.healthy_seeks -= 1;
            self.log.seek(pos)
        }
    }

    /// an empty read neither moves the cursor nor is an error
    #[cfg_attr(not(doc),test)]
    fn empty_reads_are_idempotent() {
        let mut reader: MemoryReader = LogReader::from_source("empty", Cursor::new(vec![]), Framing::Tagged, BusySpin);
        for _ in 0..3 {
            match reader.poll() {
                RetryResult::Transient { error: PollMiss::EmptyRead, .. } => {},
                _ => panic!("an empty log should yield a transient empty read"),
            }
            assert_eq!(reader.offset(), 0, "an empty read moved the cursor");
            assert!(reader.state() == ReaderState::Waiting, "the reader should be waiting");
        }
        assert_eq!(reader.stats(), TailStats { polls: 3, empty_polls: 3, bytes_read: 0, records: 0 });
    }

    /// the cursor advances exactly by the bytes read & everything is delivered in order
    #[cfg_attr(not(doc),test)]
    fn cursor_advances_by_bytes_read() {
        let mut reader: MemoryReader = LogReader::from_source("partial reads", Cursor::new(vec![0, 1, 2, 3, 4, 127]), Framing::Raw { sentinel: Some(127) }, BusySpin)
            .with_read_buffer_size(4);
        let mut delivered = vec![];
        let outcome = reader.tail(&Cancellation::new(), |record| { delivered.push(record); ControlFlow::Continue(()) })
            .expect("tailing from memory shouldn't fail");
        assert_eq!(outcome, TailOutcome::EndOfStream);
        assert_eq!(reader.offset(), 6, "the cursor should be at the end of the log");
        assert_eq!(delivered, vec![Record::Data(0), Record::Data(1), Record::Data(2), Record::Data(3), Record::Data(4), Record::Data(127), Record::EndOfStream]);
        assert!(reader.state() == ReaderState::Done, "the reader should be done");
        assert_eq!(reader.stats().polls, 2, "two reads should have sufficed");
    }

    /// stopping mid-read keeps the remaining bytes for the next tailing call -- nothing is lost nor repeated
    #[cfg_attr(not(doc),test)]
    fn stopping_retains_undelivered_bytes() {
        let mut reader: MemoryReader = LogReader::from_source("stop & resume", Cursor::new(b"abcdef".to_vec()), Framing::Raw { sentinel: None }, BusySpin);
        let mut delivered = vec![];
        for _ in 0..3 {
            let mut taken = 0;
            let outcome = reader.tail(&Cancellation::new(), |record| {
                if let Record::Data(byte) = record {
                    delivered.push(byte);
                }
                taken += 1;
                if taken == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
            }).expect("tailing from memory shouldn't fail");
            assert_eq!(outcome, TailOutcome::Stopped);
        }
        assert_eq!(delivered, b"abcdef".to_vec());
        assert_eq!(reader.stats().polls, 1, "a single read should have fed every call");
    }

    /// the end of the stream finishes the loop whatever the consumer answers to it
    #[cfg_attr(not(doc),test)]
    fn end_of_stream_ends_the_loop() {
        for framing in [Framing::Tagged, Framing::Raw { sentinel: Some(2) }] {
            let mut log = Vec::new();
            let mut buffer = [0; Framing::MAX_FRAME_LEN];
            for record in [Record::Data(1), Record::Data(2), Record::EndOfStream, Record::Data(3)] {
                log.extend_from_slice(framing.encode(record, &mut buffer));
            }
            let mut reader: MemoryReader = LogReader::from_source("stubborn consumer", Cursor::new(log), framing, BusySpin);
            let mut delivered = vec![];
            let outcome = reader.tail(&Cancellation::new(), |record| {
                delivered.push(record);
                if record == Record::EndOfStream { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
            }).expect("tailing from memory shouldn't fail");
            assert_eq!(outcome, TailOutcome::EndOfStream, "{framing:?}: breaking on the end of stream shouldn't turn it into a stop");
            assert_eq!(delivered, vec![Record::Data(1), Record::Data(2), Record::EndOfStream], "{framing:?}: nothing past the end of stream should be delivered");
        }
    }

    /// a seek failure ends the loop in the `Error` state, keeping what was delivered before
    #[cfg_attr(not(doc),test)]
    fn seek_failure() {
        let log = FlakySeeks { log: Cursor::new(vec![0, 1, 2, 3, 4, 5]), healthy_seeks: 3 };
        let mut reader: LogReader<FlakySeeks, BusySpin> = LogReader::from_source("flaky", log, Framing::Raw { sentinel: Some(5) }, BusySpin)
            .with_read_buffer_size(1);
        let mut delivered = vec![];
        let result = reader.tail(&Cancellation::new(), |record| { delivered.push(record); ControlFlow::Continue(()) });
        match result {
            Err(LogError::Seek { offset, .. }) => assert_eq!(offset, 3, "wrong failing offset"),
            other => panic!("a seek error was expected -- got {other:?}"),
        }
        assert!(reader.state() == ReaderState::Error, "the reader should be in the error state");
        assert_eq!(delivered, vec![Record::Data(0), Record::Data(1), Record::Data(2)]);
        assert_eq!(reader.offset(), 3, "the cursor should stay after the delivered bytes");
    }

    /// corrupt frames are fatal
    #[cfg_attr(not(doc),test)]
    fn corruption() {
        let mut reader: MemoryReader = LogReader::from_source("corrupt", Cursor::new(vec![0x01, 7, 0x99, 0]), Framing::Tagged, BusySpin);
        let result = reader.tail(&Cancellation::new(), |_| ControlFlow::Continue(()));
        assert!(matches!(result, Err(LogError::Corrupt { offset: 2, tag: 0x99 })), "corruption at offset 2 should have been detected -- got {result:?}");
        assert!(reader.state() == ReaderState::Error);
    }

    /// a cancelled reader stops even if the log never grows
    #[cfg_attr(not(doc),test)]
    fn cancellation() {
        let cancellation = Cancellation::new();
        let mut reader: MemoryReader = LogReader::from_source("cancelled", Cursor::new(vec![]), Framing::Tagged, BusySpin);
        let state_probe = reader.state_probe();
        let canceller = {
            let cancellation = cancellation.clone();
            std::thread::spawn(move || {
                while state_probe.load(Relaxed) != ReaderState::Waiting {
                    std::hint::spin_loop();
                }
                cancellation.cancel();
            })
        };
        let outcome = reader.tail(&cancellation, |_| ControlFlow::Continue(())).expect("an idle reader shouldn't fail");
        canceller.join().expect("canceller thread panicked");
        assert_eq!(outcome, TailOutcome::Cancelled);
        assert!(reader.state() == ReaderState::Done);
    }

    #[cfg_attr(not(doc),test)]
    fn open_failure() {
        let result = LogReader::<File, BusySpin, 0>::open("/non-existing-directory/deadbeef.log", Framing::Tagged, BusySpin);
        assert!(matches!(result, Err(LogError::FileOpen { .. })), "opening a missing file should fail with `FileOpen`");
    }

}
