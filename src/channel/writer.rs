//! Resting place for the [LogWriter], the producing end of the log channel

use super::record::{Framing, Record};
use crate::{
    errors::{LogError, Result},
    instruments::Instruments,
    types::Cancellation,
};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    time::Duration,
};
use minstant::Instant;
use log::{info, trace};


/// The longest sequence [LogWriter::produce_sequence()] may index with single bytes
pub const MAX_SEQUENCE_LEN: usize = u8::MAX as usize + 1;


/// Appends [Record]s to the shared log.\
/// There must be a single writer per log file: appends are not fenced against other producers.
#[derive(Debug)]
pub struct LogWriter<Sink: Write = File, const INSTRUMENTS: usize = 0> {
    name:     String,
    sink:     Sink,
    framing:  Framing,
    appended: u64,
}

impl<const INSTRUMENTS: usize> LogWriter<File, INSTRUMENTS> {

    /// Opens -- creating, if absent -- the log file at `path` for appending.\
    /// No user-space buffering is added on top of the [File]: every [Self::append()] reaches the kernel right away,
    /// becoming visible to a concurrent reader of the same file with no caching delay.\
    /// Failing to open the file is fatal: it is reported and never retried.
    pub fn open(path: impl AsRef<Path>, framing: Framing) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogError::FileOpen { path: path.display().to_string(), source })?;
        Ok(Self::from_sink(path.display().to_string(), file, framing))
    }

}

impl<Sink: Write, const INSTRUMENTS: usize> LogWriter<Sink, INSTRUMENTS> {

    /// Produces to any `sink` -- which is flushed after every record, so buffered sinks keep the "immediately visible" contract
    pub fn from_sink<IntoString: Into<String>>(name: IntoString, sink: Sink, framing: Framing) -> Self {
        let name = name.into();
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: writer '{name}' ready to append {framing:?} records");
        }
        Self { name, sink, framing, appended: 0 }
    }

    /// Appends a single `record`, as a whole, to the log
    pub fn append(&mut self, record: Record) -> Result<()> {
        let mut buffer = [0; Framing::MAX_FRAME_LEN];
        let frame = self.framing.encode(record, &mut buffer);
        if frame.is_empty() {
            return Ok(())
        }
        let record_number = self.appended;
        self.sink.write_all(frame)
            .and_then(|_| self.sink.flush())
            .map_err(|source| LogError::Write { record: record_number, source })?;
        self.appended += 1;
        if Instruments::from(INSTRUMENTS).tracing() {
            trace!("mini-kafka: writer '{}' appended {record:?} as record #{record_number}", self.name);
        }
        Ok(())
    }

    /// The bounded, burst-until-count policy of the handshake benchmark:
    /// appends `Data(0)`, `Data(1)`, ..., `Data(count-1)` in order, followed by an [Record::EndOfStream]
    /// (which the [Framing::Raw] framing represents with its sentinel instead).\
    /// The instant taken immediately before each successful append is pushed to `produced_at` -- so, on errors, it holds
    /// the timestamps of the records that made it to the log.\
    /// `count` must not exceed 256, as indexes are single bytes: bigger counts are refused with [LogError::RecordCount]
    /// before anything is appended.
    pub fn produce_sequence(&mut self, count: usize, produced_at: &mut Vec<Instant>) -> Result<()> {
        if count > MAX_SEQUENCE_LEN {
            return Err(LogError::RecordCount { records: count })
        }
        for index in 0..count {
            let now = Instant::now();
            self.append(Record::Data(index as u8))?;
            produced_at.push(now);
        }
        self.append(Record::EndOfStream)?;
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: writer '{}' produced its {count} records", self.name);
        }
        Ok(())
    }

    /// The unbounded, fixed-interval policy of the continuous stream:
    /// appends 'a', 'b', ..., 'z', 'a', ... -- one every `pacing` -- until `cancellation` is asserted
    /// or `limit` records were produced, if given.\
    /// Returns how many records were appended.
    pub fn produce_cycle(&mut self, pacing: Duration, limit: Option<u64>, cancellation: &Cancellation) -> Result<u64> {
        let mut produced = 0;
        while !cancellation.is_cancelled() && limit.map_or(true, |limit| produced < limit) {
            self.append(Record::Data(b'a' + (produced % 26) as u8))?;
            produced += 1;
            if !pacing.is_zero() {
                std::thread::sleep(pacing);
            }
        }
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: writer '{}' stopped after producing {produced} records{}",
                  self.name,
                  if cancellation.is_cancelled() {" (cancelled)"} else {""});
        }
        Ok(produced)
    }

    /// how many records reached the log so far
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// gives back the underlying sink
    pub fn into_sink(self) -> Sink {
        self.sink
    }

}


/// Unit tests the [writer](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use std::io;

    /// Sink accepting up to `capacity` bytes, failing afterwards
    struct FullDisk {
        written:  Vec<u8>,
        capacity: usize,
    }
    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.capacity {
                return Err(io::Error::new(io::ErrorKind::Other, "disk is full"))
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// produced bytes follow the wire formats & timestamps are taken in order
    #[cfg_attr(not(doc),test)]
    fn sequence() {
        let mut writer: LogWriter<Vec<u8>> = LogWriter::from_sink("sequence", Vec::new(), Framing::Raw { sentinel: Some(3) });
        let mut produced_at = Vec::new();
        writer.produce_sequence(4, &mut produced_at).expect("producing to memory shouldn't fail");
        assert_eq!(writer.appended(), 4, "the end of stream should be implicit in the raw framing");
        assert_eq!(produced_at.len(), 4, "one timestamp per record was expected");
        assert!(produced_at.windows(2).all(|pair| pair[0] <= pair[1]), "timestamps should be taken in append order");
        assert_eq!(writer.into_sink(), vec![0, 1, 2, 3]);

        let mut writer: LogWriter<Vec<u8>> = LogWriter::from_sink("tagged sequence", Vec::new(), Framing::Tagged);
        writer.produce_sequence(2, &mut Vec::new()).expect("producing to memory shouldn't fail");
        assert_eq!(writer.into_sink(), vec![0x01, 0, 0x01, 1, 0x04, 0]);
    }

    /// storage errors end the run, keeping the timestamps of what was appended
    #[cfg_attr(not(doc),test)]
    fn storage_errors_are_not_recovered() {
        let mut writer: LogWriter<FullDisk> = LogWriter::from_sink("full disk", FullDisk { written: vec![], capacity: 5 }, Framing::Raw { sentinel: None });
        let mut produced_at = Vec::new();
        match writer.produce_sequence(128, &mut produced_at) {
            Err(LogError::Write { record, .. }) => assert_eq!(record, 5, "wrong failing record reported"),
            other => panic!("a write error was expected -- got {other:?}"),
        }
        assert_eq!(produced_at.len(), 5, "only the appended records should have been timestamped");
    }

    /// sequences whose indexes don't fit a byte are refused without touching the log
    #[cfg_attr(not(doc),test)]
    fn oversized_sequence() {
        let mut writer: LogWriter<Vec<u8>> = LogWriter::from_sink("oversized", Vec::new(), Framing::Raw { sentinel: None });
        let mut produced_at = Vec::new();
        assert!(matches!(writer.produce_sequence(257, &mut produced_at), Err(LogError::RecordCount { records: 257 })),
                "257 records can't have single byte indexes");
        assert!(produced_at.is_empty(), "nothing should have been produced");
        assert_eq!(writer.appended(), 0);
        writer.produce_sequence(MAX_SEQUENCE_LEN, &mut produced_at).expect("256 records should be accepted");
        assert_eq!(writer.into_sink(), (0..=u8::MAX).collect::<Vec<u8>>());
    }

    /// the cycle goes through the alphabet and honors the limit
    #[cfg_attr(not(doc),test)]
    fn cycle() {
        let mut writer: LogWriter<Vec<u8>> = LogWriter::from_sink("cycle", Vec::new(), Framing::Raw { sentinel: None });
        let produced = writer.produce_cycle(Duration::ZERO, Some(28), &Cancellation::new())
            .expect("producing to memory shouldn't fail");
        assert_eq!(produced, 28);
        assert_eq!(writer.into_sink(), b"abcdefghijklmnopqrstuvwxyzab".to_vec());
    }

    /// a cancelled cycle produces nothing else
    #[cfg_attr(not(doc),test)]
    fn cancelled_cycle() {
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let mut writer: LogWriter<Vec<u8>> = LogWriter::from_sink("cancelled cycle", Vec::new(), Framing::Raw { sentinel: None });
        assert_eq!(writer.produce_cycle(Duration::ZERO, None, &cancellation).expect("nothing should have been written"), 0);
    }

    #[cfg_attr(not(doc),test)]
    fn open_failure() {
        let result = LogWriter::<File, 0>::open("/non-existing-directory/deadbeef.log", Framing::Tagged);
        assert!(matches!(result, Err(LogError::FileOpen { .. })), "opening in a missing directory should fail with `FileOpen`");
    }

}
