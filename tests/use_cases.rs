//! Exercises both operating modes end to end, through real log files under `/tmp`:
//! each test uses its own file, as tests run in parallel.

use mini_kafka::{
    channel::wait_strategy::{BoundedBackoff, BusySpin, Yielding},
    BenchmarkConfig, BenchmarkHarness, Framing, LogError, LogReader, LogWriter, StreamConfig, StreamHarness, TailOutcome,
};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    time::Duration,
};
use minstant::Instant;


#[ctor::ctor]
fn suite_setup() {
    simple_logger::SimpleLogger::new().with_utc_timestamps().init().unwrap_or_else(|_| eprintln!("--> LOGGER WAS ALREADY STARTED"));
}

fn benchmark_config(log_file_path: &str) -> BenchmarkConfig {
    BenchmarkConfig { log_file_path: log_file_path.to_string(), ..BenchmarkConfig::default() }
}

/// A complete handshake run: every record is produced & consumed exactly once, never consumed before being produced,
/// and the report lists them all, in index order, followed by the average.\
/// The log holds one raw byte per record: the indexes 0..=127, in order -- 127 being also the sentinel.
#[cfg_attr(not(doc),test)]
fn full_handshake() {
    const PATH: &str = "/tmp/mini_kafka_full_handshake.test.log";
    let report = BenchmarkHarness::<0>::new(benchmark_config(PATH))
        .run(BusySpin)
        .expect("the log should be openable");
    let log = std::fs::read(PATH).expect("reading the log back");
    assert_eq!(log, (0..128).collect::<Vec<u8>>(), "the default wire format should be a raw byte per index");
    report.verify().expect("every record should have gone through exactly once");
    assert_eq!(report.samples.len(), 128);
    for (index, sample) in report.samples.iter().enumerate() {
        let (produced_at, consumed_at) = (sample.produced_at.expect("produced"), sample.consumed_at.expect("consumed"));
        assert!(produced_at <= consumed_at, "record #{index} was consumed before being produced");
    }
    assert_eq!(report.reader_stats.records, 128);

    let mut out = Vec::new();
    report.write_to(&mut out).expect("writing to memory");
    let out = String::from_utf8(out).expect("the report should be utf-8");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 129, "one line per record + the average was expected");
    for (index, line) in lines[..128].iter().enumerate() {
        assert!(line.starts_with(&format!("{index}: ")) && line.ends_with("ns"), "unexpected line #{index}: '{line}'");
    }
    assert!(lines[128].starts_with("average delay: ") && lines[128].ends_with("ns"), "unexpected average line: '{}'", lines[128]);
}

/// The tagged wire format, with its explicit end-of-stream frame, works as well -- even with a byte-by-byte reader
/// splitting every frame across reads
#[cfg_attr(not(doc),test)]
fn tagged_handshake() {
    let config = BenchmarkConfig {
        tagged_framing:   true,
        read_buffer_size: 1,
        ..benchmark_config("/tmp/mini_kafka_tagged_handshake.test.log")
    };
    let report = BenchmarkHarness::<0>::new(config)
        .run(Yielding)
        .expect("the log should be openable");
    report.verify().expect("every record should have gone through exactly once");
    assert_eq!(std::fs::metadata("/tmp/mini_kafka_tagged_handshake.test.log").expect("the log should exist").len(), 2 * 128 + 2,
               "the tagged format should take two bytes per record, plus the end-of-stream frame");
}

/// A reader started well before the producer sees nothing for a while -- retrying, without errors,
/// until the records show up
#[cfg_attr(not(doc),test)]
fn late_producer() {
    let config = BenchmarkConfig {
        producer_start_delay: Duration::from_millis(50),
        ..benchmark_config("/tmp/mini_kafka_late_producer.test.log")
    };
    let report = BenchmarkHarness::<0>::new(config)
        .run(BoundedBackoff::default())
        .expect("the log should be openable");
    report.verify().expect("a late producer should still get every record through");
    assert!(report.reader_stats.empty_polls > 0, "the reader should have found the log empty at first");
    assert!(report.consumer_error.is_none());
}

/// A log that can no longer be repositioned ends the consumer with an error -- which the report carries --
/// keeping the timestamps of what was consumed before, and the run fails the completion invariant
#[cfg_attr(not(doc),test)]
fn seek_failure_mid_run() {

    /// seeks start failing after `healthy_seeks` of them
    struct FlakySeeks {
        log:           File,
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
                return Err(io::Error::new(io::ErrorKind::Other, "seeking is broken"))
            }
            self.healthy_seeks -= 1;
            self.log.seek(pos)
        }
    }

    const PATH: &str = "/tmp/mini_kafka_seek_failure_mid_run.test.log";
    mini_kafka::harness::prepare_log_file(PATH).expect("preparing the log");
    let writer = LogWriter::<File, 0>::open(PATH, Framing::Tagged).expect("opening the writer");
    let source = FlakySeeks { log: File::open(PATH).expect("opening the log for reading"), healthy_seeks: 20 };
    // a single frame per read: 20 seeks can't possibly deliver all records
    let reader: LogReader<FlakySeeks, BusySpin> = LogReader::from_source(PATH, source, Framing::Tagged, BusySpin)
        .with_read_buffer_size(2);
    let report = BenchmarkHarness::<0>::new(benchmark_config(PATH)).run_with(writer, reader)
        .expect("128 records are a valid run");

    assert!(matches!(report.consumer_error, Some(LogError::Seek { .. })), "a seek error was expected -- got {:?}", report.consumer_error);
    assert!(report.producer_error.is_none(), "the producer should be unaffected");
    assert_eq!(report.produced, 128);
    assert!(report.consumed <= 20, "at most one record per successful seek was expected -- got {}", report.consumed);
    for (index, sample) in report.samples.iter().enumerate() {
        if index < report.consumed {
            let (produced_at, consumed_at) = (sample.produced_at.expect("produced"), sample.consumed_at.expect("consumed before the failure"));
            assert!(produced_at <= consumed_at, "record #{index} was consumed before being produced");
        } else {
            assert_eq!(sample.consumed_at, None, "record #{index} is past the failure and shouldn't have been consumed");
        }
    }
    assert!(matches!(report.verify(), Err(LogError::InvariantViolation { produced: 128, expected: 128, .. })));
}

/// The continuous stream, sped up & bounded, cycles through the alphabet with no gaps
#[cfg_attr(not(doc),test)]
fn bounded_stream() {
    let config = StreamConfig {
        log_file_path: "/tmp/mini_kafka_bounded_stream.test.log".to_string(),
        pacing:        Duration::ZERO,
        limit:         Some(26 * 3 + 1),
    };
    let report = StreamHarness::<Vec<u8>, 0>::start(config, Vec::new())
        .expect("starting the stream")
        .wait()
        .expect("the stream shouldn't fail");
    let expected: Vec<u8> = (b'a'..=b'z').cycle().take(26 * 3 + 1).collect();
    assert_eq!(report.output, expected);
    assert_eq!(report.outcome, TailOutcome::Stopped);
}

/// The producer appends no faster than one record per pacing interval
#[cfg_attr(not(doc),test)]
fn stream_pacing() {
    const PACING: Duration = Duration::from_millis(20);
    const RECORDS: u64 = 5;
    let config = StreamConfig {
        log_file_path: "/tmp/mini_kafka_stream_pacing.test.log".to_string(),
        pacing:        PACING,
        limit:         Some(RECORDS),
    };
    let start = Instant::now();
    let report = StreamHarness::<Vec<u8>, 0>::start(config, Vec::new())
        .expect("starting the stream")
        .wait()
        .expect("the stream shouldn't fail");
    let elapsed = Instant::now().duration_since(start);
    assert_eq!(report.output, b"abcde".to_vec());
    assert!(elapsed >= PACING * (RECORDS as u32 - 1), "{RECORDS} records went through in {elapsed:?}: faster than the {PACING:?} pacing allows");
}

/// Opening a log where it can't exist is reported right away
#[cfg_attr(not(doc),test)]
fn unopenable_log() {
    let result = BenchmarkHarness::<0>::new(benchmark_config("/non-existing-directory/deadbeef.log")).run(BusySpin);
    assert!(matches!(result, Err(LogError::FileOpen { .. })), "a `FileOpen` error was expected -- got {result:?}");
    let result = StreamHarness::<Vec<u8>, 0>::start(StreamConfig { log_file_path: "/non-existing-directory/deadbeef.log".to_string(), ..StreamConfig::default() }, Vec::new());
    assert!(matches!(result, Err(LogError::FileOpen { .. })), "a `FileOpen` error was expected");
}
