//! Resting place for the [BenchmarkHarness]: the bounded produce-to-consume latency handshake

use super::prepare_log_file;
use crate::{
    channel::{Framing, LogReader, LogWriter, Record, TailStats, MAX_SEQUENCE_LEN, wait_strategy::WaitStrategy},
    errors::{LogError, Result},
    instruments::Instruments,
    types::{Cancellation, BENCHMARK_RECORDS, LOG_FILE_PATH},
};
use std::{
    fs::File,
    io::{self, Read, Seek, Write},
    ops::ControlFlow,
    time::Duration,
};
use minstant::Instant;
use log::{info, warn};


/// The knobs of a handshake run -- the binary only ever uses the [Default]s
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub log_file_path:        String,
    /// how many records are round-tripped -- from 1 to 256, as indexes are single bytes
    pub records:              usize,
    /// when `false` (the default), one raw byte per record is appended, the last index being also the end-of-run sentinel;
    /// when `true`, records travel in `[tag, payload]` frames, with an explicit end-of-stream frame
    pub tagged_framing:       bool,
    /// holds the producer back, after its thread starts, for this long
    pub producer_start_delay: Duration,
    /// see [LogReader::with_read_buffer_size()]
    pub read_buffer_size:     usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            log_file_path:        LOG_FILE_PATH.to_string(),
            records:              BENCHMARK_RECORDS,
            tagged_framing:       false,
            producer_start_delay: Duration::ZERO,
            read_buffer_size:     crate::channel::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl BenchmarkConfig {
    /// Refuses record counts that single byte indexes can't address -- or that would leave the raw framing without a sentinel
    pub fn validate(&self) -> Result<()> {
        if (1..=MAX_SEQUENCE_LEN).contains(&self.records) {
            Ok(())
        } else {
            Err(LogError::RecordCount { records: self.records })
        }
    }

    /// the wire format both ends should use
    pub fn framing(&self) -> Framing {
        if self.tagged_framing {
            Framing::Tagged
        } else {
            Framing::Raw { sentinel: Some(self.records.saturating_sub(1) as u8) }
        }
    }
}


/// When record #i was produced & consumed -- `None` if it never was
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestampSample {
    pub produced_at: Option<Instant>,
    pub consumed_at: Option<Instant>,
}

impl TimestampSample {
    /// `consumed_at - produced_at`, if both happened
    pub fn latency(&self) -> Option<Duration> {
        match (self.produced_at, self.consumed_at) {
            (Some(produced_at), Some(consumed_at)) => Some(consumed_at.duration_since(produced_at)),
            _ => None,
        }
    }
}


/// Everything a handshake run observed -- assembled by the harness out of what each task returned
#[derive(Debug)]
pub struct BenchmarkReport {
    /// index-addressed: `samples[i]` refers to the record with payload `i`
    pub samples:        Vec<TimestampSample>,
    /// records the producer appended
    pub produced:       usize,
    /// data records the consumer received -- including any duplicates or unexpected indexes
    pub consumed:       usize,
    pub reader_stats:   TailStats,
    pub producer_error: Option<LogError>,
    pub consumer_error: Option<LogError>,
}

impl BenchmarkReport {

    /// latency, in nanoseconds, of every record that was both produced & consumed
    pub fn latencies_nanos(&self) -> impl Iterator<Item=(usize, u64)> + '_ {
        self.samples.iter().enumerate()
            .filter_map(|(index, sample)| sample.latency().map(|latency| (index, latency.as_nanos() as u64)))
    }

    /// The sum of [Self::latencies_nanos()] over *every* sample (integer division) -- so, on incomplete runs,
    /// the missing records pull the average down. `None` if no record completed the round trip
    pub fn average_nanos(&self) -> Option<u64> {
        average_nanos(self.latencies_nanos().map(|(_index, nanos)| nanos), self.samples.len())
    }

    /// Outputs one `<index>: <nanoseconds>ns` line per round-tripped record, followed by `average delay: <nanoseconds>ns`
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        write_latencies(out, self.latencies_nanos(), self.average_nanos())
    }

    /// The completion invariant: every record was produced & consumed -- each exactly once
    pub fn verify(&self) -> Result<()> {
        let expected = self.samples.len();
        let complete = self.samples.iter().all(|sample| sample.produced_at.is_some() && sample.consumed_at.is_some());
        if complete && self.produced == expected && self.consumed == expected {
            Ok(())
        } else {
            Err(LogError::InvariantViolation { produced: self.produced, consumed: self.consumed, expected })
        }
    }

}


fn average_nanos(latencies_nanos: impl Iterator<Item=u64>, samples: usize) -> Option<u64> {
    let (completed, sum) = latencies_nanos
        .fold((0usize, 0u128), |(completed, sum), nanos| (completed + 1, sum + nanos as u128));
    (completed > 0 && samples > 0).then(|| (sum / samples as u128) as u64)
}

fn write_latencies(out: &mut impl Write, latencies_nanos: impl Iterator<Item=(usize, u64)>, average_nanos: Option<u64>) -> io::Result<()> {
    for (index, nanos) in latencies_nanos {
        writeln!(out, "{index}: {nanos}ns")?;
    }
    if let Some(average) = average_nanos {
        writeln!(out, "average delay: {average}ns")?;
    }
    out.flush()
}


/// Runs the [LogWriter] & the [LogReader] as two truly parallel threads -- no start order guaranteed --
/// producing & consuming [BenchmarkConfig::records] records through the log file, measuring each one's latency.\
/// Each thread reports its own timestamps back through its return value: nothing is shared between them but the file.
#[derive(Debug)]
pub struct BenchmarkHarness<const INSTRUMENTS: usize = 0> {
    config: BenchmarkConfig,
}

impl<const INSTRUMENTS: usize> BenchmarkHarness<INSTRUMENTS> {

    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    /// Truncates the log file, opens both of its ends -- the reader idling with `wait` -- & performs the handshake run.\
    /// Only an invalid [BenchmarkConfig::records] or failing to open the log are reported as errors:
    /// whatever happens after that is in the [BenchmarkReport].
    pub fn run<Wait: WaitStrategy>(&self, wait: Wait) -> Result<BenchmarkReport> {
        self.config.validate()?;
        let path = &self.config.log_file_path;
        prepare_log_file(path)?;
        let framing = self.config.framing();
        let writer = LogWriter::<File, INSTRUMENTS>::open(path, framing)?;
        let reader = LogReader::<File, Wait, INSTRUMENTS>::open(path, framing, wait)?
            .with_read_buffer_size(self.config.read_buffer_size);
        self.run_with(writer, reader)
    }

    /// The handshake run over already opened ends -- which should share the same, initially empty, log.\
    /// Fails only if [BenchmarkConfig::records] is out of range.
    pub fn run_with<Sink:   Write + Send,
                    Source: Read + Seek + Send,
                    Wait:   WaitStrategy>
                   (&self,
                    mut writer: LogWriter<Sink, INSTRUMENTS>,
                    mut reader: LogReader<Source, Wait, INSTRUMENTS>)
                   -> Result<BenchmarkReport> {

        self.config.validate()?;
        let records = self.config.records;
        let producer_start_delay = self.config.producer_start_delay;
        let cancellation = Cancellation::new();
        let cancellation = &cancellation;
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: handshake benchmark starting -- {records} records through '{}'", self.config.log_file_path);
        }

        let ((produced_at, producer_error), (consumed_at, consumed, reader_stats, consumer_error)) = crossbeam::scope(|scope| {

            let producer = scope.spawn(move |_| {
                if !producer_start_delay.is_zero() {
                    std::thread::sleep(producer_start_delay);
                }
                let mut produced_at = Vec::with_capacity(records);
                let result = writer.produce_sequence(records, &mut produced_at);
                (produced_at, result.err())
            });

            let consumer = scope.spawn(move |_| {
                let mut consumed_at: Vec<Option<Instant>> = vec![None; records];
                let mut consumed = 0;
                let result = reader.tail(cancellation, |record| {
                    if let Record::Data(index) = record {
                        let now = Instant::now();
                        consumed += 1;
                        match consumed_at.get_mut(index as usize) {
                            Some(slot) if slot.is_none() => *slot = Some(now),
                            _ => warn!("mini-kafka: handshake benchmark: record #{index} was unexpected or duplicated"),
                        }
                    }
                    ControlFlow::Continue(())
                });
                (consumed_at, consumed, reader.stats(), result.err())
            });

            let producer_result = producer.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            if producer_result.1.is_some() {
                // the end of the stream will never come
                cancellation.cancel();
            }
            let consumer_result = consumer.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (producer_result, consumer_result)
        }).unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        let produced = produced_at.len();
        let mut samples = vec![TimestampSample::default(); records];
        for (sample, produced_at) in samples.iter_mut().zip(produced_at) {
            sample.produced_at = Some(produced_at);
        }
        for (sample, consumed_at) in samples.iter_mut().zip(consumed_at) {
            sample.consumed_at = consumed_at;
        }
        let report = BenchmarkReport { samples, produced, consumed, reader_stats, producer_error, consumer_error };
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: handshake benchmark finished -- produced: {produced}; consumed: {consumed}; average latency: {:?}ns; reader: {:?}",
                  report.average_nanos(), report.reader_stats);
        }
        Ok(report)
    }

}


/// Unit tests the [benchmark](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    fn report(samples: Vec<TimestampSample>, produced: usize, consumed: usize) -> BenchmarkReport {
        BenchmarkReport { samples, produced, consumed, reader_stats: TailStats::default(), producer_error: None, consumer_error: None }
    }

    fn complete_sample() -> TimestampSample {
        let produced_at = Instant::now();
        TimestampSample { produced_at: Some(produced_at), consumed_at: Some(Instant::now().max(produced_at)) }
    }

    /// the printed lines follow the `<index>: <ns>ns` / `average delay: <ns>ns` format
    #[cfg_attr(not(doc),test)]
    fn latencies_output() {
        let mut out = Vec::new();
        write_latencies(&mut out, [(0, 100), (1, 200), (2, 1)].into_iter(), Some(100)).expect("writing to memory");
        assert_eq!(String::from_utf8(out).expect("the output should be utf-8"),
                   "0: 100ns\n1: 200ns\n2: 1ns\naverage delay: 100ns\n");
    }

    /// the average is the integer mean over all samples -- incomplete ones included
    #[cfg_attr(not(doc),test)]
    fn average() {
        assert_eq!(average_nanos([100, 200, 1].into_iter(), 3), Some(100));
        assert_eq!(average_nanos([10].into_iter(), 2), Some(5), "missing latencies should count as part of the total");
        assert_eq!(average_nanos(std::iter::empty(), 128), None, "no completed record means no average");
    }

    /// a report prints one line per completed sample, plus the average
    #[cfg_attr(not(doc),test)]
    fn report_output() {
        let report = report(vec![complete_sample(), complete_sample(), TimestampSample::default()], 3, 2);
        let mut out = Vec::new();
        report.write_to(&mut out).expect("writing to memory");
        let out = String::from_utf8(out).expect("the report should be utf-8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3, "2 latencies + the average were expected -- got {out:?}");
        assert!(lines[0].starts_with("0: ") && lines[1].starts_with("1: "), "unexpected latency lines: {lines:?}");
        assert!(lines[2].starts_with("average delay: ") && lines[2].ends_with("ns"), "unexpected average line: {}", lines[2]);
    }

    /// complete runs satisfy the invariant; missing, or surplus, consumptions violate it
    #[cfg_attr(not(doc),test)]
    fn invariant() {
        assert!(report(vec![complete_sample(), complete_sample()], 2, 2).verify().is_ok(), "a complete run should satisfy the invariant");

        let incomplete = report(vec![complete_sample(), TimestampSample { produced_at: Some(Instant::now()), consumed_at: None }], 2, 1);
        assert!(matches!(incomplete.verify(), Err(LogError::InvariantViolation { produced: 2, consumed: 1, expected: 2 })));

        let duplicated = report(vec![complete_sample(), complete_sample()], 2, 3);
        assert!(duplicated.verify().is_err(), "a duplicated consumption should violate the invariant");
    }

    /// record counts must be addressable by single byte indexes -- and give the raw framing a sentinel
    #[cfg_attr(not(doc),test)]
    fn record_count_validation() {
        for records in [0, 257, 1000] {
            let harness = BenchmarkHarness::<0>::new(BenchmarkConfig {
                log_file_path: "/tmp/mini_kafka_record_count_validation.test.log".to_string(),
                records,
                ..BenchmarkConfig::default()
            });
            match harness.run(crate::channel::wait_strategy::BusySpin) {
                Err(LogError::RecordCount { records: reported }) => assert_eq!(reported, records),
                other => panic!("{records} records should have been refused -- got {other:?}"),
            }
        }
        for records in [1, 256] {
            assert!(BenchmarkConfig { records, ..BenchmarkConfig::default() }.validate().is_ok(), "{records} records should be accepted");
        }
    }

    /// the raw framing reserves the last index as the sentinel
    #[cfg_attr(not(doc),test)]
    fn framing() {
        assert_eq!(BenchmarkConfig::default().framing(), Framing::Raw { sentinel: Some(127) });
        let config = BenchmarkConfig { tagged_framing: true, ..BenchmarkConfig::default() };
        assert_eq!(config.framing(), Framing::Tagged);
    }

}
