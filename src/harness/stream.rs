//! Resting place for the [StreamHarness]: the paced, never ending alphabet stream

use super::prepare_log_file;
use crate::{
    channel::{Framing, LogReader, LogWriter, Record, TailOutcome, TailStats, wait_strategy::Pacing},
    errors::{LogError, Result},
    instruments::Instruments,
    types::{Cancellation, LOG_FILE_PATH, PACING_INTERVAL},
};
use std::{
    fs::File,
    io::Write,
    ops::ControlFlow,
    thread::{self, JoinHandle},
    time::Duration,
};
use log::{info, warn};


#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub log_file_path: String,
    /// the producer appends one record per interval; the consumer attempts one read per interval
    pub pacing:        Duration,
    /// if given, both ends stop after this many records
    pub limit:         Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            log_file_path: LOG_FILE_PATH.to_string(),
            pacing:        PACING_INTERVAL,
            limit:         None,
        }
    }
}


/// What the consumer wrote out, along with how the stream ended
#[derive(Debug)]
pub struct StreamReport<Out> {
    /// the output given to [StreamHarness::start()], holding every consumed byte
    pub output:       Out,
    pub produced:     u64,
    pub consumed:     u64,
    pub outcome:      TailOutcome,
    pub reader_stats: TailStats,
}

type ConsumerResult<Out> = (Out, Result<(u64, TailOutcome, TailStats)>);


/// Runs the producer & the consumer of the continuous stream in their own threads:
/// 'a', 'b', ..., 'z', 'a', ... are appended, one per [StreamConfig::pacing] interval, while the reader writes
/// each consumed byte to `Out` (stdout, for the binary).\
/// Both threads run until the shared [Cancellation] is asserted -- or until [StreamConfig::limit] records went through.
#[derive(Debug)]
pub struct StreamHarness<Out: Write + Send + 'static, const INSTRUMENTS: usize = 0> {
    producer:     JoinHandle<Result<u64>>,
    consumer:     JoinHandle<ConsumerResult<Out>>,
    cancellation: Cancellation,
}

impl<Out: Write + Send + 'static, const INSTRUMENTS: usize> StreamHarness<Out, INSTRUMENTS> {

    /// Truncates the log, opens both of its ends & spawns the producer and consumer threads
    pub fn start(config: StreamConfig, mut out: Out) -> Result<Self> {
        let path = &config.log_file_path;
        prepare_log_file(path)?;
        let framing = Framing::Raw { sentinel: None };
        let mut writer = LogWriter::<File, INSTRUMENTS>::open(path, framing)?;
        let mut reader = LogReader::<File, Pacing, INSTRUMENTS>::open(path, framing, Pacing::new(config.pacing))?;
        let cancellation = Cancellation::new();
        let (pacing, limit) = (config.pacing, config.limit);

        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: continuous stream starting through '{path}' -- one record every {pacing:?}{}",
                  limit.map_or_else(String::new, |limit| format!(", up to {limit} records")));
        }

        let producer = {
            let cancellation = cancellation.clone();
            thread::Builder::new()
                .name("mini-kafka-producer".to_string())
                .spawn(move || {
                    let result = writer.produce_cycle(pacing, limit, &cancellation);
                    if let Err(err) = &result {
                        warn!("mini-kafka: continuous stream producer failed: {err} -- stopping the consumer");
                        cancellation.cancel();
                    }
                    result
                })
                .map_err(|source| LogError::Spawn { role: "producer", source })?
        };

        let consumer_cancellation = cancellation.clone();
        let consumer = thread::Builder::new()
            .name("mini-kafka-consumer".to_string())
            .spawn(move || {
                let mut consumed = 0;
                let mut output_error = None;
                let result = reader.tail(&consumer_cancellation, |record| {
                    let Record::Data(byte) = record else {
                        return ControlFlow::Continue(())
                    };
                    if let Err(source) = out.write_all(&[byte]).and_then(|_| out.flush()) {
                        output_error = Some(LogError::Output { record: consumed, source });
                        return ControlFlow::Break(())
                    }
                    consumed += 1;
                    if limit.map_or(false, |limit| consumed >= limit) {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                });
                let result = match output_error {
                    Some(err) => Err(err),
                    None      => result.map(|outcome| (consumed, outcome, reader.stats())),
                };
                (out, result)
            });
        let consumer = match consumer {
            Ok(consumer) => consumer,
            Err(source) => {
                // the producer is already running
                cancellation.cancel();
                return Err(LogError::Spawn { role: "consumer", source })
            },
        };

        Ok(Self { producer, consumer, cancellation })
    }

    /// A handle to stop both threads -- what the binary asserts on Ctrl-C
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Blocks until the consumer is done, then stops the producer, reporting on what happened.\
    /// A failure on either end is reported as an error, the consumer's taking precedence.
    pub fn wait(self) -> Result<StreamReport<Out>> {
        let (output, consumer_result) = self.consumer.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        self.cancellation.cancel();
        let producer_result = self.producer.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let (consumed, outcome, reader_stats) = consumer_result?;
        let produced = producer_result?;
        if Instruments::from(INSTRUMENTS).logging() {
            info!("mini-kafka: continuous stream finished ({outcome:?}) -- produced: {produced}; consumed: {consumed}");
        }
        Ok(StreamReport { output, produced, consumed, outcome, reader_stats })
    }

}


/// Unit tests the [stream](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    /// the alphabet wraps around after 'z'
    #[cfg_attr(not(doc),test)]
    fn limited_stream() {
        let config = StreamConfig {
            log_file_path: "/tmp/mini_kafka_limited_stream.test.log".to_string(),
            pacing:        Duration::ZERO,
            limit:         Some(30),
        };
        let harness = StreamHarness::<Vec<u8>, 0>::start(config, Vec::new()).expect("starting the stream");
        let report = harness.wait().expect("the stream shouldn't fail");
        assert_eq!(report.output, b"abcdefghijklmnopqrstuvwxyzabcd".to_vec());
        assert_eq!((report.produced, report.consumed), (30, 30));
        assert_eq!(report.outcome, TailOutcome::Stopped);
    }

    /// cancelling stops both ends, leaving a gapless prefix of the cycle as output
    #[cfg_attr(not(doc),test)]
    fn cancelled_stream() {
        let config = StreamConfig {
            log_file_path: "/tmp/mini_kafka_cancelled_stream.test.log".to_string(),
            pacing:        Duration::from_millis(1),
            limit:         None,
        };
        let harness = StreamHarness::<Vec<u8>, 0>::start(config, Vec::new()).expect("starting the stream");
        thread::sleep(Duration::from_millis(50));
        harness.cancellation().cancel();
        let report = harness.wait().expect("the stream shouldn't fail");
        assert_eq!(report.outcome, TailOutcome::Cancelled);
        assert!(report.consumed <= report.produced, "more was consumed ({}) than produced ({})", report.consumed, report.produced);
        assert_eq!(report.output.len() as u64, report.consumed);
        let expected: Vec<u8> = (b'a'..=b'z').cycle().take(report.output.len()).collect();
        assert_eq!(report.output, expected);
    }

}
