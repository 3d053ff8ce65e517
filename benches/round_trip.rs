//! Measures how long a record takes to go through the log file, for each of the available wait strategies:
//!   - same-thread: the time to append a single record + the time to tail it back;
//!   - inter-thread: a whole handshake run -- 128 records between two threads racing each other.

use std::{
    fs::File,
    hint::black_box,
    ops::ControlFlow,
};
use criterion::{criterion_group, criterion_main, Criterion};
use mini_kafka::{
    channel::wait_strategy::{BoundedBackoff, BusySpin, WaitStrategy, Yielding},
    harness::prepare_log_file,
    BenchmarkConfig, BenchmarkHarness, Cancellation, Framing, LogReader, LogWriter, Record,
};


fn same_thread_round_trip<Wait: WaitStrategy>(criterion: &mut Criterion, wait: Wait) {
    let path = format!("/tmp/mini_kafka_same_thread_{}.bench.log", wait.name());
    prepare_log_file(&path).expect("preparing the log");
    let mut writer = LogWriter::<File, 0>::open(&path, Framing::Tagged).expect("opening the writer");
    let bench_id = format!("Same-thread LATENCY -- {}", wait.name());
    let mut reader = LogReader::<File, Wait, 0>::open(&path, Framing::Tagged, wait).expect("opening the reader");
    let cancellation = Cancellation::new();
    let mut payload = 0u8;
    criterion.bench_function(&bench_id, |bencher| bencher.iter(|| {
        payload = payload.wrapping_add(1);
        writer.append(Record::Data(payload)).expect("appending");
        reader.tail(&cancellation, |record| { black_box(record); ControlFlow::Break(()) })
            .expect("tailing")
    }));
}

fn inter_thread_handshake<Wait: WaitStrategy + Clone>(criterion: &mut Criterion, wait: Wait) {
    let config = BenchmarkConfig {
        log_file_path: format!("/tmp/mini_kafka_inter_thread_{}.bench.log", wait.name()),
        ..BenchmarkConfig::default()
    };
    let harness = BenchmarkHarness::<0>::new(config);
    let mut group = criterion.benchmark_group("Inter-thread HANDSHAKE");
    group.sample_size(10);
    group.bench_function(wait.name(), |bencher| bencher.iter(|| {
        let report = harness.run(wait.clone()).expect("running the handshake");
        black_box(report.average_nanos())
    }));
    group.finish();
}

fn bench_same_thread_latency(criterion: &mut Criterion) {
    same_thread_round_trip(criterion, BusySpin);
    same_thread_round_trip(criterion, Yielding);
    same_thread_round_trip(criterion, BoundedBackoff::default());
}

fn bench_inter_thread_handshake(criterion: &mut Criterion) {
    inter_thread_handshake(criterion, BusySpin);
    inter_thread_handshake(criterion, Yielding);
    inter_thread_handshake(criterion, BoundedBackoff::default());
}

criterion_group!(benches, bench_same_thread_latency, bench_inter_thread_handshake);
criterion_main!(benches);
