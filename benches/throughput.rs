//! Streaming throughput of the driver through a few filter chains.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use planefilter::pipeline::{DriverConfig, StreamingDriver};
use std::hint::black_box;

const FRAMES: usize = 50;

fn bench_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_chain");
    group.sample_size(20);

    let config = DriverConfig::default();
    let input = vec![0x40u8; config.frame_size() * FRAMES];
    group.throughput(Throughput::Bytes(input.len() as u64));

    for descriptor in ["null", "identity", "negate", "negate,delay=frames=4", "tblend"] {
        group.bench_with_input(
            BenchmarkId::from_parameter(descriptor),
            descriptor,
            |b, descriptor| {
                b.iter_batched(
                    || {
                        let config = DriverConfig::default().with_descriptor(descriptor);
                        let driver = StreamingDriver::new(config).unwrap();
                        (driver, Vec::with_capacity(input.len()))
                    },
                    |(mut driver, mut output)| {
                        let result = driver.run(&mut input.as_slice(), &mut output).unwrap();
                        black_box(result.frames_processed)
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_chains);
criterion_main!(benches);
