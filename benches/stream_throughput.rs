//! Benchmarks for channel and local stream throughput
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reconstream::config::{GadgetConfig, ParallelProcessConfig, PureStreamConfig};
use reconstream::types::{Complex32, ImageHeader};
use reconstream::{
    make_bounded_channel, make_channel, Context, Image, Loader, Message, NodeConfig, Stream,
    StreamConfig,
};

fn passthrough_stream(stages: usize) -> Stream {
    let nodes = (0..stages)
        .map(|i| NodeConfig::Gadget(GadgetConfig::new("PassThroughGadget").named(format!("p{}", i))))
        .collect();
    Stream::new(
        &StreamConfig::new("bench", nodes),
        &Context::default(),
        &Loader::default(),
    )
    .expect("valid stream")
}

fn run(stream: &Stream, messages: impl Iterator<Item = Message>) -> usize {
    let (tx, rx) = make_channel();
    for message in messages {
        let _ = tx.push(message);
    }
    tx.close();
    let (out_tx, out_rx) = make_channel();
    let _ = stream.run(rx, out_tx);
    out_rx.count()
}

fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    let messages = 10_000u64;
    group.throughput(Throughput::Elements(messages));

    group.bench_function("push_then_drain", |b| {
        b.iter(|| {
            let (tx, rx) = make_channel();
            for i in 0..messages {
                let _ = tx.push(Message::new(i));
            }
            tx.close();
            black_box(rx.count())
        })
    });
    group.bench_function("bounded_cross_thread", |b| {
        b.iter(|| {
            let (tx, rx) = make_bounded_channel(64);
            let producer = std::thread::spawn(move || {
                for i in 0..messages {
                    let _ = tx.push(Message::new(i));
                }
                tx.close();
            });
            let received = rx.count();
            let _ = producer.join();
            black_box(received)
        })
    });
    group.finish();
}

fn bench_passthrough(c: &mut Criterion) {
    let mut group = c.benchmark_group("passthrough");
    let messages = 10_000u64;
    group.throughput(Throughput::Elements(messages));

    for stages in [1, 4, 16] {
        let stream = passthrough_stream(stages);
        group.bench_with_input(BenchmarkId::from_parameter(stages), &stages, |b, _| {
            b.iter(|| black_box(run(&stream, (0..messages).map(Message::new))))
        });
    }
    group.finish();
}

fn image(lines: u16, samples: u16) -> Message {
    let header = ImageHeader::new::<Complex32>([samples, lines, 1], 1);
    let data = (0..usize::from(lines) * usize::from(samples))
        .map(|i| Complex32::new(i as f32, 0.0))
        .collect();
    Message::new(Image::new(header, data).expect("valid image"))
}

fn bench_fft_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft_parallel_process");
    let images = 64u64;
    group.throughput(Throughput::Elements(images));

    for workers in [1, 2, 4] {
        let config = StreamConfig::new(
            "bench",
            vec![NodeConfig::ParallelProcess(ParallelProcessConfig {
                name: "pool".to_string(),
                workers,
                stream: PureStreamConfig {
                    gadgets: vec![
                        GadgetConfig::new("ImageFftGadget"),
                        GadgetConfig::new("MagnitudeGadget"),
                    ],
                },
            })],
        );
        let stream =
            Stream::new(&config, &Context::default(), &Loader::default()).expect("valid stream");
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| black_box(run(&stream, (0..images).map(|_| image(128, 256)))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_channel, bench_passthrough, bench_fft_pool);
criterion_main!(benches);
