//! Codec benchmarks for pager-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pager_protocol::{codec, FrameDecoder, MessageEvent, StreamFrame};

fn sample_frame(seq: u64) -> StreamFrame {
    StreamFrame::new(
        seq,
        MessageEvent::new("a".repeat(50), Some("msg-0123456789-abcdef".to_string())),
    )
}

fn bench_encode(c: &mut Criterion) {
    let frame = sample_frame(1);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("max_length_message", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode_stream(c: &mut Criterion) {
    let mut stream = Vec::new();
    for seq in 1..=100 {
        stream.extend_from_slice(&codec::encode(&sample_frame(seq)).unwrap());
        stream.extend_from_slice(codec::KEEP_ALIVE);
    }

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("100_frames_chunked", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut count = 0;
            for chunk in black_box(&stream).chunks(512) {
                decoder.extend(chunk);
                while let Ok(Some(_)) = decoder.next_frame() {
                    count += 1;
                }
            }
            count
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_stream);
criterion_main!(benches);
