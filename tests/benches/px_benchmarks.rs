//! # Plexus Benchmarks
//!
//! Hot paths of a node under load:
//!
//! | Area | Path | What is measured |
//! |------|------|------------------|
//! | px-05 Sandbox IPC | `encode_frame` / `FrameDecoder` | bytes per second per frame size |
//! | px-05 Sandbox IPC | fragmented decode | cost of small reads |
//! | px-02 Signaler | `signal_group` | fan-out per member count |
//! | px-03 Dispatch | `textMessage` end to end | signature, guard, trx, effect |

#![allow(clippy::excessive_nesting)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_runtime::{NodeConfig, PlatformContext};
use px_02_signaler::{ChannelSink, Listener, Signaler};
use px_05_sandbox_ipc::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use rand::Rng;
use serde_json::json;
use shared_types::{sign_payload, GroupId, OriginPacket, UserId};
use std::time::Duration;

// ============================================================================
// px-05: Frame codec
// ============================================================================

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("px-05-frame-codec");
    group.measurement_time(Duration::from_secs(5));

    for size in [0usize, 1024, 64 * 1024, 1024 * 1024] {
        let mut body = vec![0u8; size];
        rand::thread_rng().fill(&mut body[..]);
        let encoded = encode_frame(42, &body, DEFAULT_MAX_FRAME_BYTES).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &body, |b, body| {
            b.iter(|| black_box(encode_frame(42, body, DEFAULT_MAX_FRAME_BYTES).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_BYTES);
                decoder.feed(encoded);
                black_box(decoder.next_frame().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_fragmented_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("px-05-fragmented-decode");

    let mut stream = Vec::new();
    for id in 1..=64u64 {
        stream.extend_from_slice(&encode_frame(id, &[7u8; 512], DEFAULT_MAX_FRAME_BYTES).unwrap());
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [1usize, 16, 512, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &stream, |b, stream| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_BYTES);
                let mut frames = 0usize;
                for piece in stream.chunks(chunk) {
                    decoder.feed(piece);
                    while decoder.next_frame().unwrap().is_some() {
                        frames += 1;
                    }
                }
                black_box(frames)
            })
        });
    }

    group.finish();
}

// ============================================================================
// px-02: Group fan-out
// ============================================================================

fn bench_group_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("px-02-group-fanout");
    let payload = json!({"type": "textMessage", "text": "echo benchmark"});

    for members in [10usize, 100, 1000] {
        let signaler = Signaler::new("local");
        let g1 = GroupId::new("g1");
        let mut receivers = Vec::with_capacity(members);
        for i in 0..members {
            let user = UserId::new(format!("m{i}"));
            let (sink, rx) = ChannelSink::pair(user.clone());
            signaler.listen_single(Listener::new(user.clone(), sink));
            signaler.join_group(&g1, user);
            receivers.push(rx);
        }

        group.throughput(Throughput::Elements(members as u64));
        for pack in [false, true] {
            let name = if pack { "packed" } else { "raw" };
            group.bench_with_input(BenchmarkId::new(name, members), &members, |b, _| {
                b.iter(|| {
                    let report = signaler
                        .signal_group("broadcast", &g1, &payload, pack, &[])
                        .unwrap();
                    // Keep the unbounded queues from growing across iterations.
                    for rx in receivers.iter_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                    black_box(report.delivered)
                })
            });
        }
    }

    group.finish();
}

// ============================================================================
// px-03: Dispatch pipeline
// ============================================================================

fn bench_dispatch_text_message(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("px-03-dispatch");

    let mut config = NodeConfig::default();
    // Every iteration reuses the same packet.
    config.dispatch.replay_window_secs = 0;
    let ctx = runtime.block_on(async { PlatformContext::build(config).unwrap() });
    ctx.security
        .register_user(UserId::new("u1"), b"u1-secret".to_vec());
    ctx.join(&GroupId::new("g1"), UserId::new("u1"));

    let payload = json!({"text": "hi"}).to_string().into_bytes();
    let signature = sign_payload(&payload, b"u1-secret");
    let packet = OriginPacket::request("textMessage", UserId::new("u1"), payload)
        .with_subject("g1")
        .with_signature(signature);

    group.throughput(Throughput::Elements(1));
    group.bench_function("text_message", |b| {
        b.iter(|| black_box(runtime.block_on(ctx.handle(&packet))))
    });

    group.finish();
}

criterion_group!(
    name = px_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_frame_codec,
        bench_fragmented_decode,
        bench_group_fanout,
        bench_dispatch_text_message,
);

criterion_main!(px_benches);
