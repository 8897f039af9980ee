//! Criterion benchmarks for the grog barrel binary codec.
//!
//! The broadcast producers re-encode every room's Status frame once per
//! interval, so frame building at room sizes up to the 255-entry limit is
//! the hot path measured here.
//!
//! Run with:
//! ```bash
//! cargo bench --package barrel-core --bench codec_bench
//! ```

use barrel_core::protocol::codec::{
    decode_client_handshake, decode_client_status, decode_server_frame,
    encode_server_announce_into, encode_server_status_into,
};
use barrel_core::protocol::messages::{ClientStatusMessage, PlayerState};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_statuses(n: usize) -> Vec<ClientStatusMessage> {
    (0..n)
        .map(|i| ClientStatusMessage {
            offset: (i * 37) as u16,
            player_state: PlayerState::Playing,
            id: i as u8,
        })
        .collect()
}

fn make_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("viewer-{i:03}")).collect()
}

const ROOM_SIZES: &[usize] = &[1, 8, 64, 255];

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Benchmarks building a Status frame into a reused buffer.
fn bench_encode_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_server_status");
    for &n in ROOM_SIZES {
        let entries = make_statuses(n);
        let mut buf = Vec::with_capacity(2 + n * 4);
        group.bench_with_input(BenchmarkId::new("entries", n), &entries, |b, entries| {
            b.iter(|| {
                buf.clear();
                encode_server_status_into(&mut buf, black_box(entries).iter().copied())
                    .expect("encode must succeed");
            })
        });
    }
    group.finish();
}

/// Benchmarks building an Announce frame into a reused buffer.
fn bench_encode_announce(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_server_announce");
    for &n in ROOM_SIZES {
        let names = make_names(n);
        let mut buf = Vec::new();
        group.bench_with_input(BenchmarkId::new("records", n), &names, |b, names| {
            b.iter(|| {
                buf.clear();
                let records = black_box(names)
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (i as u8, name.as_str()));
                encode_server_announce_into(&mut buf, records).expect("encode must succeed");
            })
        });
    }
    group.finish();
}

/// Benchmarks decoding of the two client → server messages.
fn bench_decode_client(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_client");

    let handshake = [0u8, 5, 0, b'a', b'l', b'i', b'c', b'e'];
    group.bench_function("Handshake", |b| {
        b.iter(|| decode_client_handshake(black_box(&handshake)).unwrap())
    });

    let status = [0x03u8, 0xE8, 0x01];
    group.bench_function("Status", |b| {
        b.iter(|| decode_client_status(black_box(&status), black_box(7)).unwrap())
    });

    group.finish();
}

/// Benchmarks decoding a full Status frame, as a client would.
fn bench_decode_status_frame(c: &mut Criterion) {
    let mut buf = Vec::new();
    encode_server_status_into(&mut buf, make_statuses(64)).expect("encode must succeed");
    c.bench_function("decode_server_frame/status_64", |b| {
        b.iter(|| decode_server_frame(black_box(&buf)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_status,
    bench_encode_announce,
    bench_decode_client,
    bench_decode_status_frame
);
criterion_main!(benches);
