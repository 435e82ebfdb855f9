//! Performance benchmarks for canonicalization.
//!
//! Run with: `cargo bench --bench canonicalize`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Typical envelope | <20µs | ~10 mappings, one binary field |
//! | Wide envelope | Linear in mappings | No per-node allocation beyond output |
//! | Reply extraction | <30µs | Three probes plus one canonicalize |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use envelope_kernel::{
    canonicalize, extract_reply_context, BinaryView, InputValue, Int64, ValueGraph,
};

/// Envelope with a quoted message, a media key and a parent back-reference.
fn make_envelope(graph: &mut ValueGraph) -> InputValue {
    let quoted = graph.add_mapping_from([
        ("conversation", InputValue::from("original text")),
        ("messageTimestamp", InputValue::Int64(Int64::from_u64(1_718_000_000))),
    ]);
    let context_info = graph.add_mapping_from([
        ("stanzaId", InputValue::from("3EB0C767D26A1D5A3B")),
        ("quotedMessage", InputValue::Mapping(quoted)),
    ]);
    let extended = graph.add_mapping_from([
        ("text", InputValue::from("reply")),
        ("contextInfo", InputValue::Mapping(context_info)),
    ]);
    let message = graph.add_mapping_from([("extendedTextMessage", InputValue::Mapping(extended))]);
    let key = graph.add_mapping_from([
        ("remoteJid", InputValue::from("5511999999999@s.whatsapp.net")),
        ("id", InputValue::from("3EB0A1B2C3D4")),
    ]);
    let envelope = graph.add_mapping_from([
        ("key", InputValue::Mapping(key)),
        ("message", InputValue::Mapping(message)),
        ("mediaKey", InputValue::Binary(BinaryView::buffer(vec![7u8; 32]))),
    ]);
    graph.set(key, "envelope", InputValue::Mapping(envelope));
    InputValue::Mapping(envelope)
}

/// Envelope with `width` sibling sub-mappings.
fn make_wide(graph: &mut ValueGraph, width: usize) -> InputValue {
    let children: Vec<(String, InputValue)> = (0..width)
        .map(|i| {
            let child = graph.add_mapping_from([
                ("index", InputValue::Number(i as f64)),
                ("label", InputValue::String(format!("item_{}", i))),
            ]);
            (format!("child_{}", i), InputValue::Mapping(child))
        })
        .collect();
    InputValue::Mapping(graph.add_mapping_from(children))
}

fn bench_typical_envelope(c: &mut Criterion) {
    let mut graph = ValueGraph::new();
    let envelope = make_envelope(&mut graph);

    c.bench_function("typical_envelope", |b| {
        b.iter(|| canonicalize(black_box(&graph), black_box(&envelope)))
    });
}

fn bench_wide_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_envelope");

    for width in [10, 100, 1000] {
        let mut graph = ValueGraph::new();
        let root = make_wide(&mut graph, width);

        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("mappings", width), &root, |b, root| {
            b.iter(|| canonicalize(black_box(&graph), black_box(root)))
        });
    }

    group.finish();
}

fn bench_reply_extraction(c: &mut Criterion) {
    let mut graph = ValueGraph::new();
    let envelope = make_envelope(&mut graph);

    c.bench_function("reply_extraction", |b| {
        b.iter(|| {
            let ctx = extract_reply_context(black_box(&graph), Some(black_box(&envelope)));
            assert!(ctx.has_quote());
            ctx
        })
    });
}

/// Benchmark concurrent canonicalization over one shared graph.
fn bench_shared_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_graph");

    for num_threads in [1, 2, 4, 8] {
        let mut graph = ValueGraph::new();
        let envelope = make_envelope(&mut graph);
        let graph = Arc::new(graph);

        group.throughput(Throughput::Elements(num_threads as u64 * 100));
        group.bench_with_input(BenchmarkId::new("threads", num_threads), &num_threads, |b, &n| {
            b.iter(|| {
                let handles: Vec<_> = (0..n)
                    .map(|_| {
                        let graph = Arc::clone(&graph);
                        let envelope = envelope.clone();
                        thread::spawn(move || {
                            for _ in 0..100 {
                                black_box(canonicalize(&graph, &envelope));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_typical_envelope,
    bench_wide_envelope,
    bench_reply_extraction,
    bench_shared_graph,
);
criterion_main!(benches);
