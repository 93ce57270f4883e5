//! Benchmarks for response body encoding and stale-record compression

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use wayfare_core::{Compressor, JsonSerializer, NoopCompressor, Serializer};

#[cfg(feature = "msgpack")]
use wayfare_core::MsgPackSerializer;

#[cfg(feature = "bincode")]
use wayfare_core::BincodeSerializer;

#[cfg(feature = "compression")]
use wayfare_core::ZstdCompressor;

/// A POI row as a carousel would receive it
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoiRow {
    id: String,
    name: String,
    category: String,
    lat: f64,
    lng: f64,
    rating: f64,
    tags: Vec<String>,
}

fn poi_list(len: usize) -> Vec<PoiRow> {
    (0..len)
        .map(|i| PoiRow {
            id: format!("poi-{i}"),
            name: format!("Point of interest {i}"),
            category: ["museum", "park", "restaurant", "event"][i % 4].to_string(),
            lat: 41.38 + i as f64 * 0.001,
            lng: 2.17 + i as f64 * 0.001,
            rating: (i % 5) as f64 + 0.5,
            tags: vec!["family".to_string(), "outdoor".to_string()],
        })
        .collect()
}

fn bench_serializers(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");

    for len in [10usize, 50, 500] {
        let data = poi_list(len);

        group.bench_with_input(BenchmarkId::new("json", len), &data, |b, data| {
            b.iter(|| black_box(JsonSerializer.serialize(black_box(data)).unwrap()));
        });

        #[cfg(feature = "msgpack")]
        group.bench_with_input(BenchmarkId::new("msgpack", len), &data, |b, data| {
            b.iter(|| black_box(MsgPackSerializer.serialize(black_box(data)).unwrap()));
        });

        #[cfg(feature = "bincode")]
        group.bench_with_input(BenchmarkId::new("bincode", len), &data, |b, data| {
            b.iter(|| black_box(BincodeSerializer.serialize(black_box(data)).unwrap()));
        });
    }

    group.finish();
}

fn bench_deserializers(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize");

    for len in [10usize, 50, 500] {
        let bytes = JsonSerializer.serialize(&poi_list(len)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", len), &bytes, |b, bytes| {
            b.iter(|| {
                let rows: Vec<PoiRow> = JsonSerializer.deserialize(black_box(bytes)).unwrap();
                black_box(rows);
            });
        });
    }

    group.finish();
}

fn bench_compression(c: &mut Criterion) {
    let bytes = JsonSerializer.serialize(&poi_list(500)).unwrap();
    let mut group = c.benchmark_group("compress");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_with_input(BenchmarkId::new("noop", "poi_500"), &bytes, |b, data| {
        b.iter(|| black_box(NoopCompressor.compress(black_box(data)).unwrap()));
    });

    #[cfg(feature = "compression")]
    for level in [1, 3, 9] {
        let compressor = ZstdCompressor::new(level);
        group.bench_with_input(
            BenchmarkId::new(format!("zstd_l{level}"), "poi_500"),
            &bytes,
            |b, data| {
                b.iter(|| black_box(compressor.compress(black_box(data)).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_serializers, bench_deserializers, bench_compression);
criterion_main!(benches);
