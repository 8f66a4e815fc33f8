//! Kernel and codec throughput benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rsfec::galois::{detect_simd, gf16, gf8, SimdLevel};
use rsfec::ReedSolomon;
use std::hint::black_box;

fn bench_mul_add_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("mul_add");
    let src: Vec<u8> = (0..65536u32).map(|i| (i * 31 % 256) as u8).collect();
    let mut dst = vec![0u8; 65536];
    group.throughput(Throughput::Bytes(65536));

    group.bench_function(BenchmarkId::new("gf8", "scalar"), |b| {
        b.iter(|| gf8::mul_add8(black_box(&mut dst), black_box(&src), 113, SimdLevel::None))
    });
    group.bench_function(BenchmarkId::new("gf8", "simd"), |b| {
        let level = detect_simd();
        b.iter(|| gf8::mul_add8(black_box(&mut dst), black_box(&src), 113, level))
    });
    group.bench_function(BenchmarkId::new("gf16", "scalar"), |b| {
        b.iter(|| gf16::mul_add16(black_box(&mut dst), black_box(&src), 31337, SimdLevel::None))
    });
    group.bench_function(BenchmarkId::new("gf16", "simd"), |b| {
        let level = detect_simd();
        b.iter(|| gf16::mul_add16(black_box(&mut dst), black_box(&src), 31337, level))
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for &(k, m, size) in &[(10usize, 4usize, 65536usize), (128, 32, 16384), (700, 300, 4096)] {
        let codec = ReedSolomon::new(k, m).unwrap();
        let mut shards = codec.alloc_shards(size);
        for (i, shard) in shards.iter_mut().take(k).enumerate() {
            for (j, byte) in shard.iter_mut().enumerate() {
                *byte = ((i * 31 + j * 7) % 256) as u8;
            }
        }
        group.throughput(Throughput::Bytes((k * size) as u64));
        group.bench_function(BenchmarkId::from_parameter(format!("{k}+{m}x{size}")), |b| {
            b.iter(|| codec.encode(black_box(&mut shards)).unwrap())
        });
    }
    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    let codec = ReedSolomon::new(10, 4).unwrap();
    let mut shards = codec.alloc_shards(65536);
    for (i, shard) in shards.iter_mut().take(10).enumerate() {
        for (j, byte) in shard.iter_mut().enumerate() {
            *byte = ((i + j) % 256) as u8;
        }
    }
    codec.encode(&mut shards).unwrap();
    group.throughput(Throughput::Bytes(10 * 65536));
    group.bench_function("10+4x65536_lose4", |b| {
        b.iter_batched(
            || {
                let mut damaged = shards.clone();
                damaged[0] = Vec::new();
                damaged[3] = Vec::new();
                damaged[11] = Vec::new();
                damaged[13] = Vec::new();
                damaged
            },
            |mut damaged| codec.reconstruct(black_box(&mut damaged)).unwrap(),
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_mul_add_kernels, bench_encode, bench_reconstruct);
criterion_main!(benches);
