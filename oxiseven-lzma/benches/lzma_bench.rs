//! Performance benchmarks for oxiseven-lzma
//!
//! - Compression speed across presets and data patterns
//! - Decompression speed, whole-buffer and with input split into small pieces
//! - Cost of the resumable decoder's rollback path

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxiseven_core::{DecompressStatus, Decompressor};
use oxiseven_lzma::{LzmaDecompressor, LzmaLevel, compress, decompress_bytes};
use std::hint::black_box;

/// Type alias for pattern generator functions
type PatternGenerator = fn(usize) -> Vec<u8>;

mod test_data {
    /// Uniform data - all bytes are the same
    pub fn uniform(size: usize) -> Vec<u8> {
        vec![0xAA; size]
    }

    /// Random data - no patterns
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Text-like data
    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"The quick brown fox jumps over the lazy dog. \
                     Pack my box with five dozen liquor jugs. \
                     How vexingly quick daft zebras jump! \
                     Lorem ipsum dolor sit amet, consectetur adipiscing elit. ";
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let chunk_size = (size - data.len()).min(text.len());
            data.extend_from_slice(&text[..chunk_size]);
        }
        data
    }

    /// Text with sparse single-byte edits, so matches are short and varied
    pub fn edited_text(size: usize) -> Vec<u8> {
        let mut data = text_like(size);
        let mut seed: u32 = 0x9E37_79B9;
        for i in (0..size).step_by(17) {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            data[i] = (seed >> 24) as u8;
        }
        data
    }
}

mod data_sizes {
    pub const SMALL: usize = 10 * 1024; // 10 KB
    pub const MEDIUM: usize = 100 * 1024; // 100 KB
    pub const LARGE: usize = 1024 * 1024; // 1 MB
}

fn bench_compression_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_levels");

    let levels = [
        ("level_1_fast", LzmaLevel::FAST),
        ("level_3", LzmaLevel::new(3)),
        ("level_5_default", LzmaLevel::DEFAULT),
        ("level_9_best", LzmaLevel::BEST),
    ];

    let size = data_sizes::MEDIUM;
    let data = test_data::edited_text(size);

    for (name, level) in levels {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| {
                let compressed = compress(black_box(data), level).unwrap();
                black_box(compressed);
            });
        });
    }

    group.finish();
}

fn bench_compression_data_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_data_types");

    let patterns: [(&str, PatternGenerator); 4] = [
        ("uniform", test_data::uniform as PatternGenerator),
        ("random", test_data::random as PatternGenerator),
        ("text", test_data::text_like as PatternGenerator),
        ("edited_text", test_data::edited_text as PatternGenerator),
    ];

    let size = data_sizes::MEDIUM;

    for (pattern_name, generator) in patterns {
        let data = generator(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(pattern_name),
            &data,
            |b, data| {
                b.iter(|| {
                    let compressed = compress(black_box(data), LzmaLevel::FAST).unwrap();
                    black_box(compressed);
                });
            },
        );
    }

    group.finish();
}

fn bench_decompression_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompression_sizes");

    let sizes = [
        ("10KB", data_sizes::SMALL),
        ("100KB", data_sizes::MEDIUM),
        ("1MB", data_sizes::LARGE),
    ];

    for (size_name, size) in sizes {
        let original = test_data::edited_text(size);
        let compressed = compress(&original, LzmaLevel::DEFAULT).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size_name),
            &compressed,
            |b, compressed| {
                b.iter(|| {
                    let decompressed = decompress_bytes(black_box(compressed)).unwrap();
                    black_box(decompressed);
                });
            },
        );
    }

    group.finish();
}

fn bench_split_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompression_split_input");

    let size = data_sizes::MEDIUM;
    let original = test_data::edited_text(size);
    let compressed = compress(&original, LzmaLevel::DEFAULT).unwrap();

    for piece in [1usize, 7, 64, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("piece", piece), &compressed, |b, compressed| {
            b.iter(|| {
                let mut decompressor = LzmaDecompressor::new();
                let mut out = vec![0u8; 1 << 16];
                let mut total = 0usize;
                'feed: for chunk in compressed.chunks(piece) {
                    let mut input = chunk;
                    loop {
                        let (used, produced, status) =
                            decompressor.decompress(black_box(input), &mut out).unwrap();
                        total += produced;
                        input = &input[used..];
                        if status == DecompressStatus::Done {
                            break 'feed;
                        }
                        if input.is_empty() && status == DecompressStatus::NeedsInput {
                            break;
                        }
                    }
                }
                black_box(total);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compression_levels,
    bench_compression_data_types,
    bench_decompression_sizes,
    bench_split_input,
);
criterion_main!(benches);
