//! Integration tests for the chunk-driven drivers.
//!
//! Input and output are handed over in pieces of every size, down to a single
//! byte, and the result must match the one-shot functions exactly.

use oxiseven_core::traits::{CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode};
use oxiseven_core::OxiSevenError;
use oxiseven_lzma::header::{HEADER_SIZE, PROPS_SIZE};
use oxiseven_lzma::{
    DriverState, EncoderConfig, LzmaCompressor, LzmaDecompressor, LzmaHeader, LzmaLevel, compress,
    decompress_bytes, decompress_folder,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn text(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let lines: [&[u8]; 4] = [
        b"The quick brown fox jumps over the lazy dog.\n",
        b"Pack my box with five dozen liquor jugs.\n",
        b"0123456789 abcdefghij\n",
        b"\x00\x01\x02\x03\xFF\xFE",
    ];
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        data.extend_from_slice(lines[rng.gen_range(0..lines.len())]);
        if rng.gen_range(0..8) == 0 {
            data.push(rng.r#gen());
        }
    }
    data.truncate(len);
    data
}

/// Drive a compressor with input pieces and output buffers of random size.
fn compress_in_pieces(compressor: &mut LzmaCompressor, data: &[u8], seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let end = (pos + rng.gen_range(0..5000)).min(data.len());
        let flush = if end == data.len() {
            FlushMode::Finish
        } else {
            FlushMode::None
        };
        let mut buf = vec![0u8; rng.gen_range(1..700)];
        let (consumed, produced, status) = compressor
            .compress(&data[pos..end], &mut buf, flush)
            .expect("compress failed");
        pos += consumed;
        out.extend_from_slice(&buf[..produced]);
        if status == CompressStatus::Done {
            return out;
        }
    }
}

/// Feed `stream` in pieces of `piece` bytes into output buffers of `out_len`.
fn decompress_in_pieces(
    decompressor: &mut LzmaDecompressor,
    stream: &[u8],
    piece: usize,
    out_len: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_len];
    let mut pos = 0;
    loop {
        let end = (pos + piece).min(stream.len());
        if pos == stream.len() {
            decompressor.close_input();
        }
        let (consumed, produced, status) = decompressor
            .decompress(&stream[pos..end], &mut buf)
            .expect("decompress failed");
        pos += consumed;
        out.extend_from_slice(&buf[..produced]);
        if status == DecompressStatus::Done {
            return out;
        }
    }
}

// ============================================================================
// Compression
// ============================================================================

#[test]
fn test_pieces_match_one_shot_compression() {
    let data = text(250_000);
    let config = EncoderConfig::new(LzmaLevel::FAST);
    let mut compressor = LzmaCompressor::with_size(config, data.len() as u64).unwrap();
    let streamed = compress_in_pieces(&mut compressor, &data, 7);

    assert_eq!(streamed, compress(&data, LzmaLevel::FAST).unwrap());
    assert_eq!(compressor.state(), DriverState::Finished);
    assert_eq!(compressor.total_in(), data.len() as u64);
}

#[test]
fn test_unknown_size_stream() {
    let data = text(40_000);
    let mut compressor = LzmaCompressor::new(EncoderConfig::new(LzmaLevel::new(4))).unwrap();
    let stream = compress_in_pieces(&mut compressor, &data, 8);

    let header = LzmaHeader::parse(&stream[..HEADER_SIZE]).unwrap();
    assert_eq!(header.uncompressed_size, None);
    assert_eq!(decompress_bytes(&stream).unwrap(), data);
}

#[test]
fn test_output_arrives_before_input_ends() {
    let data = text(400_000);
    let mut compressor =
        LzmaCompressor::with_size(EncoderConfig::new(LzmaLevel::FAST), data.len() as u64)
            .unwrap();
    let mut buf = vec![0u8; 1 << 16];
    let mut produced_total = 0;
    let mut pos = 0;
    while pos < data.len() / 2 {
        let end = (pos + 10_000).min(data.len());
        let (consumed, produced, status) = compressor
            .compress(&data[pos..end], &mut buf, FlushMode::None)
            .unwrap();
        assert_ne!(status, CompressStatus::Done);
        pos += consumed;
        produced_total += produced;
    }
    assert!(produced_total > HEADER_SIZE);
}

#[test]
fn test_declared_size_is_enforced() {
    let mut short = LzmaCompressor::with_size(EncoderConfig::default(), 100).unwrap();
    assert!(matches!(
        short.compress_all(&[7u8; 99]),
        Err(OxiSevenError::BadState { .. })
    ));

    let mut long = LzmaCompressor::with_size(EncoderConfig::default(), 100).unwrap();
    assert!(matches!(
        long.compress_all(&[7u8; 101]),
        Err(OxiSevenError::BadState { .. })
    ));
}

#[test]
fn test_compressor_lifecycle() {
    let mut compressor = LzmaCompressor::new(EncoderConfig::new(LzmaLevel::FAST)).unwrap();
    assert_eq!(compressor.state(), DriverState::Idle);

    let first = compressor.compress_all(b"lifecycle").unwrap();
    assert!(compressor.is_finished());
    let mut buf = [0u8; 16];
    assert!(matches!(
        compressor.compress(b"more", &mut buf, FlushMode::Finish),
        Err(OxiSevenError::BadState { .. })
    ));

    compressor.reset();
    assert_eq!(compressor.state(), DriverState::Idle);
    assert_eq!(compressor.compress_all(b"lifecycle").unwrap(), first);
}

#[test]
fn test_compressor_cancel() {
    let data = text(100_000);
    let mut compressor = LzmaCompressor::new(EncoderConfig::new(LzmaLevel::FAST)).unwrap();
    let mut buf = vec![0u8; 4096];
    compressor
        .compress(&data, &mut buf, FlushMode::None)
        .unwrap();
    compressor.cancel();

    assert_eq!(compressor.state(), DriverState::Finished);
    assert!(matches!(
        compressor.compress(&data, &mut buf, FlushMode::Finish),
        Err(OxiSevenError::BadState { .. })
    ));
}

// ============================================================================
// Decompression
// ============================================================================

#[test]
fn test_split_input_matches_whole() {
    let data = text(120_000);
    let stream = compress(&data, LzmaLevel::DEFAULT).unwrap();
    let whole = decompress_bytes(&stream).unwrap();
    assert_eq!(whole, data);

    for (piece, out_len) in [(1, 1 << 16), (3, 333), (64, 1), (4096, 7), (stream.len(), 1 << 20)] {
        let mut decompressor = LzmaDecompressor::new();
        let out = decompress_in_pieces(&mut decompressor, &stream, piece, out_len);
        assert_eq!(out, whole, "piece {piece}, output {out_len}");
        assert_eq!(decompressor.total_out(), data.len() as u64);
    }
}

#[test]
fn test_byte_at_a_time_with_one_byte_output() {
    let data = text(3000);
    let stream = compress(&data, LzmaLevel::new(2)).unwrap();
    let mut decompressor = LzmaDecompressor::new();
    assert_eq!(decompress_in_pieces(&mut decompressor, &stream, 1, 1), data);
}

#[test]
fn test_random_split_points() {
    let data = text(60_000);
    let stream = compress(&data, LzmaLevel::new(6)).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let mut decompressor = LzmaDecompressor::new();
    let mut out = Vec::new();
    let mut buf = vec![0u8; 1000];
    let mut pos = 0;
    loop {
        let end = (pos + rng.gen_range(0..300)).min(stream.len());
        let (consumed, produced, status) =
            decompressor.decompress(&stream[pos..end], &mut buf).unwrap();
        pos += consumed;
        out.extend_from_slice(&buf[..produced]);
        if status == DecompressStatus::Done {
            break;
        }
    }
    assert_eq!(out, data);
}

#[test]
fn test_folder_stream() {
    let data = text(20_000);
    let stream = compress(&data, LzmaLevel::DEFAULT).unwrap();
    let mut props = [0u8; PROPS_SIZE];
    props.copy_from_slice(&stream[..PROPS_SIZE]);
    let packed = &stream[HEADER_SIZE..];

    assert_eq!(
        decompress_folder(props, Some(data.len() as u64), packed).unwrap(),
        data
    );
    assert_eq!(decompress_folder(props, None, packed).unwrap(), data);

    let mut decompressor = LzmaDecompressor::for_folder(props, Some(data.len() as u64)).unwrap();
    assert_eq!(decompress_in_pieces(&mut decompressor, packed, 5, 100), data);
}

#[test]
fn test_folder_rejects_bad_props() {
    assert!(matches!(
        LzmaDecompressor::for_folder([225, 0, 0, 1, 0], None),
        Err(OxiSevenError::InvalidHeader { .. })
    ));
    assert!(matches!(
        LzmaDecompressor::for_folder([0x5D, 0, 1, 0, 0], None),
        Err(OxiSevenError::InvalidHeader { .. })
    ));
}

#[test]
fn test_decompressor_lifecycle() {
    let stream = compress(b"lifecycle check", LzmaLevel::FAST).unwrap();
    let mut decompressor = LzmaDecompressor::new();
    assert_eq!(decompressor.state(), DriverState::Idle);

    let mut buf = [0u8; 64];
    let (consumed, _, status) = decompressor.decompress(&stream[..HEADER_SIZE], &mut buf).unwrap();
    assert_eq!(consumed, HEADER_SIZE);
    assert_eq!(status, DecompressStatus::NeedsInput);
    assert_eq!(decompressor.state(), DriverState::Alive);

    let (_, produced, status) = decompressor.decompress(&stream[HEADER_SIZE..], &mut buf).unwrap();
    assert_eq!(status, DecompressStatus::Done);
    assert_eq!(&buf[..produced], b"lifecycle check");
    assert_eq!(decompressor.state(), DriverState::Finished);

    assert!(matches!(
        decompressor.decompress(&[], &mut buf),
        Err(OxiSevenError::BadState { .. })
    ));

    decompressor.reset();
    assert_eq!(decompressor.decompress_all(&stream).unwrap(), b"lifecycle check");
}

#[test]
fn test_decompressor_cancel() {
    let data = text(50_000);
    let stream = compress(&data, LzmaLevel::FAST).unwrap();
    let mut decompressor = LzmaDecompressor::new();
    let mut buf = vec![0u8; 1024];
    decompressor
        .decompress(&stream[..stream.len() / 2], &mut buf)
        .unwrap();
    decompressor.cancel();

    assert_eq!(decompressor.state(), DriverState::Finished);
    assert!(matches!(
        decompressor.decompress(&stream[stream.len() / 2..], &mut buf),
        Err(OxiSevenError::BadState { .. })
    ));
}

#[test]
fn test_error_finishes_the_driver() {
    let mut stream = compress(b"hello world", LzmaLevel::FAST).unwrap();
    stream[18] ^= 0xFF;
    let mut decompressor = LzmaDecompressor::new();
    let mut buf = [0u8; 64];
    assert!(matches!(
        decompressor.decompress(&stream, &mut buf),
        Err(OxiSevenError::CorruptedInput { .. })
    ));
    assert!(decompressor.is_finished());
}

#[test]
fn test_truncated_stream_after_close() {
    let stream = compress(&text(5000), LzmaLevel::FAST).unwrap();
    let mut decompressor = LzmaDecompressor::new();
    assert!(matches!(
        decompressor.decompress_all(&stream[..stream.len() / 2]),
        Err(OxiSevenError::TruncatedInput { .. })
    ));
}
