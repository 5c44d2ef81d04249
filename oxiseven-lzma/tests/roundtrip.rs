//! Whole-buffer compression and decompression across presets and edge cases.

use oxiseven_core::{Compressor, OxiSevenError};
use oxiseven_lzma::header::HEADER_SIZE;
use oxiseven_lzma::{
    EncoderConfig, LzmaCompressor, LzmaEncoder, LzmaHeader, LzmaLevel, LzmaProperties,
    MatchFinderKind, compress, compress_with, decompress, decompress_bytes,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `"hello world"` at preset 1, as produced by the reference LZMA encoder.
const HELLO_STREAM: [u8; 34] = [
    0x5D, 0x00, 0x00, 0x01, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x34, 0x19,
    0x49, 0xEE, 0x8D, 0xE9, 0x17, 0x89, 0x3A, 0x33, 0x60, 0x05, 0xF7, 0xCF, 0x64, 0xFF, 0xFB, 0x78,
    0x20, 0x00,
];

/// Words with random separators and the odd burst of noise: long and short
/// matches, rep matches and literals all show up.
fn mixed_data(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: [&[u8]; 8] = [
        b"alpha", b"beta", b"gamma", b"delta", b"range", b"coder", b"window", b"folder",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len + 16);
    while data.len() < len {
        if rng.gen_range(0..50) == 0 {
            for _ in 0..rng.gen_range(1..40) {
                data.push(rng.r#gen::<u8>());
            }
        } else {
            data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())]);
            data.push(b" ,.\n"[rng.gen_range(0..4)]);
        }
    }
    data.truncate(len);
    data
}

fn random_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn dict_log2(level: u8) -> u32 {
    match level {
        1 => 16,
        2 | 4 => 20,
        3 => 19,
        5 => 21,
        6 => 22,
        7 => 23,
        8 => 24,
        _ => 25,
    }
}

#[test]
fn test_hello_world_reference_bytes() {
    let compressed = compress(b"hello world", LzmaLevel::FAST).unwrap();
    assert_eq!(compressed, HELLO_STREAM);
}

#[test]
fn test_hello_world_reference_decodes() {
    assert_eq!(decompress_bytes(&HELLO_STREAM).unwrap(), b"hello world");
    assert_eq!(decompress(&HELLO_STREAM[..]).unwrap(), b"hello world");
}

#[test]
fn test_all_presets_roundtrip() {
    let data = mixed_data(48 * 1024, 1);
    for level in 1..=9u8 {
        let compressed = compress(&data, LzmaLevel::new(level)).unwrap();
        let header = LzmaHeader::parse(&compressed[..HEADER_SIZE]).unwrap();

        assert_eq!(header.props, LzmaProperties::new(3, 0, 2), "level {level}");
        assert!(header.dict_size >= 1 << dict_log2(level), "level {level}");
        assert_eq!(header.uncompressed_size, Some(data.len() as u64));
        assert!(compressed.len() < data.len(), "level {level}");
        assert_eq!(decompress_bytes(&compressed).unwrap(), data, "level {level}");
    }
}

#[test]
fn test_presets_pick_match_finders() {
    assert_eq!(LzmaLevel::new(1).mode().match_finder, MatchFinderKind::Bt2);
    assert_eq!(LzmaLevel::new(2).mode().match_finder, MatchFinderKind::Bt2);
    for level in 3..=9 {
        assert_eq!(
            LzmaLevel::new(level).mode().match_finder,
            MatchFinderKind::Bt4
        );
    }
}

#[test]
fn test_empty_input() {
    let compressed = compress(b"", LzmaLevel::DEFAULT).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), b"");
}

#[test]
fn test_single_byte() {
    let compressed = compress(b"A", LzmaLevel::FAST).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), b"A");
}

#[test]
fn test_sizes_around_block_threshold() {
    let config = EncoderConfig::new(LzmaLevel::FAST);
    let threshold = LzmaEncoder::new(&config).unwrap().input_threshold();
    let data = mixed_data(threshold + 1, 2);

    for len in [threshold - 1, threshold, threshold + 1] {
        let compressed = compress_with(&data[..len], &config).unwrap();
        assert_eq!(decompress_bytes(&compressed).unwrap(), &data[..len], "len {len}");
    }
}

#[test]
fn test_input_far_larger_than_dictionary() {
    // Level 1 keeps a 64 KiB dictionary, so the window moves many times.
    let data = mixed_data(600 * 1024, 3);
    let compressed = compress(&data, LzmaLevel::FAST).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn test_repeated_byte_compresses_well() {
    let data = vec![b'a'; 10_000];
    let compressed = compress(&data, LzmaLevel::DEFAULT).unwrap();
    assert!(compressed.len() * 3 <= data.len());
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn test_random_data_roundtrip() {
    let data = random_data(100_000, 4);
    let compressed = compress(&data, LzmaLevel::new(3)).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn test_custom_configurations() {
    let data = mixed_data(70_000, 5);
    let configs = [
        EncoderConfig::new(LzmaLevel::FAST).with_fast_bytes(5),
        EncoderConfig::new(LzmaLevel::FAST).with_match_finder(MatchFinderKind::Bt4),
        EncoderConfig::new(LzmaLevel::new(4))
            .with_dict_size(1 << 12)
            .with_fast_bytes(273),
        EncoderConfig::new(LzmaLevel::DEFAULT).with_end_marker(false),
    ];
    for config in &configs {
        let compressed = compress_with(&data, config).unwrap();
        assert_eq!(decompress_bytes(&compressed).unwrap(), data, "{config:?}");
    }
}

#[test]
fn test_flipped_payload_bytes_are_detected() {
    for index in 17..=19 {
        for mask in [0x01u8, 0x10, 0x80, 0xFF] {
            let mut stream = HELLO_STREAM;
            stream[index] ^= mask;
            let result = decompress_bytes(&stream);
            assert!(
                matches!(result, Err(OxiSevenError::CorruptedInput { .. })),
                "byte {index} mask {mask:#04x}: {result:?}"
            );
        }
    }
}

#[test]
fn test_leading_match_is_corrupt() {
    // Props and dictionary of the hello stream, four bytes declared, then a
    // payload whose very first symbol is a match.
    let mut stream = HELLO_STREAM[..5].to_vec();
    stream.extend_from_slice(&4u64.to_le_bytes());
    stream.extend_from_slice(&[0x00, 0x7F, 0xFF, 0xFC, 0x00, 0x00]);
    assert!(matches!(
        decompress_bytes(&stream),
        Err(OxiSevenError::CorruptedInput { offset: 0, .. })
    ));

    stream[5..HEADER_SIZE].copy_from_slice(&[0xFFu8; 8]);
    assert!(matches!(
        decompress_bytes(&stream),
        Err(OxiSevenError::CorruptedInput { offset: 0, .. })
    ));
}

#[test]
fn test_distance_beyond_dictionary_is_corrupt() {
    // Random bytes, then a repeat of their first 2000 bytes from 20000 back.
    let mut data = random_data(20_000, 6);
    data.extend_from_within(..2000);
    let config = EncoderConfig::new(LzmaLevel::FAST).with_dict_size(1 << 16);
    let mut stream = compress_with(&data, &config).unwrap();
    assert_eq!(decompress_bytes(&stream).unwrap(), data);

    stream[1..5].copy_from_slice(&4096u32.to_le_bytes());
    match decompress_bytes(&stream) {
        Err(OxiSevenError::CorruptedInput { offset, message }) => {
            assert!(offset <= 20_000, "offset {offset}");
            assert!(message.contains("dictionary"), "{message}");
        }
        other => panic!("expected corrupted input, got {other:?}"),
    }
}

#[test]
fn test_zero_size_field_means_unknown() {
    let data = b"hello world hello world hello world";
    let mut compressor = LzmaCompressor::new(EncoderConfig::new(LzmaLevel::FAST)).unwrap();
    let mut stream = compressor.compress_all(data).unwrap();
    assert_eq!(&stream[5..HEADER_SIZE], &[0xFFu8; 8]);
    assert_eq!(decompress_bytes(&stream).unwrap(), data);

    stream[5..HEADER_SIZE].fill(0);
    assert_eq!(LzmaHeader::parse(&stream).unwrap().uncompressed_size, None);
    assert_eq!(decompress_bytes(&stream).unwrap(), data);

    // A sized stream still carries its end marker, so zeroing its size works too.
    let mut sized = compress(data, LzmaLevel::DEFAULT).unwrap();
    sized[5..HEADER_SIZE].fill(0);
    assert_eq!(decompress_bytes(&sized).unwrap(), data);
}

#[test]
fn test_truncated_streams() {
    // Inside the header, inside the payload, and inside the end marker.
    for len in [8, 20, 29] {
        assert!(
            matches!(
                decompress_bytes(&HELLO_STREAM[..len]),
                Err(OxiSevenError::TruncatedInput { .. })
            ),
            "cut at {len}"
        );
    }
}

#[test]
fn test_declared_size_shorter_than_payload() {
    let mut stream = HELLO_STREAM;
    stream[5] = 5;
    assert!(matches!(
        decompress_bytes(&stream),
        Err(OxiSevenError::CorruptedInput { .. })
    ));
}

#[test]
fn test_invalid_headers() {
    let mut stream = HELLO_STREAM;
    stream[0] = 225;
    assert!(matches!(
        decompress_bytes(&stream),
        Err(OxiSevenError::InvalidHeader { .. })
    ));

    let mut stream = HELLO_STREAM;
    stream[1..5].copy_from_slice(&1024u32.to_le_bytes());
    assert!(matches!(
        decompress_bytes(&stream),
        Err(OxiSevenError::InvalidHeader { .. })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = EncoderConfig::new(LzmaLevel::DEFAULT).with_dict_size(100);
    assert!(matches!(
        compress_with(b"data", &config),
        Err(OxiSevenError::InvalidConfig { .. })
    ));
}
