//! # OxiSeven LZMA
//!
//! A resumable, chunk-driven LZMA codec engine of the kind used inside 7z
//! folders and `.lzma` files.
//!
//! ## Features
//!
//! - **Pure Rust**, no unsafe code
//! - Optimal-parsing encoder with BT2/BT4 binary-tree match finders and
//!   presets 1-9
//! - Decoder that accepts input split at any byte: a symbol cut short by the
//!   end of the buffered input is rolled back and retried once more arrives
//! - Streaming [`Compressor`](oxiseven_core::Compressor) /
//!   [`Decompressor`](oxiseven_core::Decompressor) drivers with backpressure
//!   and cancellation
//!
//! ## Usage
//!
//! ```rust
//! use oxiseven_lzma::{LzmaLevel, compress, decompress_bytes};
//!
//! let data = b"Hello, World! Hello, World!";
//! let compressed = compress(data, LzmaLevel::DEFAULT)?;
//! assert_eq!(decompress_bytes(&compressed)?, data);
//! # Ok::<(), oxiseven_core::OxiSevenError>(())
//! ```
//!
//! Streaming, with input and output arriving in pieces:
//!
//! ```rust
//! use oxiseven_core::{Compressor, Decompressor};
//! use oxiseven_lzma::{EncoderConfig, LzmaCompressor, LzmaDecompressor, LzmaLevel};
//!
//! let mut compressor = LzmaCompressor::new(EncoderConfig::new(LzmaLevel::FAST))?;
//! let compressed = compressor.compress_all(b"streamed bytes")?;
//! let mut decompressor = LzmaDecompressor::new();
//! assert_eq!(decompressor.decompress_all(&compressed)?, b"streamed bytes");
//! # Ok::<(), oxiseven_core::OxiSevenError>(())
//! ```
//!
//! ## Stream layout
//!
//! 1. Properties byte `(pb * 5 + lp) * 9 + lc`
//! 2. Dictionary size (4 bytes, little-endian)
//! 3. Uncompressed size (8 bytes, little-endian, all `0xFF` = unknown)
//! 4. Range-coded payload
//!
//! A 7z folder stores only the first five bytes, as coder properties; see
//! [`LzmaDecompressor::for_folder`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod chunker;
pub mod coders;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod in_window;
pub mod match_finder;
pub mod model;
pub mod optimal;
pub mod out_window;
pub mod price;
pub mod range_coder;

// Re-exports
pub use chunker::{DriverState, LzmaCompressor, LzmaDecompressor};
pub use decoder::{ChunkStatus, LzmaDecoder};
pub use encoder::LzmaEncoder;
pub use header::LzmaHeader;
pub use match_finder::MatchFinderKind;
pub use model::{DICT_SIZE_MAX, DICT_SIZE_MIN, LzmaProperties, MATCH_LEN_MAX};

use oxiseven_core::error::{OxiSevenError, Result};
use oxiseven_core::traits::{DecompressStatus, Decompressor};
use std::io::Read;

/// Smallest accepted fast-bytes value.
pub const FAST_BYTES_MIN: u32 = 5;

/// LZMA compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaLevel(u8);

impl LzmaLevel {
    /// Fastest compression (level 1).
    pub const FAST: Self = Self(1);
    /// Default compression (level 5).
    pub const DEFAULT: Self = Self(5);
    /// Best compression (level 9).
    pub const BEST: Self = Self(9);

    /// Create a new compression level, clamped to `1..=9`.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Encoder parameters of this level.
    pub fn mode(&self) -> EncoderMode {
        let (search_depth_log2, fast_bytes, match_finder) = match self.0 {
            1 => (16, 64, MatchFinderKind::Bt2),
            2 => (20, 64, MatchFinderKind::Bt2),
            3 => (19, 64, MatchFinderKind::Bt4),
            4 => (20, 64, MatchFinderKind::Bt4),
            5 => (21, 128, MatchFinderKind::Bt4),
            6 => (22, 128, MatchFinderKind::Bt4),
            7 => (23, 128, MatchFinderKind::Bt4),
            8 => (24, 255, MatchFinderKind::Bt4),
            _ => (25, 255, MatchFinderKind::Bt4),
        };
        EncoderMode {
            search_depth_log2,
            fast_bytes,
            match_finder,
        }
    }

    /// Get the dictionary size for this level.
    pub fn dict_size(&self) -> u32 {
        1 << self.mode().search_depth_log2
    }
}

impl Default for LzmaLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The encoder parameters a level stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderMode {
    /// Base-2 logarithm of the dictionary size.
    pub search_depth_log2: u32,
    /// Match length the parser accepts without further search.
    pub fast_bytes: u32,
    /// Binary-tree match finder variant.
    pub match_finder: MatchFinderKind,
}

/// Encoder configuration, built from a level and adjusted field by field.
///
/// Literal and position bits are fixed at `lc=3, lp=0, pb=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    dict_size: u32,
    fast_bytes: u32,
    match_finder: MatchFinderKind,
    end_marker: bool,
}

impl EncoderConfig {
    /// Configuration of a preset level. The end marker is written.
    pub fn new(level: LzmaLevel) -> Self {
        let mode = level.mode();
        Self {
            dict_size: 1 << mode.search_depth_log2,
            fast_bytes: mode.fast_bytes,
            match_finder: mode.match_finder,
            end_marker: true,
        }
    }

    /// Set the dictionary size.
    pub fn with_dict_size(mut self, dict_size: u32) -> Self {
        self.dict_size = dict_size;
        self
    }

    /// Set the fast-bytes value.
    pub fn with_fast_bytes(mut self, fast_bytes: u32) -> Self {
        self.fast_bytes = fast_bytes;
        self
    }

    /// Select the match finder.
    pub fn with_match_finder(mut self, match_finder: MatchFinderKind) -> Self {
        self.match_finder = match_finder;
        self
    }

    /// Write or omit the end-of-stream marker.
    ///
    /// Streams whose header does not carry a usable size always get one.
    pub fn with_end_marker(mut self, end_marker: bool) -> Self {
        self.end_marker = end_marker;
        self
    }

    /// Dictionary size.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Fast-bytes value.
    pub fn fast_bytes(&self) -> u32 {
        self.fast_bytes
    }

    /// Match finder variant.
    pub fn match_finder(&self) -> MatchFinderKind {
        self.match_finder
    }

    /// Whether the end marker is written.
    pub fn end_marker(&self) -> bool {
        self.end_marker
    }

    /// The configuration for a stream whose header declares `size`.
    ///
    /// A size that reads back as unknown (none, or zero) needs the end marker.
    pub(crate) fn for_declared_size(self, size: Option<u64>) -> Self {
        match size {
            None | Some(0) => self.with_end_marker(true),
            Some(_) => self,
        }
    }

    /// Literal and position bits of the streams this configuration writes.
    pub fn properties(&self) -> LzmaProperties {
        LzmaProperties::default()
    }

    /// Check every field against the format's limits.
    pub fn validate(&self) -> Result<()> {
        if !(DICT_SIZE_MIN..=DICT_SIZE_MAX).contains(&self.dict_size) {
            return Err(OxiSevenError::invalid_config(format!(
                "dictionary size {} outside [{DICT_SIZE_MIN}, {DICT_SIZE_MAX}]",
                self.dict_size
            )));
        }
        if !(FAST_BYTES_MIN..=MATCH_LEN_MAX as u32).contains(&self.fast_bytes) {
            return Err(OxiSevenError::invalid_config(format!(
                "fast bytes {} outside [{FAST_BYTES_MIN}, {MATCH_LEN_MAX}]",
                self.fast_bytes
            )));
        }
        let props = self.properties();
        if props.pb > 4 {
            return Err(OxiSevenError::invalid_config("pb must be at most 4"));
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new(LzmaLevel::DEFAULT)
    }
}

/// Compress `data` into a `.lzma` stream with its size in the header.
pub fn compress(data: &[u8], level: LzmaLevel) -> Result<Vec<u8>> {
    compress_with(data, &EncoderConfig::new(level))
}

/// Compress `data` with an explicit configuration.
pub fn compress_with(data: &[u8], config: &EncoderConfig) -> Result<Vec<u8>> {
    let config = config.for_declared_size(Some(data.len() as u64));
    let encoder = LzmaEncoder::new(&config)?;
    let header = LzmaHeader::new(
        encoder.properties(),
        encoder.dict_size(),
        Some(data.len() as u64),
    );
    let payload = encoder.compress(data);

    let mut out = Vec::with_capacity(header::HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decompress a `.lzma` stream read from `reader`.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    drive_reader(&mut LzmaDecompressor::new(), reader)
}

/// Decompress a `.lzma` stream held in memory.
///
/// This is a convenience wrapper around [`decompress`] that reads from a slice.
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    decompress(data)
}

/// Decompress the packed stream of a 7z folder.
pub fn decompress_folder(
    props: [u8; header::PROPS_SIZE],
    declared_size: Option<u64>,
    data: &[u8],
) -> Result<Vec<u8>> {
    LzmaDecompressor::for_folder(props, declared_size)?.decompress_all(data)
}

fn drive_reader<R: Read>(decompressor: &mut LzmaDecompressor, mut reader: R) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut chunk = vec![0u8; 1 << 16];
    let mut buffer = vec![0u8; 1 << 16];
    let mut start = 0;
    let mut filled = 0;
    let mut closed = false;

    loop {
        if start == filled && !closed {
            filled = reader.read(&mut chunk)?;
            start = 0;
            if filled == 0 {
                decompressor.close_input();
                closed = true;
            }
        }

        let (used, produced, status) = decompressor.decompress(&chunk[start..filled], &mut buffer)?;
        start += used;
        output.extend_from_slice(&buffer[..produced]);

        match status {
            DecompressStatus::Done => return Ok(output),
            DecompressStatus::NeedsInput if closed && start == filled && produced == 0 => {
                return Err(OxiSevenError::truncated(1));
            }
            DecompressStatus::NeedsInput | DecompressStatus::NeedsOutput => {}
        }
    }
}
