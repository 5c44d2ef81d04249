//! Async I/O adapters for the chunk-driven codec traits.
//!
//! The codecs themselves never block. These wrappers pull bytes from a Tokio
//! [`AsyncRead`], hand them to a [`Compressor`] or [`Decompressor`] one chunk at
//! a time and push whatever the codec produces to an [`AsyncWrite`].
//!
//! # Feature Flag
//!
//! This module is only available when the `async-io` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! oxiseven-core = { version = "0.1.0", features = ["async-io"] }
//! ```

use crate::error::{OxiSevenError, Result};
use crate::traits::{CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default buffer size for async operations (32KB).
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// An async wrapper around a synchronous compressor.
pub struct AsyncCompressorWrapper<C> {
    inner: C,
    input_buffer: Vec<u8>,
    output_buffer: Vec<u8>,
}

impl<C: Compressor + Send> AsyncCompressorWrapper<C> {
    /// Create a new async compressor wrapper with default buffer size.
    pub fn new(compressor: C) -> Self {
        Self::with_buffer_size(compressor, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new async compressor wrapper with a custom buffer size.
    pub fn with_buffer_size(compressor: C, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            inner: compressor,
            input_buffer: vec![0u8; buffer_size],
            output_buffer: vec![0u8; buffer_size],
        }
    }

    /// Get a reference to the inner compressor.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Consume the wrapper and return the inner compressor.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Compress everything `input` yields into `output`.
    ///
    /// Returns the total number of bytes written to the output.
    pub async fn compress_stream<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<usize>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut total_written = 0usize;
        let mut pending = Vec::new();
        let mut eof_reached = false;

        loop {
            if pending.is_empty() && !eof_reached {
                let bytes_read = input.read(&mut self.input_buffer).await?;
                if bytes_read == 0 {
                    eof_reached = true;
                } else {
                    pending.extend_from_slice(&self.input_buffer[..bytes_read]);
                }
            }

            let flush = if eof_reached && pending.is_empty() {
                FlushMode::Finish
            } else {
                FlushMode::None
            };

            let (consumed, produced, status) =
                self.inner
                    .compress(&pending, &mut self.output_buffer, flush)?;
            pending.drain(..consumed);

            if produced > 0 {
                output.write_all(&self.output_buffer[..produced]).await?;
                total_written += produced;
            }

            if status == CompressStatus::Done {
                output.flush().await?;
                log::debug!("async compression finished, {total_written} bytes written");
                return Ok(total_written);
            }
        }
    }
}

/// An async wrapper around a synchronous decompressor.
pub struct AsyncDecompressorWrapper<D> {
    inner: D,
    input_buffer: Vec<u8>,
    output_buffer: Vec<u8>,
}

impl<D: Decompressor + Send> AsyncDecompressorWrapper<D> {
    /// Create a new async decompressor wrapper with default buffer size.
    pub fn new(decompressor: D) -> Self {
        Self::with_buffer_size(decompressor, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new async decompressor wrapper with a custom buffer size.
    pub fn with_buffer_size(decompressor: D, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            inner: decompressor,
            input_buffer: vec![0u8; buffer_size],
            output_buffer: vec![0u8; buffer_size],
        }
    }

    /// Get a reference to the inner decompressor.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Consume the wrapper and return the inner decompressor.
    pub fn into_inner(self) -> D {
        self.inner
    }

    /// Decompress everything `input` yields into `output`.
    ///
    /// Returns the total number of bytes written to the output. A source that
    /// ends before the stream is complete yields
    /// [`OxiSevenError::TruncatedInput`].
    pub async fn decompress_stream<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<usize>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut total_written = 0usize;
        let mut pending = Vec::new();
        let mut eof_reached = false;
        let mut closed = false;

        loop {
            if pending.is_empty() && !eof_reached {
                let bytes_read = input.read(&mut self.input_buffer).await?;
                if bytes_read == 0 {
                    eof_reached = true;
                } else {
                    pending.extend_from_slice(&self.input_buffer[..bytes_read]);
                }
            }

            let (consumed, produced, status) =
                self.inner.decompress(&pending, &mut self.output_buffer)?;
            pending.drain(..consumed);

            if produced > 0 {
                output.write_all(&self.output_buffer[..produced]).await?;
                total_written += produced;
            }

            match status {
                DecompressStatus::Done => {
                    output.flush().await?;
                    log::debug!("async decompression finished, {total_written} bytes written");
                    return Ok(total_written);
                }
                DecompressStatus::NeedsInput if eof_reached && pending.is_empty() => {
                    if closed {
                        return Err(OxiSevenError::truncated(1));
                    }
                    self.inner.close_input();
                    closed = true;
                }
                DecompressStatus::NeedsInput | DecompressStatus::NeedsOutput => {}
            }
        }
    }
}

/// A push-style decompressor for input that arrives in arbitrary pieces.
///
/// Each call to [`decompress_chunk`](Self::decompress_chunk) hands over the
/// next piece and returns whatever output it unlocked.
pub struct StreamingAsyncDecompressor<D> {
    inner: D,
    buffer: Vec<u8>,
}

impl<D: Decompressor + Send> StreamingAsyncDecompressor<D> {
    /// Create a new streaming decompressor.
    pub fn new(decompressor: D) -> Self {
        Self {
            inner: decompressor,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
        }
    }

    /// Feed one chunk of compressed data.
    ///
    /// Returns the decompressed bytes this chunk unlocked, which may be empty.
    /// Bytes that arrive after the stream is complete are ignored.
    pub fn decompress_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        if self.inner.is_finished() {
            return Ok(output);
        }
        let mut pos = 0;

        loop {
            let (consumed, produced, status) =
                self.inner.decompress(&data[pos..], &mut self.buffer)?;
            pos += consumed;
            output.extend_from_slice(&self.buffer[..produced]);

            match status {
                DecompressStatus::Done => return Ok(output),
                DecompressStatus::NeedsInput if pos >= data.len() => return Ok(output),
                DecompressStatus::NeedsInput | DecompressStatus::NeedsOutput => {}
            }
        }
    }

    /// Signal the end of input and collect the remaining output.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        if self.inner.is_finished() {
            return Ok(Vec::new());
        }
        self.inner.close_input();
        let output = self.decompress_chunk(&[])?;
        if !self.inner.is_finished() {
            return Err(OxiSevenError::truncated(1));
        }
        Ok(output)
    }

    /// Check if the decompressor has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Reset the decompressor for reuse.
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Byte-wise codec: `0xAA`, then each byte + 1, then `0xBB`.
    #[derive(Default)]
    struct ShiftCompressor {
        header_written: bool,
        finished: bool,
    }

    impl Compressor for ShiftCompressor {
        fn compress(
            &mut self,
            input: &[u8],
            output: &mut [u8],
            flush: FlushMode,
        ) -> Result<(usize, usize, CompressStatus)> {
            let mut out = 0;
            if !self.header_written {
                output[out] = 0xAA;
                out += 1;
                self.header_written = true;
            }
            let n = input.len().min(output.len() - out);
            for (dst, src) in output[out..out + n].iter_mut().zip(input) {
                *dst = src.wrapping_add(1);
            }
            out += n;
            if flush == FlushMode::Finish && n == input.len() && out < output.len() {
                output[out] = 0xBB;
                self.finished = true;
                return Ok((n, out + 1, CompressStatus::Done));
            }
            Ok((n, out, CompressStatus::NeedsInput))
        }

        fn reset(&mut self) {
            *self = Self::default();
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    #[derive(Default)]
    struct ShiftDecompressor {
        header_read: bool,
        finished: bool,
    }

    impl Decompressor for ShiftDecompressor {
        fn decompress(
            &mut self,
            input: &[u8],
            output: &mut [u8],
        ) -> Result<(usize, usize, DecompressStatus)> {
            let mut pos = 0;
            let mut out = 0;
            if !self.header_read {
                match input.first() {
                    None => return Ok((0, 0, DecompressStatus::NeedsInput)),
                    Some(0xAA) => self.header_read = true,
                    Some(_) => return Err(OxiSevenError::invalid_header("missing marker")),
                }
                pos = 1;
            }
            while pos < input.len() && out < output.len() {
                if input[pos] == 0xBB {
                    self.finished = true;
                    return Ok((pos + 1, out, DecompressStatus::Done));
                }
                output[out] = input[pos].wrapping_sub(1);
                pos += 1;
                out += 1;
            }
            let status = if pos < input.len() {
                DecompressStatus::NeedsOutput
            } else {
                DecompressStatus::NeedsInput
            };
            Ok((pos, out, status))
        }

        fn reset(&mut self) {
            *self = Self::default();
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let original = b"Hello, World! This is a test of async compression.";

        let mut compressor = AsyncCompressorWrapper::with_buffer_size(ShiftCompressor::default(), 8);
        let mut compressed = Vec::new();
        compressor
            .compress_stream(&mut Cursor::new(original.to_vec()), &mut compressed)
            .await
            .unwrap();
        assert!(compressor.inner().is_finished());

        let mut decompressor =
            AsyncDecompressorWrapper::with_buffer_size(ShiftDecompressor::default(), 5);
        let mut decompressed = Vec::new();
        let written = decompressor
            .decompress_stream(&mut Cursor::new(compressed), &mut decompressed)
            .await
            .unwrap();

        assert_eq!(written, original.len());
        assert_eq!(decompressed, original);
    }

    #[tokio::test]
    async fn test_async_truncated_source() {
        let mut decompressor = AsyncDecompressorWrapper::new(ShiftDecompressor::default());
        let mut sink = Vec::new();
        let err = decompressor
            .decompress_stream(&mut Cursor::new(vec![0xAA, 0x42]), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, OxiSevenError::TruncatedInput { .. }));
    }

    #[test]
    fn test_streaming_decompressor_chunks() {
        let mut streaming = StreamingAsyncDecompressor::new(ShiftDecompressor::default());
        let mut out = streaming.decompress_chunk(&[0xAA, b'a' + 1]).unwrap();
        assert!(!streaming.is_finished());
        out.extend(streaming.decompress_chunk(&[b'b' + 1, 0xBB]).unwrap());
        assert!(streaming.is_finished());
        assert_eq!(out, b"ab");
    }

    #[test]
    fn test_streaming_finish_without_end() {
        let mut streaming = StreamingAsyncDecompressor::new(ShiftDecompressor::default());
        streaming.decompress_chunk(&[0xAA]).unwrap();
        assert!(streaming.finish().is_err());
    }
}
