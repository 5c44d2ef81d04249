//! Chunk-driven LZMA drivers.
//!
//! [`LzmaCompressor`] and [`LzmaDecompressor`] adapt the block encoder and the
//! resumable decoder to the [`Compressor`] / [`Decompressor`] traits. Each
//! call does a bounded amount of work against the slices it is handed and
//! reports what it is waiting for. Compressed output is only ever produced in
//! order and is never taken back.
//!
//! Both drivers move through [`DriverState`]: `Idle` until the first call,
//! `Alive` while coding, `Finished` once the stream is complete or the driver
//! was cancelled. Calls after that fail with `BadState`.

use crate::EncoderConfig;
use crate::decoder::{ChunkStatus, LzmaDecoder};
use crate::encoder::LzmaEncoder;
use crate::header::{HEADER_SIZE, LzmaHeader, PROPS_SIZE};
use oxiseven_core::error::{OxiSevenError, Result};
use oxiseven_core::traits::{CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode};

/// Compressed bytes the decompressor buffers ahead of the decoder.
const MAX_BUFFERED_INPUT: usize = 1 << 16;

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Created or reset, nothing processed yet.
    Idle,
    /// Coding in progress.
    Alive,
    /// Stream complete, failed or cancelled.
    Finished,
}

/// Streaming `.lzma` compressor: writes the 13-byte header, then the payload.
#[derive(Debug)]
pub struct LzmaCompressor {
    config: EncoderConfig,
    declared_size: Option<u64>,
    encoder: Option<LzmaEncoder>,
    header: [u8; HEADER_SIZE],
    header_written: usize,
    total_in: u64,
    state: DriverState,
    cancelled: bool,
}

impl LzmaCompressor {
    /// Create a compressor that writes the size as unknown.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a compressor for exactly `size` input bytes, written to the
    /// header. Feeding a different amount fails with `BadState`.
    pub fn with_size(config: EncoderConfig, size: u64) -> Result<Self> {
        Self::build(config, Some(size))
    }

    fn build(config: EncoderConfig, declared_size: Option<u64>) -> Result<Self> {
        config.validate()?;
        let config = config.for_declared_size(declared_size);
        let header = LzmaHeader::new(config.properties(), config.dict_size(), declared_size);
        Ok(Self {
            config,
            declared_size,
            encoder: None,
            header: header.to_bytes(),
            header_written: 0,
            total_in: 0,
            state: DriverState::Idle,
            cancelled: false,
        })
    }

    /// The header this compressor writes.
    pub fn header(&self) -> LzmaHeader {
        LzmaHeader::new(
            self.config.properties(),
            self.config.dict_size(),
            self.declared_size,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Uncompressed bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Abort the stream and release its buffers.
    pub fn cancel(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.release();
        }
        self.encoder = None;
        self.state = DriverState::Finished;
        self.cancelled = true;
        log::debug!("lzma compressor cancelled after {} bytes", self.total_in);
    }

    fn finished_error(&self) -> OxiSevenError {
        if self.cancelled {
            OxiSevenError::bad_state("compressor was cancelled")
        } else {
            OxiSevenError::bad_state("compressor already finished")
        }
    }

    fn run(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        if self.state == DriverState::Idle {
            self.encoder = Some(LzmaEncoder::new(&self.config)?);
            self.state = DriverState::Alive;
            log::debug!("lzma compressor alive, declared size {:?}", self.declared_size);
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(OxiSevenError::bad_state("compressor has no encoder"));
        };

        let mut consumed = 0;
        let mut produced = 0;

        if self.header_written < HEADER_SIZE {
            let n = (HEADER_SIZE - self.header_written).min(output.len());
            output[..n].copy_from_slice(&self.header[self.header_written..self.header_written + n]);
            self.header_written += n;
            produced = n;
            if self.header_written < HEADER_SIZE {
                return Ok((0, produced, CompressStatus::NeedsOutput));
            }
        }

        loop {
            produced += encoder.drain_output(&mut output[produced..]);
            if encoder.pending_output() > 0 {
                return Ok((consumed, produced, CompressStatus::NeedsOutput));
            }
            if encoder.is_finished() {
                self.state = DriverState::Finished;
                log::debug!("lzma compressor finished: in={}", self.total_in);
                return Ok((consumed, produced, CompressStatus::Done));
            }

            if !encoder.is_input_closed() {
                let room = encoder
                    .input_threshold()
                    .saturating_sub(encoder.pending_input());
                let take = room.min(input.len() - consumed);
                if take > 0 {
                    self.total_in += take as u64;
                    if let Some(size) = self.declared_size {
                        if self.total_in > size {
                            return Err(OxiSevenError::bad_state(format!(
                                "input exceeds the declared size of {size} bytes"
                            )));
                        }
                    }
                    encoder.push_input(&input[consumed..consumed + take]);
                    consumed += take;
                }
                if consumed == input.len() && flush == FlushMode::Finish {
                    if let Some(size) = self.declared_size {
                        if self.total_in != size {
                            return Err(OxiSevenError::bad_state(format!(
                                "input ended after {} of {size} declared bytes",
                                self.total_in
                            )));
                        }
                    }
                    encoder.close_input();
                }
            }

            if !encoder.is_ready() {
                return Ok((consumed, produced, CompressStatus::NeedsInput));
            }
            encoder.code_one_block();
        }
    }
}

impl Compressor for LzmaCompressor {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        if self.state == DriverState::Finished {
            return Err(self.finished_error());
        }
        let result = self.run(input, output, flush);
        if result.is_err() {
            self.state = DriverState::Finished;
        }
        result
    }

    fn reset(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.release();
        }
        self.encoder = None;
        self.header_written = 0;
        self.total_in = 0;
        self.state = DriverState::Idle;
        self.cancelled = false;
    }

    fn is_finished(&self) -> bool {
        self.state == DriverState::Finished
    }
}

/// Streaming LZMA decompressor for the `.lzma` form or a 7z folder.
#[derive(Debug)]
pub struct LzmaDecompressor {
    folder_header: Option<LzmaHeader>,
    header_buf: Vec<u8>,
    decoder: Option<LzmaDecoder>,
    input_closed: bool,
    state: DriverState,
    cancelled: bool,
}

impl LzmaDecompressor {
    /// Decompressor for a `.lzma` stream that starts with a 13-byte header.
    pub fn new() -> Self {
        Self {
            folder_header: None,
            header_buf: Vec::with_capacity(HEADER_SIZE),
            decoder: None,
            input_closed: false,
            state: DriverState::Idle,
            cancelled: false,
        }
    }

    /// Decompressor for a 7z folder, given its five coder property bytes
    /// and the unpacked size from the folder record.
    pub fn for_folder(props: [u8; PROPS_SIZE], declared_size: Option<u64>) -> Result<Self> {
        let header = LzmaHeader::from_folder(props, declared_size)?;
        Ok(Self {
            folder_header: Some(header),
            ..Self::new()
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.decoder.as_ref().map_or(0, LzmaDecoder::total_out)
    }

    /// Abort the stream, dropping buffered input and output.
    pub fn cancel(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.release();
        }
        self.decoder = None;
        self.header_buf = Vec::new();
        self.state = DriverState::Finished;
        self.cancelled = true;
        log::debug!("lzma decompressor cancelled");
    }

    /// Take header bytes from `input`; returns how many were used and the
    /// header once complete.
    fn accept_header(&mut self, input: &[u8]) -> Result<(usize, Option<LzmaHeader>)> {
        if let Some(header) = self.folder_header {
            return Ok((0, Some(header)));
        }
        let take = (HEADER_SIZE - self.header_buf.len()).min(input.len());
        self.header_buf.extend_from_slice(&input[..take]);
        if self.header_buf.len() < HEADER_SIZE {
            if self.input_closed {
                return Err(OxiSevenError::truncated(HEADER_SIZE - self.header_buf.len()));
            }
            return Ok((take, None));
        }
        Ok((take, Some(LzmaHeader::parse(&self.header_buf)?)))
    }

    fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize, DecompressStatus)> {
        let mut consumed = 0;
        if self.decoder.is_none() {
            let (used, header) = self.accept_header(input)?;
            consumed = used;
            let Some(header) = header else {
                return Ok((consumed, 0, DecompressStatus::NeedsInput));
            };
            log::debug!(
                "lzma header: props={:?} dict={} size={:?}",
                header.props,
                header.dict_size,
                header.uncompressed_size
            );
            let mut decoder = LzmaDecoder::from_header(&header);
            if self.input_closed {
                decoder.input_mut().close();
            }
            self.decoder = Some(decoder);
            self.state = DriverState::Alive;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(OxiSevenError::bad_state("decompressor has no decoder"));
        };

        let mut produced = 0;
        loop {
            produced += decoder.drain_into(&mut output[produced..]);
            if decoder.pending_output() > 0 {
                return Ok((consumed, produced, DecompressStatus::NeedsOutput));
            }
            if decoder.is_finished() {
                self.state = DriverState::Finished;
                return Ok((consumed, produced, DecompressStatus::Done));
            }

            let room = MAX_BUFFERED_INPUT.saturating_sub(decoder.input().remaining());
            let take = room.min(input.len() - consumed);
            decoder.input_mut().push(&input[consumed..consumed + take]);
            consumed += take;

            match decoder.decode_chunk()? {
                ChunkStatus::NeedsInput if consumed == input.len() => {
                    produced += decoder.drain_into(&mut output[produced..]);
                    let status = if decoder.pending_output() > 0 {
                        DecompressStatus::NeedsOutput
                    } else {
                        DecompressStatus::NeedsInput
                    };
                    return Ok((consumed, produced, status));
                }
                ChunkStatus::NeedsInput | ChunkStatus::NeedsOutput | ChunkStatus::Finished => {}
            }
        }
    }
}

impl Default for LzmaDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for LzmaDecompressor {
    fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, DecompressStatus)> {
        if self.state == DriverState::Finished {
            return Err(if self.cancelled {
                OxiSevenError::bad_state("decompressor was cancelled")
            } else {
                OxiSevenError::bad_state("decompressor already finished")
            });
        }
        let result = self.run(input, output);
        if result.is_err() {
            self.state = DriverState::Finished;
        }
        result
    }

    fn close_input(&mut self) {
        self.input_closed = true;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.input_mut().close();
        }
    }

    fn reset(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.release();
        }
        self.decoder = None;
        self.header_buf.clear();
        self.input_closed = false;
        self.state = DriverState::Idle;
        self.cancelled = false;
    }

    fn is_finished(&self) -> bool {
        self.state == DriverState::Finished
    }
}
