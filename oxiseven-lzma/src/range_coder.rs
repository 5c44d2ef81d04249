//! Range coder for LZMA compression.
//!
//! The range coder is an entropy coding method similar to arithmetic coding.
//! LZMA uses a specific variant with:
//! - 32-bit range tracking
//! - Normalization when range drops below 2^24
//! - 11-bit probability model (2048 = 100%)
//!
//! The decoder never blocks on its byte source. It reads from an
//! [`InputBuffer`] that the driver fills; when the buffer runs dry before the
//! source is closed, the read reports [`Interrupt::NoInput`] and the caller
//! rolls the attempt back.

#[cfg(test)]
use crate::model::LzmaModel;
use crate::model::ProbTable;
use oxiseven_core::error::OxiSevenError;

/// Number of bits in probability model.
pub const PROB_BITS: u32 = 11;

/// Initial probability (50%).
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);

/// Probability scale, exclusive upper bound of every probability.
pub const PROB_MAX: u16 = 1 << PROB_BITS;

/// Number of bits to shift for probability update.
pub const MOVE_BITS: u32 = 5;

/// Top value for range normalization.
pub const TOP_VALUE: u32 = 1 << 24;

/// Number of bytes the decoder reads to prime its registers.
pub const INIT_BYTES: usize = 5;

/// Why a decode attempt stopped before completing a symbol.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// The input buffer is empty but the source is still open.
    NoInput,
    /// The attempt cannot succeed, whatever input follows.
    Fatal(OxiSevenError),
}

impl From<OxiSevenError> for Interrupt {
    fn from(err: OxiSevenError) -> Self {
        Self::Fatal(err)
    }
}

/// Result of one step of a resumable decode.
pub(crate) type Step<T> = std::result::Result<T, Interrupt>;

/// Compressed bytes handed to the decoder but not yet consumed.
#[derive(Debug, Default)]
pub struct InputBuffer {
    data: Vec<u8>,
    cursor: usize,
    closed: bool,
}

impl InputBuffer {
    /// Create an empty, open buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the source.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Mark the source as closed; reads past the end now fail.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the source is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes available to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Current read position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the read position back to an earlier cursor.
    pub fn rewind(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.data.len());
        self.cursor = cursor;
    }

    /// Take the next `n` bytes at once, if they are all present.
    pub fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.remaining() < n {
            return None;
        }
        let start = self.cursor;
        self.cursor += n;
        Some(&self.data[start..self.cursor])
    }

    /// Drop consumed bytes. Only valid while no cursor snapshot is held.
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            self.data.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    /// Release all buffered bytes.
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.cursor = 0;
    }

    pub(crate) fn read_byte(&mut self) -> Step<u8> {
        match self.data.get(self.cursor) {
            Some(&byte) => {
                self.cursor += 1;
                Ok(byte)
            }
            None if self.closed => Err(Interrupt::Fatal(OxiSevenError::truncated(1))),
            None => Err(Interrupt::NoInput),
        }
    }
}

/// The decoder's arithmetic registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRegisters {
    /// Width of the current interval.
    pub range: u32,
    /// Offset of the code value inside the interval.
    pub code: u32,
}

/// Range decoder for LZMA decompression.
#[derive(Debug)]
pub struct RangeDecoder {
    range: u32,
    code: u32,
    input: InputBuffer,
}

impl RangeDecoder {
    /// Create a decoder with an empty input buffer.
    pub fn new() -> Self {
        Self {
            range: 0xFFFF_FFFF,
            code: 0,
            input: InputBuffer::new(),
        }
    }

    /// The input buffer feeding this decoder.
    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    /// Mutable access to the input buffer.
    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    /// Snapshot of the registers.
    pub fn registers(&self) -> RangeRegisters {
        RangeRegisters {
            range: self.range,
            code: self.code,
        }
    }

    /// Restore registers from a snapshot.
    pub fn restore(&mut self, regs: RangeRegisters) {
        self.range = regs.range;
        self.code = regs.code;
    }

    /// Prime the registers from the first five bytes of the stream.
    pub(crate) fn init(&mut self) -> Step<()> {
        let first = self.input.read_byte()?;
        let mut code = 0u32;
        for _ in 1..INIT_BYTES {
            code = (code << 8) | u32::from(self.input.read_byte()?);
        }
        if first != 0 {
            return Err(Interrupt::Fatal(OxiSevenError::corrupted(
                0,
                "range coder stream must start with a zero byte",
            )));
        }
        self.range = 0xFFFF_FFFF;
        self.code = code;
        Ok(())
    }

    #[inline]
    fn normalize(&mut self) -> Step<()> {
        if self.range < TOP_VALUE {
            let byte = self.input.read_byte()?;
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(byte);
        }
        Ok(())
    }

    /// Decode a single bit with the given probability.
    #[inline]
    pub(crate) fn decode_bit(&mut self, prob: &mut u16) -> Step<u32> {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);

        let bit = if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            1
        };

        self.normalize()?;
        Ok(bit)
    }

    /// Decode `count` bits with fixed 50% probability, most significant first.
    pub(crate) fn decode_direct_bits(&mut self, count: u32) -> Step<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            self.range >>= 1;
            let bit = if self.code >= self.range {
                self.code -= self.range;
                1
            } else {
                0
            };
            result = (result << 1) | bit;
            self.normalize()?;
        }
        Ok(result)
    }
}

impl Default for RangeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bit-level decoder that addresses probabilities by table and index.
///
/// The tree helpers follow the layout described in [`crate::model`]: a tree is
/// named by the index of its root cell.
pub(crate) trait BitDecode {
    /// Decode one bit against the probability at `table[index]`.
    fn decode_bit(&mut self, table: ProbTable, index: usize) -> Step<u32>;

    /// Decode `count` unmodeled bits.
    fn decode_direct_bits(&mut self, count: u32) -> Step<u32>;

    /// Decode a `num_bits` symbol most-significant bit first.
    fn decode_tree(&mut self, table: ProbTable, root: usize, num_bits: u32) -> Step<u32> {
        let mut m = 1usize;
        for _ in 0..num_bits {
            let bit = self.decode_bit(table, root + m - 1)?;
            m = (m << 1) | bit as usize;
        }
        Ok((m - (1 << num_bits)) as u32)
    }

    /// Decode a `num_bits` symbol least-significant bit first.
    fn decode_reverse_tree(&mut self, table: ProbTable, root: usize, num_bits: u32) -> Step<u32> {
        let mut m = 1usize;
        let mut symbol = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(table, root + m - 1)?;
            m = (m << 1) | bit as usize;
            symbol |= bit << i;
        }
        Ok(symbol)
    }
}

/// Decodes straight against a model with no undo log.
#[cfg(test)]
pub(crate) struct PlainDecoder<'a> {
    pub rc: &'a mut RangeDecoder,
    pub model: &'a mut LzmaModel,
}

#[cfg(test)]
impl BitDecode for PlainDecoder<'_> {
    fn decode_bit(&mut self, table: ProbTable, index: usize) -> Step<u32> {
        self.rc.decode_bit(&mut self.model.table_mut(table)[index])
    }

    fn decode_direct_bits(&mut self, count: u32) -> Step<u32> {
        self.rc.decode_direct_bits(count)
    }
}

/// Range encoder for LZMA compression.
///
/// Output accumulates in an internal buffer that the driver drains at its own
/// pace.
#[derive(Debug)]
pub struct RangeEncoder {
    /// Output buffer.
    buffer: Vec<u8>,
    /// Bytes of `buffer` already handed to the sink.
    drained: usize,
    /// Current range.
    range: u32,
    /// Low value; bit 32 carries into the cached bytes.
    low: u64,
    /// Cache byte.
    cache: u8,
    /// Cache size.
    cache_size: u64,
    /// Bytes emitted so far, including drained ones.
    position: u64,
}

impl RangeEncoder {
    /// Create a new range encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            drained: 0,
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
            position: 0,
        }
    }

    /// Shift low and write bytes.
    ///
    /// A run of `0xFF` bytes is held back in `cache_size` until it is known
    /// whether a carry will turn it into `0x00`s.
    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut temp = self.cache;
            loop {
                self.buffer.push(temp.wrapping_add(carry));
                self.position += 1;
                temp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    /// Encode a single bit with the given probability.
    #[inline]
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * u32::from(*prob);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Encode the low `count` bits of `value` with fixed 50% probability.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.range >>= 1;
            if (value >> i) & 1 != 0 {
                self.low += u64::from(self.range);
            }
            if self.range < TOP_VALUE {
                self.range <<= 8;
                self.shift_low();
            }
        }
    }

    /// Encode a bit tree (normal order) rooted at `probs[root]`.
    pub fn encode_tree(&mut self, probs: &mut [u16], root: usize, num_bits: u32, symbol: u32) {
        let mut m = 1usize;
        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[root + m - 1], bit);
            m = (m << 1) | bit as usize;
        }
    }

    /// Encode a bit tree (reverse order) rooted at `probs[root]`.
    pub fn encode_reverse_tree(&mut self, probs: &mut [u16], root: usize, num_bits: u32, symbol: u32) {
        let mut m = 1usize;
        let mut symbol = symbol;
        for _ in 0..num_bits {
            let bit = symbol & 1;
            self.encode_bit(&mut probs[root + m - 1], bit);
            m = (m << 1) | bit as usize;
            symbol >>= 1;
        }
    }

    /// Flush the remaining state into the output buffer.
    pub fn flush(&mut self) {
        for _ in 0..5 {
            self.shift_low();
        }
    }

    /// Bytes produced but not yet drained.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.drained..]
    }

    /// Copy pending bytes into `out`, returning how many were copied.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let pending = &self.buffer[self.drained..];
        let n = pending.len().min(out.len());
        out[..n].copy_from_slice(&pending[..n]);
        self.drained += n;
        if self.drained == self.buffer.len() {
            self.buffer.clear();
            self.drained = 0;
        }
        n
    }

    /// Total number of bytes this encoder will have produced, counting bytes
    /// still held in the carry cache.
    pub fn processed_size(&self) -> u64 {
        self.position + self.cache_size + 4
    }

    /// Drop all buffered output.
    pub fn release(&mut self) {
        self.buffer = Vec::new();
        self.drained = 0;
    }

    /// Flush and return the encoded data.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.buffer.split_off(self.drained)
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LzmaProperties;

    fn decoder_over(bytes: &[u8]) -> RangeDecoder {
        let mut rc = RangeDecoder::new();
        rc.input_mut().push(bytes);
        rc.input_mut().close();
        rc.init().unwrap();
        rc
    }

    #[test]
    fn test_prob_constants() {
        assert_eq!(PROB_INIT, 1024);
        assert_eq!(PROB_MAX, 2048);
    }

    #[test]
    fn test_encode_decode_bits() {
        let bits = [0, 1, 0, 1, 1, 1, 0, 0, 1];
        let mut encoder = RangeEncoder::new();
        let mut prob = PROB_INIT;
        for &bit in &bits {
            encoder.encode_bit(&mut prob, bit);
        }
        let encoded = encoder.finish();
        assert_eq!(encoded[0], 0x00);

        let mut decoder = decoder_over(&encoded);
        let mut prob = PROB_INIT;
        for &bit in &bits {
            assert_eq!(decoder.decode_bit(&mut prob).unwrap(), bit);
        }
    }

    #[test]
    fn test_direct_bits_roundtrip() {
        let mut encoder = RangeEncoder::new();
        encoder.encode_direct_bits(0x2AB_CDEF, 26);
        encoder.encode_direct_bits(5, 3);
        let encoded = encoder.finish();

        let mut decoder = decoder_over(&encoded);
        assert_eq!(decoder.decode_direct_bits(26).unwrap(), 0x2AB_CDEF);
        assert_eq!(decoder.decode_direct_bits(3).unwrap(), 5);
    }

    #[test]
    fn test_tree_roundtrip() {
        let mut model = LzmaModel::new(LzmaProperties::default());
        let mut encoder = RangeEncoder::new();
        for symbol in [0u32, 63, 17, 42] {
            encoder.encode_tree(model.table_mut(ProbTable::PosSlot), 65, 6, symbol);
            encoder.encode_reverse_tree(model.table_mut(ProbTable::Align), 1, 4, symbol & 0xF);
        }
        let encoded = encoder.finish();

        let mut model = LzmaModel::new(LzmaProperties::default());
        let mut rc = decoder_over(&encoded);
        let mut decoder = PlainDecoder {
            rc: &mut rc,
            model: &mut model,
        };
        for symbol in [0u32, 63, 17, 42] {
            assert_eq!(decoder.decode_tree(ProbTable::PosSlot, 65, 6).unwrap(), symbol);
            assert_eq!(
                decoder.decode_reverse_tree(ProbTable::Align, 1, 4).unwrap(),
                symbol & 0xF
            );
        }
    }

    #[test]
    fn test_carry_propagation() {
        let mut encoder = RangeEncoder::new();
        let mut probs = [PROB_INIT; 4];
        // Long runs of likely bits drive low towards 0xFF.. and force carries.
        for i in 0..4000u32 {
            let bit = u32::from(i % 97 == 0);
            encoder.encode_bit(&mut probs[(i % 4) as usize], bit);
        }
        let encoded = encoder.finish();

        let mut decoder = decoder_over(&encoded);
        let mut probs = [PROB_INIT; 4];
        for i in 0..4000u32 {
            let bit = u32::from(i % 97 == 0);
            assert_eq!(decoder.decode_bit(&mut probs[(i % 4) as usize]).unwrap(), bit);
        }
    }

    #[test]
    fn test_nonzero_first_byte_is_corrupt() {
        let mut rc = RangeDecoder::new();
        rc.input_mut().push(&[1, 0, 0, 0, 0]);
        assert!(matches!(
            rc.init(),
            Err(Interrupt::Fatal(OxiSevenError::CorruptedInput { .. }))
        ));
    }

    #[test]
    fn test_empty_buffer_interrupts() {
        let mut rc = RangeDecoder::new();
        rc.input_mut().push(&[0, 0, 0]);
        assert!(matches!(rc.init(), Err(Interrupt::NoInput)));

        rc.input_mut().rewind(0);
        rc.input_mut().close();
        assert!(matches!(
            rc.init(),
            Err(Interrupt::Fatal(OxiSevenError::TruncatedInput { .. }))
        ));
    }

    #[test]
    fn test_drain_in_pieces() {
        let mut encoder = RangeEncoder::new();
        encoder.encode_direct_bits(0xDEAD_BEEF, 32);
        encoder.flush();
        let total = encoder.pending().len();

        let mut out = Vec::new();
        let mut piece = [0u8; 3];
        loop {
            let n = encoder.drain_into(&mut piece);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&piece[..n]);
        }
        assert_eq!(out.len(), total);
        assert!(encoder.pending().is_empty());
    }
}
