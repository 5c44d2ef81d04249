//! Encoder input window.
//!
//! A flat buffer holding the bytes the match finder may still refer to
//! (`keep_size_before`), the lookahead the parser needs (`keep_size_after`)
//! and some reserve. Positions are absolute stream offsets shifted by
//! `buffer_offset`; when `pos` passes the last safe position the live region is
//! moved to the front of the buffer and `buffer_offset` absorbs the shift.
//!
//! The window owns its byte source, a [`PendingInput`] queue the driver fills.
//! [`InWindow::read_block`] tops the buffer up from that queue and only
//! declares the stream ended once the queue is both empty and closed.

use std::collections::VecDeque;

/// Uncompressed bytes waiting to enter the window.
#[derive(Debug, Default)]
pub struct PendingInput {
    data: VecDeque<u8>,
    closed: bool,
}

impl PendingInput {
    /// Append bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Mark the end of the input.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the end of the input has been signalled.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move up to `out.len()` queued bytes into `out`.
    fn read_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len());
        for (dst, src) in out.iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn clear(&mut self) {
        self.data = VecDeque::new();
    }
}

/// Sliding input buffer of the encoder.
#[derive(Debug, Default)]
pub struct InWindow {
    buffer: Vec<u8>,
    source: PendingInput,
    buffer_offset: isize,
    block_size: usize,
    pos: u32,
    stream_pos: u32,
    pos_limit: i64,
    keep_size_before: u32,
    keep_size_after: u32,
    last_safe_position: usize,
    stream_end_reached: bool,
}

impl InWindow {
    /// Allocate the buffer for the given retention sizes.
    pub fn create(&mut self, keep_size_before: u32, keep_size_after: u32, keep_size_reserve: u32) {
        self.keep_size_before = keep_size_before;
        self.keep_size_after = keep_size_after;
        let block_size = (keep_size_before + keep_size_after + keep_size_reserve) as usize;
        if self.buffer.len() != block_size {
            self.buffer = vec![0u8; block_size];
        }
        self.block_size = block_size;
        self.last_safe_position = block_size - keep_size_after as usize;
    }

    /// Reset positions and fill the buffer from the source.
    pub fn init(&mut self) {
        self.buffer_offset = 0;
        self.pos = 0;
        self.stream_pos = 0;
        self.pos_limit = 0;
        self.stream_end_reached = false;
        self.read_block();
    }

    /// Size of the underlying buffer.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The byte source feeding this window.
    pub fn source(&self) -> &PendingInput {
        &self.source
    }

    /// Mutable access to the byte source.
    pub fn source_mut(&mut self) -> &mut PendingInput {
        &mut self.source
    }

    /// Current absolute position.
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// Whether the source has been read to its end.
    pub fn stream_end_reached(&self) -> bool {
        self.stream_end_reached
    }

    #[inline]
    fn index_of(&self, pos: i64) -> usize {
        (self.buffer_offset as i64 + pos) as usize
    }

    /// Shift the live region to the front of the buffer.
    fn move_block(&mut self) {
        let mut offset = self.index_of(i64::from(self.pos)) - self.keep_size_before as usize;
        // One extra byte, since move_pos advances before reading.
        if offset > 0 {
            offset -= 1;
        }
        let end = self.index_of(i64::from(self.stream_pos));
        self.buffer.copy_within(offset..end, 0);
        self.buffer_offset -= offset as isize;
        log::trace!("input window compacted by {offset} bytes");
    }

    /// Top the buffer up from the source.
    pub fn read_block(&mut self) {
        if self.stream_end_reached {
            return;
        }
        loop {
            let start = self.index_of(i64::from(self.stream_pos));
            let size = self.block_size - start;
            if size == 0 {
                return;
            }
            let read = self.source.read_into(&mut self.buffer[start..start + size]);
            if read == 0 {
                if self.source.is_closed() {
                    self.pos_limit = i64::from(self.stream_pos);
                    let limit_index = self.index_of(self.pos_limit);
                    if limit_index > self.last_safe_position {
                        self.pos_limit = self.last_safe_position as i64 - self.buffer_offset as i64;
                    }
                    self.stream_end_reached = true;
                }
                return;
            }
            self.stream_pos += read as u32;
            if self.stream_pos >= self.pos + self.keep_size_after {
                self.pos_limit = i64::from(self.stream_pos - self.keep_size_after);
            }
        }
    }

    /// Advance one byte, compacting and refilling when the limit is passed.
    pub fn move_pos(&mut self) {
        self.pos += 1;
        if i64::from(self.pos) > self.pos_limit {
            if self.index_of(i64::from(self.pos)) > self.last_safe_position {
                self.move_block();
            }
            self.read_block();
        }
    }

    /// Byte at `pos + index`.
    #[inline]
    pub fn index_byte(&self, index: i32) -> u8 {
        self.buffer[self.index_of(i64::from(self.pos) + i64::from(index))]
    }

    /// Length of the match at `pos + index` against the bytes `distance + 1`
    /// earlier, capped at `limit`.
    pub fn match_len(&self, index: i32, distance: u32, limit: u32) -> u32 {
        let start = i64::from(self.pos) + i64::from(index);
        let mut limit = i64::from(limit);
        if self.stream_end_reached && start + limit > i64::from(self.stream_pos) {
            limit = (i64::from(self.stream_pos) - start).max(0);
        }
        let cur = self.index_of(start);
        let back = cur - (distance as usize + 1);
        let limit = limit as usize;
        let mut len = 0;
        while len < limit && self.buffer[cur + len] == self.buffer[back + len] {
            len += 1;
        }
        len as u32
    }

    /// Bytes between `pos` and the end of the buffered stream.
    #[inline]
    pub fn available_bytes(&self) -> u32 {
        self.stream_pos - self.pos
    }

    /// Shift all absolute positions down by `sub_value`.
    pub fn reduce_offsets(&mut self, sub_value: i32) {
        self.buffer_offset += sub_value as isize;
        self.pos_limit -= i64::from(sub_value);
        self.pos = (i64::from(self.pos) - i64::from(sub_value)) as u32;
        self.stream_pos = (i64::from(self.stream_pos) - i64::from(sub_value)) as u32;
    }

    /// The raw buffer, for the match finder's tree walk.
    #[inline]
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Buffer index of the current position.
    #[inline]
    pub(crate) fn cur_index(&self) -> usize {
        self.index_of(i64::from(self.pos))
    }

    /// Buffer index of an absolute position.
    #[inline]
    pub(crate) fn buffer_index(&self, pos: u32) -> usize {
        self.index_of(i64::from(pos))
    }

    /// Absolute end of the buffered stream.
    #[inline]
    pub(crate) fn stream_pos(&self) -> u32 {
        self.stream_pos
    }

    /// Release the buffer and any queued input.
    pub fn release(&mut self) {
        self.buffer = Vec::new();
        self.source.clear();
        self.block_size = 0;
    }
}
