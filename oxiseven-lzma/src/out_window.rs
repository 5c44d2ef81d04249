//! Decoder output window.
//!
//! A ring buffer over the most recent decoded bytes. Matches are replayed from
//! it byte by byte, so a match may overlap the bytes it is producing. Bytes
//! stay "pending" until the driver drains them to the sink; the decoder checks
//! [`OutWindow::free`] before each symbol so pending bytes are never
//! overwritten.

/// Ring buffer of decoded bytes.
#[derive(Debug)]
pub struct OutWindow {
    buf: Vec<u8>,
    pos: usize,
    pending: usize,
    total: u64,
}

impl OutWindow {
    /// Create a window holding `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(1)],
            pos: 0,
            pending: 0,
            total: 0,
        }
    }

    /// Number of bytes written since creation.
    #[inline]
    pub fn total_pos(&self) -> u64 {
        self.total
    }

    /// Room left before pending bytes would be overwritten.
    #[inline]
    pub fn free(&self) -> usize {
        self.buf.len() - self.pending
    }

    /// Bytes written but not yet drained.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Append one byte.
    #[inline]
    pub fn put_byte(&mut self, byte: u8) {
        debug_assert!(self.pending < self.buf.len());
        self.buf[self.pos] = byte;
        self.pos += 1;
        if self.pos == self.buf.len() {
            self.pos = 0;
        }
        self.pending += 1;
        self.total += 1;
    }

    /// Byte `distance + 1` positions back.
    #[inline]
    pub fn get_byte(&self, distance: u32) -> u8 {
        let size = self.buf.len();
        let back = distance as usize + 1;
        let index = if back <= self.pos {
            self.pos - back
        } else {
            self.pos + size - back
        };
        self.buf[index]
    }

    /// Replay `len` bytes starting `distance + 1` positions back.
    pub fn copy_block(&mut self, distance: u32, len: usize) {
        debug_assert!(self.pending + len <= self.buf.len());
        let size = self.buf.len();
        let back = distance as usize + 1;
        let mut src = if back <= self.pos {
            self.pos - back
        } else {
            self.pos + size - back
        };

        if src + len <= self.pos || (src >= self.pos + len && src + len <= size) {
            // Source and destination are disjoint and contiguous.
            if self.pos + len <= size {
                self.buf.copy_within(src..src + len, self.pos);
                self.pos += len;
                if self.pos == size {
                    self.pos = 0;
                }
                self.pending += len;
                self.total += len as u64;
                return;
            }
        }

        for _ in 0..len {
            self.buf[self.pos] = self.buf[src];
            self.pos += 1;
            if self.pos == size {
                self.pos = 0;
            }
            src += 1;
            if src == size {
                src = 0;
            }
        }
        self.pending += len;
        self.total += len as u64;
    }

    /// Move pending bytes, oldest first, into `out`.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let size = self.buf.len();
        let mut written = 0;
        while written < out.len() && self.pending > 0 {
            let start = if self.pending <= self.pos {
                self.pos - self.pending
            } else {
                self.pos + size - self.pending
            };
            let run = (size - start).min(self.pending).min(out.len() - written);
            out[written..written + run].copy_from_slice(&self.buf[start..start + run]);
            written += run;
            self.pending -= run;
        }
        written
    }

    /// Release the buffer.
    pub fn release(&mut self) {
        self.buf = vec![0u8; 1];
        self.pos = 0;
        self.pending = 0;
    }
}
