//! Binary-tree match finder.
//!
//! Every position is inserted into a binary search tree keyed by the bytes
//! that follow it; the tree for a hash bucket is threaded through the `son`
//! array, two links per position of the cyclic history. A lookup walks the
//! tree from the newest candidate towards older ones, reporting each strictly
//! longer match it meets, and relinks the nodes it passes so the current
//! position becomes the new root. `cut_value` bounds the number of nodes
//! visited.
//!
//! Two flavors exist:
//! - [`MatchFinderKind::Bt2`] hashes two bytes.
//! - [`MatchFinderKind::Bt4`] hashes four bytes and keeps side tables for
//!   2- and 3-byte matches.

use crate::in_window::InWindow;

/// Size of the 2-byte side hash of BT4.
const HASH2_SIZE: u32 = 1 << 10;
/// Size of the 3-byte side hash of BT4.
const HASH3_SIZE: u32 = 1 << 16;
/// Size of the main hash of BT2.
const BT2_HASH_SIZE: u32 = 1 << 16;
const HASH3_OFFSET: usize = HASH2_SIZE as usize;
const EMPTY_HASH_VALUE: u32 = 0;
const MAX_VAL_FOR_NORMALIZE: u32 = (1 << 30) - 1;
const START_MAX_LEN: u32 = 1;

static CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = i as u32;
        let mut j = 0;
        while j < 8 {
            r = if r & 1 != 0 { (r >> 1) ^ 0xEDB8_8320 } else { r >> 1 };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Which hash the match finder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchFinderKind {
    /// Binary tree over a 2-byte hash.
    Bt2,
    /// Binary tree over a 4-byte hash with 2- and 3-byte side tables.
    #[default]
    Bt4,
}

/// Binary-tree match finder over an [`InWindow`].
#[derive(Debug)]
pub struct BinTree {
    window: InWindow,
    kind: MatchFinderKind,
    cyclic_buffer_pos: u32,
    cyclic_buffer_size: u32,
    match_max_len: u32,
    son: Vec<u32>,
    hash: Vec<u32>,
    cut_value: u32,
    hash_mask: u32,
    fix_hash_size: usize,
    num_hash_direct_bytes: u32,
    min_match_check: u32,
    hash_dirty: bool,
}

impl BinTree {
    /// Create an unallocated match finder of the given kind.
    pub fn new(kind: MatchFinderKind) -> Self {
        let (fix_hash_size, num_hash_direct_bytes, min_match_check) = match kind {
            MatchFinderKind::Bt4 => ((HASH2_SIZE + HASH3_SIZE) as usize, 0, 4),
            MatchFinderKind::Bt2 => (0, 2, 3),
        };
        Self {
            window: InWindow::default(),
            kind,
            cyclic_buffer_pos: 0,
            cyclic_buffer_size: 0,
            match_max_len: 0,
            son: Vec::new(),
            hash: Vec::new(),
            cut_value: 0xFF,
            hash_mask: 0,
            fix_hash_size,
            num_hash_direct_bytes,
            min_match_check,
            hash_dirty: false,
        }
    }

    /// Allocate the window and tables.
    ///
    /// `history_size` is the dictionary size, `keep_before` the extra history
    /// kept for the parser, `match_max_len` the longest match reported and
    /// `keep_after` the extra lookahead kept beyond it.
    pub fn create(&mut self, history_size: u32, keep_before: u32, match_max_len: u32, keep_after: u32) {
        self.cut_value = 16 + (match_max_len >> 1);
        let reserve = (history_size + keep_before + match_max_len + keep_after) / 2 + 256;
        self.window
            .create(history_size + keep_before, match_max_len + keep_after, reserve);
        self.match_max_len = match_max_len;

        let cyclic_buffer_size = history_size + 1;
        if self.cyclic_buffer_size != cyclic_buffer_size {
            self.cyclic_buffer_size = cyclic_buffer_size;
            self.son = vec![0; cyclic_buffer_size as usize * 2];
        }

        let hash_size = match self.kind {
            MatchFinderKind::Bt2 => BT2_HASH_SIZE as usize,
            MatchFinderKind::Bt4 => {
                let mut hs = history_size - 1;
                hs |= hs >> 1;
                hs |= hs >> 2;
                hs |= hs >> 4;
                hs |= hs >> 8;
                hs >>= 1;
                hs |= 0xFFFF;
                if hs > (1 << 24) {
                    hs >>= 1;
                }
                self.hash_mask = hs;
                hs as usize + 1 + self.fix_hash_size
            }
        };
        if self.hash.len() != hash_size {
            self.hash = vec![EMPTY_HASH_VALUE; hash_size];
            self.hash_dirty = false;
        }
    }

    /// Reset the tables and fill the window. Positions start at 1 so that
    /// zero can mean "empty".
    pub fn init(&mut self) {
        self.window.init();
        // A freshly allocated table is already empty; skip touching its pages.
        if self.hash_dirty {
            self.hash.fill(EMPTY_HASH_VALUE);
        }
        self.hash_dirty = true;
        self.cyclic_buffer_pos = 0;
        self.window.reduce_offsets(-1);
    }

    /// The window the finder searches.
    pub fn window(&self) -> &InWindow {
        &self.window
    }

    /// Mutable access to the window.
    pub fn window_mut(&mut self) -> &mut InWindow {
        &mut self.window
    }

    /// Byte at `pos + index`.
    #[inline]
    pub fn index_byte(&self, index: i32) -> u8 {
        self.window.index_byte(index)
    }

    /// See [`InWindow::match_len`].
    #[inline]
    pub fn match_len(&self, index: i32, distance: u32, limit: u32) -> u32 {
        self.window.match_len(index, distance, limit)
    }

    /// See [`InWindow::available_bytes`].
    #[inline]
    pub fn available_bytes(&self) -> u32 {
        self.window.available_bytes()
    }

    fn move_pos(&mut self) {
        self.cyclic_buffer_pos += 1;
        if self.cyclic_buffer_pos >= self.cyclic_buffer_size {
            self.cyclic_buffer_pos = 0;
        }
        self.window.move_pos();
        if self.window.pos() == MAX_VAL_FOR_NORMALIZE {
            self.normalize();
        }
    }

    fn hash_values(&self, cur: usize) -> (u32, u32, u32) {
        let buf = self.window.buffer();
        match self.kind {
            MatchFinderKind::Bt4 => {
                let mut temp = CRC_TABLE[buf[cur] as usize] ^ u32::from(buf[cur + 1]);
                let hash2 = temp & (HASH2_SIZE - 1);
                temp ^= u32::from(buf[cur + 2]) << 8;
                let hash3 = temp & (HASH3_SIZE - 1);
                let hash = (temp ^ (CRC_TABLE[buf[cur + 3] as usize] << 5)) & self.hash_mask;
                (hash2, hash3, hash)
            }
            MatchFinderKind::Bt2 => (0, 0, u32::from(buf[cur]) ^ (u32::from(buf[cur + 1]) << 8)),
        }
    }

    /// Find matches at the current position and advance by one.
    ///
    /// Pairs `(length, distance)` are appended to `distances` with strictly
    /// increasing lengths; `distance` is the match offset minus one. Returns
    /// the number of `u32`s written.
    pub fn get_matches(&mut self, distances: &mut [u32]) -> usize {
        let pos = self.window.pos();
        let stream_pos = self.window.stream_pos();
        let len_limit = if pos + self.match_max_len <= stream_pos {
            self.match_max_len
        } else {
            let limit = stream_pos - pos;
            if limit < self.min_match_check {
                self.move_pos();
                return 0;
            }
            limit
        };

        let mut offset = 0;
        let match_min_pos = pos.saturating_sub(self.cyclic_buffer_size);
        let cur = self.window.cur_index();
        let mut max_len = START_MAX_LEN;
        let (hash2, hash3, hash_value) = self.hash_values(cur);
        let fix = self.fix_hash_size;

        let mut cur_match = self.hash[fix + hash_value as usize];
        if self.kind == MatchFinderKind::Bt4 {
            let buf = self.window.buffer();
            let mut cur_match2 = self.hash[hash2 as usize];
            let cur_match3 = self.hash[HASH3_OFFSET + hash3 as usize];
            self.hash[hash2 as usize] = pos;
            self.hash[HASH3_OFFSET + hash3 as usize] = pos;
            if cur_match2 > match_min_pos
                && buf[self.window.buffer_index(cur_match2)] == buf[cur]
            {
                max_len = 2;
                distances[offset] = 2;
                distances[offset + 1] = pos - cur_match2 - 1;
                offset += 2;
            }
            if cur_match3 > match_min_pos
                && buf[self.window.buffer_index(cur_match3)] == buf[cur]
            {
                if cur_match3 == cur_match2 {
                    offset -= 2;
                }
                max_len = 3;
                distances[offset] = 3;
                distances[offset + 1] = pos - cur_match3 - 1;
                offset += 2;
                cur_match2 = cur_match3;
            }
            if offset != 0 && cur_match2 == cur_match {
                offset -= 2;
                max_len = START_MAX_LEN;
            }
        }

        self.hash[fix + hash_value as usize] = pos;

        let mut ptr0 = ((self.cyclic_buffer_pos << 1) + 1) as usize;
        let mut ptr1 = (self.cyclic_buffer_pos << 1) as usize;
        let mut len0 = self.num_hash_direct_bytes;
        let mut len1 = self.num_hash_direct_bytes;

        if self.num_hash_direct_bytes != 0 && cur_match > match_min_pos {
            let buf = self.window.buffer();
            let direct = self.num_hash_direct_bytes as usize;
            if buf[self.window.buffer_index(cur_match) + direct] != buf[cur + direct] {
                max_len = self.num_hash_direct_bytes;
                distances[offset] = max_len;
                distances[offset + 1] = pos - cur_match - 1;
                offset += 2;
            }
        }

        let mut count = self.cut_value;
        loop {
            if cur_match <= match_min_pos || count == 0 {
                self.son[ptr0] = EMPTY_HASH_VALUE;
                self.son[ptr1] = EMPTY_HASH_VALUE;
                break;
            }
            count -= 1;
            let delta = pos - cur_match;
            let cyclic_pos = (if delta <= self.cyclic_buffer_pos {
                self.cyclic_buffer_pos - delta
            } else {
                self.cyclic_buffer_pos + self.cyclic_buffer_size - delta
            } << 1) as usize;

            let buf = self.window.buffer();
            let pby1 = self.window.buffer_index(cur_match);
            let mut len = len0.min(len1);
            if buf[pby1 + len as usize] == buf[cur + len as usize] {
                len += 1;
                while len != len_limit && buf[pby1 + len as usize] == buf[cur + len as usize] {
                    len += 1;
                }
                if max_len < len {
                    max_len = len;
                    distances[offset] = len;
                    distances[offset + 1] = delta - 1;
                    offset += 2;
                    if len == len_limit {
                        self.son[ptr1] = self.son[cyclic_pos];
                        self.son[ptr0] = self.son[cyclic_pos + 1];
                        break;
                    }
                }
            }
            if buf[pby1 + len as usize] < buf[cur + len as usize] {
                self.son[ptr1] = cur_match;
                ptr1 = cyclic_pos + 1;
                cur_match = self.son[ptr1];
                len1 = len;
            } else {
                self.son[ptr0] = cur_match;
                ptr0 = cyclic_pos;
                cur_match = self.son[ptr0];
                len0 = len;
            }
        }

        self.move_pos();
        offset
    }

    /// Insert `num` positions without reporting matches.
    pub fn skip(&mut self, num: u32) {
        for _ in 0..num {
            let pos = self.window.pos();
            let stream_pos = self.window.stream_pos();
            let len_limit = if pos + self.match_max_len <= stream_pos {
                self.match_max_len
            } else {
                let limit = stream_pos - pos;
                if limit < self.min_match_check {
                    self.move_pos();
                    continue;
                }
                limit
            };

            let match_min_pos = pos.saturating_sub(self.cyclic_buffer_size);
            let cur = self.window.cur_index();
            let (hash2, hash3, hash_value) = self.hash_values(cur);
            if self.kind == MatchFinderKind::Bt4 {
                self.hash[hash2 as usize] = pos;
                self.hash[HASH3_OFFSET + hash3 as usize] = pos;
            }
            let fix = self.fix_hash_size;
            let mut cur_match = self.hash[fix + hash_value as usize];
            self.hash[fix + hash_value as usize] = pos;

            let mut ptr0 = ((self.cyclic_buffer_pos << 1) + 1) as usize;
            let mut ptr1 = (self.cyclic_buffer_pos << 1) as usize;
            let mut len0 = self.num_hash_direct_bytes;
            let mut len1 = self.num_hash_direct_bytes;
            let mut count = self.cut_value;
            loop {
                if cur_match <= match_min_pos || count == 0 {
                    self.son[ptr0] = EMPTY_HASH_VALUE;
                    self.son[ptr1] = EMPTY_HASH_VALUE;
                    break;
                }
                count -= 1;
                let delta = pos - cur_match;
                let cyclic_pos = (if delta <= self.cyclic_buffer_pos {
                    self.cyclic_buffer_pos - delta
                } else {
                    self.cyclic_buffer_pos + self.cyclic_buffer_size - delta
                } << 1) as usize;

                let buf = self.window.buffer();
                let pby1 = self.window.buffer_index(cur_match);
                let mut len = len0.min(len1);
                if buf[pby1 + len as usize] == buf[cur + len as usize] {
                    len += 1;
                    while len != len_limit && buf[pby1 + len as usize] == buf[cur + len as usize] {
                        len += 1;
                    }
                    if len == len_limit {
                        self.son[ptr1] = self.son[cyclic_pos];
                        self.son[ptr0] = self.son[cyclic_pos + 1];
                        break;
                    }
                }
                if buf[pby1 + len as usize] < buf[cur + len as usize] {
                    self.son[ptr1] = cur_match;
                    ptr1 = cyclic_pos + 1;
                    cur_match = self.son[ptr1];
                    len1 = len;
                } else {
                    self.son[ptr0] = cur_match;
                    ptr0 = cyclic_pos;
                    cur_match = self.son[ptr0];
                    len0 = len;
                }
            }
            self.move_pos();
        }
    }

    /// Rebase every stored position so `pos` drops back near the cyclic size.
    fn normalize(&mut self) {
        let sub_value = self.window.pos() - self.cyclic_buffer_size;
        for item in self.son.iter_mut().chain(self.hash.iter_mut()) {
            *item = if *item <= sub_value {
                EMPTY_HASH_VALUE
            } else {
                *item - sub_value
            };
        }
        self.window.reduce_offsets(sub_value as i32);
        log::trace!("match finder normalized by {sub_value}");
    }

    /// Release the window and tables.
    pub fn release(&mut self) {
        self.window.release();
        self.son = Vec::new();
        self.hash = Vec::new();
        self.cyclic_buffer_size = 0;
    }
}
