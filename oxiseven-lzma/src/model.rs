//! LZMA probability models.
//!
//! Every adaptive probability the codec uses lives in one of the flat tables of
//! [`LzmaModel`], addressed by a [`ProbTable`] tag and an index. Keeping the
//! tables flat lets the checkpoint journal name any cell with a
//! `(table, index)` pair.
//!
//! Bit trees are stored inside these tables with their root at a known index;
//! the node for the partial symbol `m` (starting at 1) sits at `root + m - 1`.

use crate::range_coder::PROB_INIT;

/// Default literal context bits.
pub const LC_DEFAULT: u32 = 3;

/// Default literal position bits.
pub const LP_DEFAULT: u32 = 0;

/// Default position bits.
pub const PB_DEFAULT: u32 = 2;

/// Maximum number of position state bits.
pub const POS_STATES_BITS_MAX: u32 = 4;

/// Maximum number of position states.
pub const POS_STATES_MAX: usize = 1 << POS_STATES_BITS_MAX;

/// Number of states in the LZMA state machine.
pub const NUM_STATES: usize = 12;

/// Number of most-recently-used distances.
pub const NUM_REPS: usize = 4;

/// Number of bits for low length coding.
pub const LEN_LOW_BITS: u32 = 3;
/// Number of bits for mid length coding.
pub const LEN_MID_BITS: u32 = 3;
/// Number of bits for high length coding.
pub const LEN_HIGH_BITS: u32 = 8;

/// Number of low length symbols.
pub const LEN_LOW_SYMBOLS: usize = 1 << LEN_LOW_BITS;
/// Number of mid length symbols.
pub const LEN_MID_SYMBOLS: usize = 1 << LEN_MID_BITS;
/// Number of high length symbols.
pub const LEN_HIGH_SYMBOLS: usize = 1 << LEN_HIGH_BITS;
/// Total number of length symbols.
pub const LEN_SYMBOLS: usize = LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + LEN_HIGH_SYMBOLS;

/// Minimum match length.
pub const MATCH_LEN_MIN: usize = 2;

/// Maximum match length.
pub const MATCH_LEN_MAX: usize = MATCH_LEN_MIN + LEN_SYMBOLS - 1;

/// Number of bits in a distance slot.
pub const POS_SLOT_BITS: u32 = 6;

/// Number of distance slots.
pub const DIST_SLOTS: usize = 1 << POS_SLOT_BITS;

/// Number of length-to-distance states.
pub const LEN_TO_POS_STATES: usize = 4;

/// Number of alignment bits for distance encoding.
pub const DIST_ALIGN_BITS: u32 = 4;
/// Size of alignment table.
pub const DIST_ALIGN_SIZE: usize = 1 << DIST_ALIGN_BITS;
/// Mask of the alignment bits.
pub const DIST_ALIGN_MASK: u32 = (DIST_ALIGN_SIZE - 1) as u32;

/// First slot whose distance carries extra bits.
pub const START_POS_MODEL_INDEX: usize = 4;

/// First slot whose extra bits are partially direct.
pub const END_POS_MODEL_INDEX: usize = 14;

/// Number of distances fully covered by modeled bits.
pub const FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX >> 1);

/// Smallest dictionary the codec accepts.
pub const DICT_SIZE_MIN: u32 = 1 << 12;

/// Largest dictionary the encoder accepts.
pub const DICT_SIZE_MAX: u32 = 1 << 29;

/// Literal probabilities per literal context.
pub const LITERAL_CODER_SIZE: usize = 0x300;

/// Offset of the length-choice bit inside a length table.
pub const LEN_CHOICE: usize = 0;
/// Offset of the second length-choice bit inside a length table.
pub const LEN_CHOICE_2: usize = 1;
/// Offset of the per-position-state low trees inside a length table.
pub const LEN_LOW: usize = 2;
/// Offset of the per-position-state mid trees inside a length table.
pub const LEN_MID: usize = LEN_LOW + (POS_STATES_MAX << LEN_LOW_BITS);
/// Offset of the shared high tree inside a length table.
pub const LEN_HIGH: usize = LEN_MID + (POS_STATES_MAX << LEN_MID_BITS);
/// Total number of probabilities in a length table.
pub const LEN_TABLE_SIZE: usize = LEN_HIGH + LEN_HIGH_SYMBOLS;

/// Number of probabilities used for the reverse-coded bits of slots 4..14.
///
/// The extra cell keeps the tree root of slot 4 at a non-negative index.
pub const POS_SPECIAL_SIZE: usize = FULL_DISTANCES - END_POS_MODEL_INDEX + 1;

/// LZMA state machine state.
///
/// States 0..7 follow a literal; 7..12 follow a match, rep-match or short rep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State(u8);

impl State {
    /// Initial state.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get state value.
    pub fn value(self) -> usize {
        self.0 as usize
    }

    /// Check if the previous symbol was a literal.
    pub fn is_literal(self) -> bool {
        self.0 < 7
    }

    /// Update state after literal.
    pub fn update_literal(&mut self) {
        self.0 = match self.0 {
            0..=3 => 0,
            4..=9 => self.0 - 3,
            _ => self.0 - 6,
        };
    }

    /// Update state after match.
    pub fn update_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }

    /// Update state after short rep.
    pub fn update_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }

    /// Update state after long rep.
    pub fn update_long_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }

    /// Copy with the literal transition applied.
    pub fn after_literal(mut self) -> Self {
        self.update_literal();
        self
    }

    /// Copy with the match transition applied.
    pub fn after_match(mut self) -> Self {
        self.update_match();
        self
    }

    /// Copy with the long rep transition applied.
    pub fn after_long_rep(mut self) -> Self {
        self.update_long_rep();
        self
    }

    /// Copy with the short rep transition applied.
    pub fn after_short_rep(mut self) -> Self {
        self.update_short_rep();
        self
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// LZMA properties (lc, lp, pb).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
}

impl LzmaProperties {
    /// Create new properties.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Self {
        Self { lc, lp, pb }
    }

    /// Parse from property byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte >= 9 * 5 * 5 {
            return None;
        }
        let byte = u32::from(byte);
        let lc = byte % 9;
        let lp = (byte / 9) % 5;
        let pb = byte / 45;

        if lc > 8 || lp > 4 || pb > 4 {
            return None;
        }

        Some(Self { lc, lp, pb })
    }

    /// Encode to property byte.
    pub fn to_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Get number of literal states.
    pub fn num_lit_states(&self) -> usize {
        1 << (self.lc + self.lp)
    }

    /// Get number of position states.
    pub fn num_pos_states(&self) -> usize {
        1 << self.pb
    }

    /// Mask selecting the position state from a stream position.
    pub fn pos_mask(&self) -> u32 {
        (1 << self.pb) - 1
    }
}

impl Default for LzmaProperties {
    fn default() -> Self {
        Self {
            lc: LC_DEFAULT,
            lp: LP_DEFAULT,
            pb: PB_DEFAULT,
        }
    }
}

/// Identifies one probability table of an [`LzmaModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbTable {
    /// Literal vs. match decision, indexed by `(state << 4) + pos_state`.
    IsMatch,
    /// Match vs. rep-match decision, indexed by state.
    IsRep,
    /// rep0 vs. rep1..3 decision.
    IsRepG0,
    /// rep1 vs. rep2..3 decision.
    IsRepG1,
    /// rep2 vs. rep3 decision.
    IsRepG2,
    /// Short rep vs. long rep0, indexed like `IsMatch`.
    IsRep0Long,
    /// Literal coders, `0x300` cells per literal context.
    Literal,
    /// Distance slot trees, one per length-to-distance state.
    PosSlot,
    /// Reverse trees for the extra bits of slots 4..14.
    PosSpecial,
    /// Reverse tree for the four alignment bits.
    Align,
    /// Match length coder.
    MatchLen,
    /// Rep-match length coder.
    RepLen,
}

/// Complete LZMA model containing all probability tables.
#[derive(Debug, Clone)]
pub struct LzmaModel {
    /// LZMA properties.
    pub props: LzmaProperties,
    is_match: Vec<u16>,
    is_rep: Vec<u16>,
    is_rep_g0: Vec<u16>,
    is_rep_g1: Vec<u16>,
    is_rep_g2: Vec<u16>,
    is_rep0_long: Vec<u16>,
    literal: Vec<u16>,
    pos_slot: Vec<u16>,
    pos_special: Vec<u16>,
    align: Vec<u16>,
    match_len: Vec<u16>,
    rep_len: Vec<u16>,
}

impl LzmaModel {
    /// Create a new LZMA model with the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            props,
            is_match: vec![PROB_INIT; NUM_STATES << POS_STATES_BITS_MAX],
            is_rep: vec![PROB_INIT; NUM_STATES],
            is_rep_g0: vec![PROB_INIT; NUM_STATES],
            is_rep_g1: vec![PROB_INIT; NUM_STATES],
            is_rep_g2: vec![PROB_INIT; NUM_STATES],
            is_rep0_long: vec![PROB_INIT; NUM_STATES << POS_STATES_BITS_MAX],
            literal: vec![PROB_INIT; LITERAL_CODER_SIZE * props.num_lit_states()],
            pos_slot: vec![PROB_INIT; LEN_TO_POS_STATES * DIST_SLOTS],
            pos_special: vec![PROB_INIT; POS_SPECIAL_SIZE],
            align: vec![PROB_INIT; DIST_ALIGN_SIZE],
            match_len: vec![PROB_INIT; LEN_TABLE_SIZE],
            rep_len: vec![PROB_INIT; LEN_TABLE_SIZE],
        }
    }

    /// Borrow one table.
    pub fn table(&self, table: ProbTable) -> &[u16] {
        match table {
            ProbTable::IsMatch => &self.is_match,
            ProbTable::IsRep => &self.is_rep,
            ProbTable::IsRepG0 => &self.is_rep_g0,
            ProbTable::IsRepG1 => &self.is_rep_g1,
            ProbTable::IsRepG2 => &self.is_rep_g2,
            ProbTable::IsRep0Long => &self.is_rep0_long,
            ProbTable::Literal => &self.literal,
            ProbTable::PosSlot => &self.pos_slot,
            ProbTable::PosSpecial => &self.pos_special,
            ProbTable::Align => &self.align,
            ProbTable::MatchLen => &self.match_len,
            ProbTable::RepLen => &self.rep_len,
        }
    }

    /// Mutably borrow one table.
    pub fn table_mut(&mut self, table: ProbTable) -> &mut [u16] {
        match table {
            ProbTable::IsMatch => &mut self.is_match,
            ProbTable::IsRep => &mut self.is_rep,
            ProbTable::IsRepG0 => &mut self.is_rep_g0,
            ProbTable::IsRepG1 => &mut self.is_rep_g1,
            ProbTable::IsRepG2 => &mut self.is_rep_g2,
            ProbTable::IsRep0Long => &mut self.is_rep0_long,
            ProbTable::Literal => &mut self.literal,
            ProbTable::PosSlot => &mut self.pos_slot,
            ProbTable::PosSpecial => &mut self.pos_special,
            ProbTable::Align => &mut self.align,
            ProbTable::MatchLen => &mut self.match_len,
            ProbTable::RepLen => &mut self.rep_len,
        }
    }

    /// Read one probability.
    #[inline]
    pub fn prob(&self, table: ProbTable, index: usize) -> u16 {
        self.table(table)[index]
    }

    /// Reset all probabilities to initial values.
    pub fn reset(&mut self) {
        for table in [
            &mut self.is_match,
            &mut self.is_rep,
            &mut self.is_rep_g0,
            &mut self.is_rep_g1,
            &mut self.is_rep_g2,
            &mut self.is_rep0_long,
            &mut self.literal,
            &mut self.pos_slot,
            &mut self.pos_special,
            &mut self.align,
            &mut self.match_len,
            &mut self.rep_len,
        ] {
            table.fill(PROB_INIT);
        }
    }
}

/// Index of the `(state, pos_state)` cell in `IsMatch` / `IsRep0Long`.
#[inline]
pub fn state_index(state: State, pos_state: u32) -> usize {
    (state.value() << POS_STATES_BITS_MAX) + pos_state as usize
}
