//! Literal, length and distance sub-coders.
//!
//! Each coder knows where its bit trees sit inside the [`LzmaModel`] tables
//! and how to encode, decode and price a symbol against them. The encoder
//! side also keeps cached price tables that it refreshes on a schedule; the
//! optimal parser reads those caches instead of walking trees.

use crate::model::{
    DIST_ALIGN_BITS, DIST_ALIGN_MASK, DIST_ALIGN_SIZE, END_POS_MODEL_INDEX, FULL_DISTANCES,
    LEN_CHOICE, LEN_CHOICE_2, LEN_HIGH, LEN_HIGH_BITS, LEN_LOW, LEN_LOW_BITS, LEN_LOW_SYMBOLS,
    LEN_MID, LEN_MID_BITS, LEN_MID_SYMBOLS, LEN_SYMBOLS, LEN_TO_POS_STATES, LITERAL_CODER_SIZE,
    LzmaModel, LzmaProperties, MATCH_LEN_MIN, POS_SLOT_BITS, POS_STATES_MAX, ProbTable,
    START_POS_MODEL_INDEX, State, state_index,
};
use crate::price::{
    footer_bits, len_to_pos_state, pos_slot, pos_slot_large, price0, price1, price_bit,
    reverse_tree_price, slot_base, slot_direct_price, tree_price,
};
use crate::range_coder::{BitDecode, RangeEncoder, Step};

/// Selects and drives the literal sub-coder for a position.
#[derive(Debug, Clone, Copy)]
pub struct LitCoder {
    lc: u32,
    pos_mask: u64,
}

impl LitCoder {
    /// Create a literal coder for the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            lc: props.lc,
            pos_mask: (1u64 << props.lp) - 1,
        }
    }

    /// First cell of the sub-coder for a literal at `pos` following `prev_byte`.
    #[inline]
    pub fn offset(&self, pos: u64, prev_byte: u8) -> usize {
        let ctx = (((pos & self.pos_mask) as usize) << self.lc)
            + (usize::from(prev_byte) >> (8 - self.lc));
        ctx * LITERAL_CODER_SIZE
    }

    /// Encode a plain literal.
    pub fn encode(&self, rc: &mut RangeEncoder, model: &mut LzmaModel, base: usize, symbol: u8) {
        let probs = model.table_mut(ProbTable::Literal);
        let mut context = 1usize;
        for i in (0..8).rev() {
            let bit = u32::from(symbol >> i) & 1;
            rc.encode_bit(&mut probs[base + context], bit);
            context = (context << 1) | bit as usize;
        }
    }

    /// Encode a literal that follows a match, using the byte at rep0 as
    /// additional context until the first mismatching bit.
    pub fn encode_matched(
        &self,
        rc: &mut RangeEncoder,
        model: &mut LzmaModel,
        base: usize,
        match_byte: u8,
        symbol: u8,
    ) {
        let probs = model.table_mut(ProbTable::Literal);
        let mut context = 1usize;
        let mut same = true;
        for i in (0..8).rev() {
            let bit = u32::from(symbol >> i) & 1;
            let mut index = context;
            if same {
                let match_bit = usize::from(match_byte >> i) & 1;
                index += (1 + match_bit) << 8;
                same = match_bit == bit as usize;
            }
            rc.encode_bit(&mut probs[base + index], bit);
            context = (context << 1) | bit as usize;
        }
    }

    /// Price of coding `symbol`, matched against `match_byte` when
    /// `match_mode` is set.
    pub fn price(
        &self,
        model: &LzmaModel,
        base: usize,
        match_mode: bool,
        match_byte: u8,
        symbol: u8,
    ) -> u32 {
        let probs = &model.table(ProbTable::Literal)[base..base + LITERAL_CODER_SIZE];
        let mut price = 0;
        let mut context = 1usize;
        let mut i = 8;
        if match_mode {
            while i > 0 {
                i -= 1;
                let match_bit = usize::from(match_byte >> i) & 1;
                let bit = u32::from(symbol >> i) & 1;
                price += price_bit(probs[((1 + match_bit) << 8) + context], bit);
                context = (context << 1) | bit as usize;
                if match_bit != bit as usize {
                    break;
                }
            }
        }
        while i > 0 {
            i -= 1;
            let bit = u32::from(symbol >> i) & 1;
            price += price_bit(probs[context], bit);
            context = (context << 1) | bit as usize;
        }
        price
    }

    pub(crate) fn decode<D: BitDecode>(&self, d: &mut D, base: usize) -> Step<u8> {
        let mut symbol = 1usize;
        while symbol < 0x100 {
            let bit = d.decode_bit(ProbTable::Literal, base + symbol)?;
            symbol = (symbol << 1) | bit as usize;
        }
        Ok(symbol as u8)
    }

    pub(crate) fn decode_matched<D: BitDecode>(
        &self,
        d: &mut D,
        base: usize,
        match_byte: u8,
    ) -> Step<u8> {
        let mut symbol = 1usize;
        let mut match_byte = usize::from(match_byte);
        while symbol < 0x100 {
            let match_bit = (match_byte >> 7) & 1;
            match_byte <<= 1;
            let bit = d.decode_bit(ProbTable::Literal, base + ((1 + match_bit) << 8) + symbol)?;
            symbol = (symbol << 1) | bit as usize;
            if match_bit != bit as usize {
                while symbol < 0x100 {
                    let bit = d.decode_bit(ProbTable::Literal, base + symbol)?;
                    symbol = (symbol << 1) | bit as usize;
                }
                break;
            }
        }
        Ok(symbol as u8)
    }
}

/// Length coder with cached per-position-state prices.
///
/// One instance serves the match lengths, another the rep lengths. `symbol`
/// is always `len - MATCH_LEN_MIN`.
#[derive(Debug, Clone)]
pub struct LenCoder {
    table: ProbTable,
    prices: Vec<u32>,
    counters: [u32; POS_STATES_MAX],
    table_size: u32,
}

impl LenCoder {
    /// Create a coder over `table` ([`ProbTable::MatchLen`] or
    /// [`ProbTable::RepLen`]).
    pub fn new(table: ProbTable) -> Self {
        Self {
            table,
            prices: vec![0; LEN_SYMBOLS * POS_STATES_MAX],
            counters: [0; POS_STATES_MAX],
            table_size: 0,
        }
    }

    /// Number of symbols kept in the price cache.
    pub fn set_table_size(&mut self, table_size: u32) {
        self.table_size = table_size;
    }

    /// Encode `symbol` for `pos_state` and refresh that position state's
    /// prices once enough symbols have gone by.
    pub fn encode(
        &mut self,
        rc: &mut RangeEncoder,
        model: &mut LzmaModel,
        symbol: u32,
        pos_state: u32,
    ) {
        let ps = pos_state as usize;
        let probs = model.table_mut(self.table);
        if (symbol as usize) < LEN_LOW_SYMBOLS {
            rc.encode_bit(&mut probs[LEN_CHOICE], 0);
            rc.encode_tree(probs, LEN_LOW + (ps << LEN_LOW_BITS) + 1, LEN_LOW_BITS, symbol);
        } else {
            rc.encode_bit(&mut probs[LEN_CHOICE], 1);
            let symbol = symbol - LEN_LOW_SYMBOLS as u32;
            if (symbol as usize) < LEN_MID_SYMBOLS {
                rc.encode_bit(&mut probs[LEN_CHOICE_2], 0);
                rc.encode_tree(probs, LEN_MID + (ps << LEN_MID_BITS) + 1, LEN_MID_BITS, symbol);
            } else {
                rc.encode_bit(&mut probs[LEN_CHOICE_2], 1);
                rc.encode_tree(
                    probs,
                    LEN_HIGH + 1,
                    LEN_HIGH_BITS,
                    symbol - LEN_MID_SYMBOLS as u32,
                );
            }
        }

        self.counters[ps] = self.counters[ps].saturating_sub(1);
        if self.counters[ps] == 0 {
            self.update_table(model, pos_state);
        }
    }

    /// Cached price of `symbol` at `pos_state`.
    #[inline]
    pub fn price(&self, symbol: u32, pos_state: u32) -> u32 {
        self.prices[pos_state as usize * LEN_SYMBOLS + symbol as usize]
    }

    /// Price the first `num_symbols` symbols for `pos_state` into `prices`.
    fn set_prices(model: &LzmaModel, table: ProbTable, pos_state: usize, prices: &mut [u32]) {
        let probs = model.table(table);
        let a0 = price0(probs[LEN_CHOICE]);
        let a1 = price1(probs[LEN_CHOICE]);
        let b0 = a1 + price0(probs[LEN_CHOICE_2]);
        let b1 = a1 + price1(probs[LEN_CHOICE_2]);
        let low_root = LEN_LOW + (pos_state << LEN_LOW_BITS) + 1;
        let mid_root = LEN_MID + (pos_state << LEN_MID_BITS) + 1;

        for (i, price) in prices.iter_mut().enumerate() {
            let i = i as u32;
            *price = if (i as usize) < LEN_LOW_SYMBOLS {
                a0 + tree_price(probs, low_root, LEN_LOW_BITS, i)
            } else if (i as usize) < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
                b0 + tree_price(probs, mid_root, LEN_MID_BITS, i - LEN_LOW_SYMBOLS as u32)
            } else {
                b1 + tree_price(
                    probs,
                    LEN_HIGH + 1,
                    LEN_HIGH_BITS,
                    i - (LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32,
                )
            };
        }
    }

    fn update_table(&mut self, model: &LzmaModel, pos_state: u32) {
        let start = pos_state as usize * LEN_SYMBOLS;
        let end = start + self.table_size as usize;
        Self::set_prices(model, self.table, pos_state as usize, &mut self.prices[start..end]);
        self.counters[pos_state as usize] = self.table_size;
    }

    /// Refresh the prices of every position state below `num_pos_states`.
    pub fn update_tables(&mut self, model: &LzmaModel, num_pos_states: usize) {
        for pos_state in 0..num_pos_states as u32 {
            self.update_table(model, pos_state);
        }
    }

    /// Decode a length symbol from `table` at `pos_state`.
    pub(crate) fn decode<D: BitDecode>(d: &mut D, table: ProbTable, pos_state: u32) -> Step<u32> {
        let ps = pos_state as usize;
        if d.decode_bit(table, LEN_CHOICE)? == 0 {
            return d.decode_tree(table, LEN_LOW + (ps << LEN_LOW_BITS) + 1, LEN_LOW_BITS);
        }
        if d.decode_bit(table, LEN_CHOICE_2)? == 0 {
            let symbol = d.decode_tree(table, LEN_MID + (ps << LEN_MID_BITS) + 1, LEN_MID_BITS)?;
            return Ok(LEN_LOW_SYMBOLS as u32 + symbol);
        }
        let symbol = d.decode_tree(table, LEN_HIGH + 1, LEN_HIGH_BITS)?;
        Ok((LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32 + symbol)
    }
}

/// Root of the slot tree for a length-to-distance state.
#[inline]
fn slot_root(len_to_pos: usize) -> usize {
    (len_to_pos << POS_SLOT_BITS) + 1
}

/// Root of the reverse tree carrying the extra bits of slots 4..14.
#[inline]
fn special_root(slot: u32) -> usize {
    (slot_base(slot) - slot) as usize
}

/// Distance coder with cached slot, distance and alignment prices.
///
/// `dist` is always the match offset minus one, as stored in the rep list.
#[derive(Debug, Clone)]
pub struct DistCoder {
    dist_table_size: u32,
    slot_prices: Vec<u32>,
    distances_prices: Vec<u32>,
    align_prices: [u32; DIST_ALIGN_SIZE],
    match_price_count: u32,
    align_price_count: u32,
}

impl DistCoder {
    /// Create a coder whose slot prices cover a dictionary of `dict_size`.
    pub fn new(dict_size: u32) -> Self {
        let mut dict_log = 0;
        while dict_log < 32 && (1u64 << dict_log) < u64::from(dict_size) {
            dict_log += 1;
        }
        Self {
            dist_table_size: dict_log * 2,
            slot_prices: vec![0; LEN_TO_POS_STATES << POS_SLOT_BITS],
            distances_prices: vec![0; LEN_TO_POS_STATES * FULL_DISTANCES],
            align_prices: [0; DIST_ALIGN_SIZE],
            match_price_count: 0,
            align_price_count: 0,
        }
    }

    /// Encode `dist` for a match of length `len`.
    pub fn encode(&mut self, rc: &mut RangeEncoder, model: &mut LzmaModel, dist: u32, len: usize) {
        let slot = pos_slot(dist);
        let lps = len_to_pos_state(len);
        rc.encode_tree(model.table_mut(ProbTable::PosSlot), slot_root(lps), POS_SLOT_BITS, slot);

        if slot as usize >= START_POS_MODEL_INDEX {
            let footer = footer_bits(slot);
            let reduced = dist - slot_base(slot);
            if (slot as usize) < END_POS_MODEL_INDEX {
                rc.encode_reverse_tree(
                    model.table_mut(ProbTable::PosSpecial),
                    special_root(slot),
                    footer,
                    reduced,
                );
            } else {
                rc.encode_direct_bits(reduced >> DIST_ALIGN_BITS, footer - DIST_ALIGN_BITS);
                rc.encode_reverse_tree(
                    model.table_mut(ProbTable::Align),
                    1,
                    DIST_ALIGN_BITS,
                    reduced & DIST_ALIGN_MASK,
                );
                self.align_price_count += 1;
            }
        }
        self.match_price_count += 1;
    }

    /// Encode the end-of-stream marker: slot 63 with all-ones extra bits.
    pub fn encode_end_marker(&mut self, rc: &mut RangeEncoder, model: &mut LzmaModel) {
        let slot = (1u32 << POS_SLOT_BITS) - 1;
        rc.encode_tree(model.table_mut(ProbTable::PosSlot), slot_root(0), POS_SLOT_BITS, slot);
        let footer = footer_bits(slot);
        let reduced = (1u32 << footer) - 1;
        rc.encode_direct_bits(reduced >> DIST_ALIGN_BITS, footer - DIST_ALIGN_BITS);
        rc.encode_reverse_tree(
            model.table_mut(ProbTable::Align),
            1,
            DIST_ALIGN_BITS,
            reduced & DIST_ALIGN_MASK,
        );
    }

    /// Cached price of `dist` for a match of length `len`, excluding the
    /// length itself.
    #[inline]
    pub fn price(&self, dist: u32, len: usize) -> u32 {
        let lps = len_to_pos_state(len);
        if (dist as usize) < FULL_DISTANCES {
            self.distances_prices[lps * FULL_DISTANCES + dist as usize]
        } else {
            self.slot_prices[(lps << POS_SLOT_BITS) + pos_slot_large(dist) as usize]
                + self.align_prices[(dist & DIST_ALIGN_MASK) as usize]
        }
    }

    /// Recompute slot and short-distance prices.
    pub fn fill_distances_prices(&mut self, model: &LzmaModel) {
        let mut temp_prices = [0u32; FULL_DISTANCES];
        let special = model.table(ProbTable::PosSpecial);
        for (dist, price) in temp_prices
            .iter_mut()
            .enumerate()
            .skip(START_POS_MODEL_INDEX)
        {
            let slot = pos_slot(dist as u32);
            *price = reverse_tree_price(
                special,
                special_root(slot),
                footer_bits(slot),
                dist as u32 - slot_base(slot),
            );
        }

        let slots = model.table(ProbTable::PosSlot);
        for lps in 0..LEN_TO_POS_STATES {
            let st = lps << POS_SLOT_BITS;
            for slot in 0..self.dist_table_size {
                let mut price = tree_price(slots, slot_root(lps), POS_SLOT_BITS, slot);
                if slot as usize >= END_POS_MODEL_INDEX {
                    price += slot_direct_price(slot);
                }
                self.slot_prices[st + slot as usize] = price;
            }

            let st2 = lps * FULL_DISTANCES;
            for dist in 0..FULL_DISTANCES {
                let slot_price = self.slot_prices[st + pos_slot(dist as u32) as usize];
                self.distances_prices[st2 + dist] = if dist < START_POS_MODEL_INDEX {
                    slot_price
                } else {
                    slot_price + temp_prices[dist]
                };
            }
        }
        self.match_price_count = 0;
    }

    /// Recompute alignment prices.
    pub fn fill_align_prices(&mut self, model: &LzmaModel) {
        let align = model.table(ProbTable::Align);
        for (i, price) in self.align_prices.iter_mut().enumerate() {
            *price = reverse_tree_price(align, 1, DIST_ALIGN_BITS, i as u32);
        }
        self.align_price_count = 0;
    }

    /// Whether enough matches were coded since the last distance refresh.
    pub fn distances_stale(&self) -> bool {
        self.match_price_count >= FULL_DISTANCES as u32
    }

    /// Whether enough aligned distances were coded since the last refresh.
    pub fn align_stale(&self) -> bool {
        self.align_price_count >= DIST_ALIGN_SIZE as u32
    }

    /// Decode a distance for a match of length `len`.
    ///
    /// Returns `u32::MAX` for the end-of-stream marker.
    pub(crate) fn decode<D: BitDecode>(d: &mut D, len: usize) -> Step<u32> {
        let lps = len_to_pos_state(len);
        let slot = d.decode_tree(ProbTable::PosSlot, slot_root(lps), POS_SLOT_BITS)?;
        if (slot as usize) < START_POS_MODEL_INDEX {
            return Ok(slot);
        }

        let footer = footer_bits(slot);
        let base = slot_base(slot);
        if (slot as usize) < END_POS_MODEL_INDEX {
            let extra = d.decode_reverse_tree(ProbTable::PosSpecial, special_root(slot), footer)?;
            return Ok(base + extra);
        }

        let direct = d.decode_direct_bits(footer - DIST_ALIGN_BITS)?;
        let align = d.decode_reverse_tree(ProbTable::Align, 1, DIST_ALIGN_BITS)?;
        Ok(base
            .wrapping_add(direct << DIST_ALIGN_BITS)
            .wrapping_add(align))
    }
}

/// Everything the encoder prices and codes symbols against.
#[derive(Debug, Clone)]
pub struct CoderSet {
    /// Probability tables.
    pub model: LzmaModel,
    /// Literal coder.
    pub lit: LitCoder,
    /// Match length coder.
    pub match_len: LenCoder,
    /// Rep-match length coder.
    pub rep_len: LenCoder,
    /// Distance coder.
    pub dist: DistCoder,
}

impl CoderSet {
    /// Fresh coders for `props`, with distance prices sized for `dict_size`
    /// and length prices covering matches up to `fast_bytes`.
    pub fn new(props: LzmaProperties, dict_size: u32, fast_bytes: u32) -> Self {
        let mut set = Self {
            model: LzmaModel::new(props),
            lit: LitCoder::new(props),
            match_len: LenCoder::new(ProbTable::MatchLen),
            rep_len: LenCoder::new(ProbTable::RepLen),
            dist: DistCoder::new(dict_size),
        };
        let table_size = fast_bytes + 1 - MATCH_LEN_MIN as u32;
        set.match_len.set_table_size(table_size);
        set.rep_len.set_table_size(table_size);
        set.refresh_prices();
        set
    }

    /// Recompute every cached price from the current probabilities.
    pub fn refresh_prices(&mut self) {
        let num_pos_states = self.model.props.num_pos_states();
        self.dist.fill_distances_prices(&self.model);
        self.dist.fill_align_prices(&self.model);
        self.match_len.update_tables(&self.model, num_pos_states);
        self.rep_len.update_tables(&self.model, num_pos_states);
    }

    /// Price of the literal-vs-match decision.
    #[inline]
    pub fn is_match_price(&self, state: State, pos_state: u32, bit: u32) -> u32 {
        price_bit(
            self.model.prob(ProbTable::IsMatch, state_index(state, pos_state)),
            bit,
        )
    }

    /// Price of the match-vs-rep decision.
    #[inline]
    pub fn is_rep_price(&self, state: State, bit: u32) -> u32 {
        price_bit(self.model.prob(ProbTable::IsRep, state.value()), bit)
    }

    /// Price of a short rep after the is-rep bit.
    pub fn rep_len1_price(&self, state: State, pos_state: u32) -> u32 {
        price0(self.model.prob(ProbTable::IsRepG0, state.value()))
            + price0(self.model.prob(ProbTable::IsRep0Long, state_index(state, pos_state)))
    }

    /// Price of selecting rep `rep_index` for a long rep, after the is-rep bit.
    pub fn pure_rep_price(&self, rep_index: usize, state: State, pos_state: u32) -> u32 {
        let s = state.value();
        let model = &self.model;
        if rep_index == 0 {
            price0(model.prob(ProbTable::IsRepG0, s))
                + price1(model.prob(ProbTable::IsRep0Long, state_index(state, pos_state)))
        } else {
            let mut price = price1(model.prob(ProbTable::IsRepG0, s));
            if rep_index == 1 {
                price += price0(model.prob(ProbTable::IsRepG1, s));
            } else {
                price += price1(model.prob(ProbTable::IsRepG1, s));
                price += price_bit(model.prob(ProbTable::IsRepG2, s), rep_index as u32 - 2);
            }
            price
        }
    }

    /// Price of a long rep of `len` bytes, after the is-rep bit.
    #[inline]
    pub fn rep_price(&self, rep_index: usize, len: u32, state: State, pos_state: u32) -> u32 {
        self.rep_len.price(len - MATCH_LEN_MIN as u32, pos_state)
            + self.pure_rep_price(rep_index, state, pos_state)
    }

    /// Price of a match's distance and length, after the is-rep bit.
    #[inline]
    pub fn pos_len_price(&self, dist: u32, len: u32, pos_state: u32) -> u32 {
        self.dist.price(dist, len as usize)
            + self.match_len.price(len - MATCH_LEN_MIN as u32, pos_state)
    }
}
