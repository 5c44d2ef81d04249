//! Bit prices and distance slot lookup.
//!
//! A price approximates `-log2(p)` of coding a bit, scaled by
//! `1 << PRICE_SHIFT_BITS`. The encoder's optimal parser adds prices up to
//! compare alternative encodings of the same input.

use crate::model::{DIST_ALIGN_BITS, LEN_TO_POS_STATES, MATCH_LEN_MIN};
use crate::range_coder::{PROB_BITS, PROB_MAX};

/// Fixed-point shift of every price.
pub const PRICE_SHIFT_BITS: u32 = 6;

/// Bits dropped from a probability before the table lookup.
const MOVE_REDUCING_BITS: u32 = 2;

const PRICE_TABLE_BITS: u32 = PROB_BITS - MOVE_REDUCING_BITS;

/// Price that no real encoding reaches.
pub const INFINITY_PRICE: u32 = 0x0FFF_FFFF;

static PROB_PRICES: [u32; 1 << PRICE_TABLE_BITS] = build_prob_prices();

const fn build_prob_prices() -> [u32; 1 << PRICE_TABLE_BITS] {
    let mut prices = [0u32; 1 << PRICE_TABLE_BITS];
    let mut i = PRICE_TABLE_BITS as i32 - 1;
    while i >= 0 {
        let shift = PRICE_TABLE_BITS - i as u32 - 1;
        let start = 1usize << shift;
        let end = 1usize << (shift + 1);
        let mut j = start;
        while j < end {
            prices[j] = ((i as u32) << PRICE_SHIFT_BITS)
                + ((((end - j) as u32) << PRICE_SHIFT_BITS) >> shift);
            j += 1;
        }
        i -= 1;
    }
    prices
}

/// Number of entries of the fast slot table.
const FAST_POS_SIZE: usize = 1 << 11;

static FAST_POS: [u8; FAST_POS_SIZE] = build_fast_pos();

const fn build_fast_pos() -> [u8; FAST_POS_SIZE] {
    let mut table = [0u8; FAST_POS_SIZE];
    table[1] = 1;
    let mut c = 2usize;
    let mut slot = 2usize;
    while slot < 22 {
        let k = 1usize << ((slot >> 1) - 1);
        let mut j = 0;
        while j < k {
            table[c] = slot as u8;
            c += 1;
            j += 1;
        }
        slot += 1;
    }
    table
}

/// Price of coding `0` against `prob`.
#[inline]
pub fn price0(prob: u16) -> u32 {
    PROB_PRICES[(prob >> MOVE_REDUCING_BITS) as usize]
}

/// Price of coding `1` against `prob`.
#[inline]
pub fn price1(prob: u16) -> u32 {
    PROB_PRICES[((PROB_MAX - prob) >> MOVE_REDUCING_BITS) as usize]
}

/// Price of coding `bit` against `prob`.
#[inline]
pub fn price_bit(prob: u16, bit: u32) -> u32 {
    if bit == 0 { price0(prob) } else { price1(prob) }
}

/// Price of a direct (unmodeled) bit run.
#[inline]
pub fn direct_bits_price(count: u32) -> u32 {
    count << PRICE_SHIFT_BITS
}

/// Price of a normal-order bit tree symbol rooted at `probs[root]`.
pub fn tree_price(probs: &[u16], root: usize, num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0;
    let mut m = 1usize;
    for i in (0..num_bits).rev() {
        let bit = (symbol >> i) & 1;
        price += price_bit(probs[root + m - 1], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Price of a reverse-order bit tree symbol rooted at `probs[root]`.
pub fn reverse_tree_price(probs: &[u16], root: usize, num_bits: u32, symbol: u32) -> u32 {
    let mut price = 0;
    let mut m = 1usize;
    let mut symbol = symbol;
    for _ in 0..num_bits {
        let bit = symbol & 1;
        symbol >>= 1;
        price += price_bit(probs[root + m - 1], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Distance slot of `dist`.
pub fn pos_slot(dist: u32) -> u32 {
    if dist < (1 << 11) {
        u32::from(FAST_POS[dist as usize])
    } else if dist < (1 << 21) {
        u32::from(FAST_POS[(dist >> 10) as usize]) + 20
    } else {
        u32::from(FAST_POS[(dist >> 20) as usize]) + 40
    }
}

/// Distance slot of `dist`, for distances at or above the full-distance range.
pub fn pos_slot_large(dist: u32) -> u32 {
    if dist < (1 << 17) {
        u32::from(FAST_POS[(dist >> 6) as usize]) + 12
    } else if dist < (1 << 27) {
        u32::from(FAST_POS[(dist >> 16) as usize]) + 32
    } else {
        u32::from(FAST_POS[(dist >> 26) as usize]) + 52
    }
}

/// Length-to-distance state used to pick a slot tree.
#[inline]
pub fn len_to_pos_state(len: usize) -> usize {
    (len - MATCH_LEN_MIN).min(LEN_TO_POS_STATES - 1)
}

/// Number of extra bits that follow `slot`.
#[inline]
pub fn footer_bits(slot: u32) -> u32 {
    (slot >> 1) - 1
}

/// Smallest distance in `slot` (slot >= 4).
#[inline]
pub fn slot_base(slot: u32) -> u32 {
    (2 | (slot & 1)) << footer_bits(slot)
}

/// Extra price of a slot's direct bits, beyond its tree price.
#[inline]
pub fn slot_direct_price(slot: u32) -> u32 {
    direct_bits_price(footer_bits(slot) - DIST_ALIGN_BITS)
}
