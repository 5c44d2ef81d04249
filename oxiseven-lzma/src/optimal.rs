//! Optimal parsing for LZMA compression.
//!
//! The parser looks ahead up to [`NUM_OPTS`] positions and runs a shortest
//! path search over them, where an edge is a literal, a short rep, a rep
//! match, a normal match, or one of the two-step combinations "literal then
//! rep0" and "match then literal then rep0". Edge weights come from the cached
//! prices of a [`CoderSet`]. Once the cheapest path to the end of the window
//! is known it is walked backwards and handed out one symbol per call.

use crate::coders::CoderSet;
use crate::match_finder::BinTree;
use crate::model::{MATCH_LEN_MAX, NUM_REPS, State};
use crate::price::INFINITY_PRICE;

/// Positions the parser looks ahead.
pub const NUM_OPTS: usize = 1 << 12;

/// `back` value of a literal.
pub const BACK_LITERAL: u32 = u32::MAX;

/// One position of the search.
#[derive(Debug, Clone, Copy, Default)]
struct Optimal {
    state: State,
    prev1_is_char: bool,
    prev2: bool,
    pos_prev2: usize,
    back_prev2: u32,
    price: u32,
    pos_prev: usize,
    back_prev: u32,
    backs: [u32; NUM_REPS],
}

impl Optimal {
    fn make_as_char(&mut self) {
        self.back_prev = BACK_LITERAL;
        self.prev1_is_char = false;
    }

    fn make_as_short_rep(&mut self) {
        self.back_prev = 0;
        self.prev1_is_char = false;
    }

    fn is_short_rep(&self) -> bool {
        self.back_prev == 0
    }
}

/// Decision returned by [`OptimalParser::get_optimum`].
///
/// `back` is [`BACK_LITERAL`] for a literal, `0..NUM_REPS` for a rep match
/// (a short rep when `len == 1`), or `NUM_REPS + dist` for a normal match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Bytes covered.
    pub len: u32,
    /// Kind and distance.
    pub back: u32,
}

impl Decision {
    fn literal() -> Self {
        Self {
            len: 1,
            back: BACK_LITERAL,
        }
    }
}

/// Price-driven parser state.
#[derive(Debug)]
pub struct OptimalParser {
    nodes: Vec<Optimal>,
    match_distances: Vec<u32>,
    reps: [u32; NUM_REPS],
    rep_lens: [u32; NUM_REPS],
    fast_bytes: u32,
    pos_mask: u32,
    longest_match_len: u32,
    longest_match_found: bool,
    num_distance_pairs: usize,
    additional_offset: u32,
    end_index: usize,
    current_index: usize,
}

impl OptimalParser {
    /// Create a parser that accepts any match of `fast_bytes` or more
    /// outright.
    pub fn new(fast_bytes: u32, pos_mask: u32) -> Self {
        Self {
            nodes: vec![Optimal::default(); NUM_OPTS],
            match_distances: vec![0; MATCH_LEN_MAX * 2 + 2],
            reps: [0; NUM_REPS],
            rep_lens: [0; NUM_REPS],
            fast_bytes,
            pos_mask,
            longest_match_len: 0,
            longest_match_found: false,
            num_distance_pairs: 0,
            additional_offset: 0,
            end_index: 0,
            current_index: 0,
        }
    }

    /// How far the match finder runs ahead of the next byte to encode.
    #[inline]
    pub fn additional_offset(&self) -> u32 {
        self.additional_offset
    }

    /// Account for `len` bytes the encoder has just coded.
    #[inline]
    pub fn consume(&mut self, len: u32) {
        self.additional_offset -= len;
    }

    /// Query the match finder at its position and return the longest length,
    /// extended past `fast_bytes` when the finder stopped there.
    pub fn read_match_distances(&mut self, mf: &mut BinTree) -> u32 {
        let mut len = 0;
        self.num_distance_pairs = mf.get_matches(&mut self.match_distances);
        if self.num_distance_pairs > 0 {
            len = self.match_distances[self.num_distance_pairs - 2];
            if len == self.fast_bytes {
                len += mf.match_len(
                    len as i32 - 1,
                    self.match_distances[self.num_distance_pairs - 1],
                    MATCH_LEN_MAX as u32 - len,
                );
            }
        }
        self.additional_offset += 1;
        len
    }

    fn move_pos(&mut self, mf: &mut BinTree, num: u32) {
        if num > 0 {
            mf.skip(num);
            self.additional_offset += num;
        }
    }

    /// Choose the next symbol to encode at `position`.
    ///
    /// `state`, `rep_distances` and `previous_byte` are the encoder's values
    /// before the symbol.
    pub fn get_optimum(
        &mut self,
        mf: &mut BinTree,
        coders: &CoderSet,
        state: State,
        rep_distances: &[u32; NUM_REPS],
        position: u64,
        previous_byte: u8,
    ) -> Decision {
        if self.end_index != self.current_index {
            let node = self.nodes[self.current_index];
            let decision = Decision {
                len: (node.pos_prev - self.current_index) as u32,
                back: node.back_prev,
            };
            self.current_index = node.pos_prev;
            return decision;
        }
        self.current_index = 0;
        self.end_index = 0;

        let len_main = if self.longest_match_found {
            self.longest_match_found = false;
            self.longest_match_len
        } else {
            self.read_match_distances(mf)
        };
        let mut num_distance_pairs = self.num_distance_pairs;

        if mf.available_bytes() + 1 < 2 {
            return Decision::literal();
        }

        let mut rep_max_index = 0;
        for i in 0..NUM_REPS {
            self.reps[i] = rep_distances[i];
            self.rep_lens[i] = mf.match_len(-1, self.reps[i], MATCH_LEN_MAX as u32);
            if self.rep_lens[i] > self.rep_lens[rep_max_index] {
                rep_max_index = i;
            }
        }
        if self.rep_lens[rep_max_index] >= self.fast_bytes {
            let len = self.rep_lens[rep_max_index];
            self.move_pos(mf, len - 1);
            return Decision {
                len,
                back: rep_max_index as u32,
            };
        }

        if len_main >= self.fast_bytes {
            let back = self.match_distances[num_distance_pairs - 1] + NUM_REPS as u32;
            self.move_pos(mf, len_main - 1);
            return Decision {
                len: len_main,
                back,
            };
        }

        let current_byte = mf.index_byte(-1);
        let match_byte = mf.index_byte(-(rep_distances[0] as i32) - 2);

        if len_main < 2 && current_byte != match_byte && self.rep_lens[rep_max_index] < 2 {
            return Decision::literal();
        }

        self.nodes[0].state = state;
        let mut pos_state = position as u32 & self.pos_mask;

        let lit_base = coders.lit.offset(position, previous_byte);
        self.nodes[1].price = coders.is_match_price(state, pos_state, 0)
            + coders.lit.price(
                &coders.model,
                lit_base,
                !state.is_literal(),
                match_byte,
                current_byte,
            );
        self.nodes[1].make_as_char();

        let mut match_price = coders.is_match_price(state, pos_state, 1);
        let mut rep_match_price = match_price + coders.is_rep_price(state, 1);

        if match_byte == current_byte {
            let short_rep_price = rep_match_price + coders.rep_len1_price(state, pos_state);
            if short_rep_price < self.nodes[1].price {
                self.nodes[1].price = short_rep_price;
                self.nodes[1].make_as_short_rep();
            }
        }

        let mut len_end = len_main.max(self.rep_lens[rep_max_index]) as usize;
        if len_end < 2 {
            return Decision {
                len: 1,
                back: self.nodes[1].back_prev,
            };
        }

        self.nodes[1].pos_prev = 0;
        self.nodes[0].backs = self.reps;
        for node in &mut self.nodes[2..=len_end] {
            node.price = INFINITY_PRICE;
        }

        for i in 0..NUM_REPS {
            let mut rep_len = self.rep_lens[i];
            if rep_len < 2 {
                continue;
            }
            let price = rep_match_price + coders.pure_rep_price(i, state, pos_state);
            while rep_len >= 2 {
                let cur_and_len_price =
                    price + coders.rep_len.price(rep_len - 2, pos_state);
                let node = &mut self.nodes[rep_len as usize];
                if cur_and_len_price < node.price {
                    node.price = cur_and_len_price;
                    node.pos_prev = 0;
                    node.back_prev = i as u32;
                    node.prev1_is_char = false;
                }
                rep_len -= 1;
            }
        }

        let mut normal_match_price = match_price + coders.is_rep_price(state, 0);

        let mut len = if self.rep_lens[0] >= 2 {
            self.rep_lens[0] + 1
        } else {
            2
        };
        if len <= len_main {
            let mut offs = 0;
            while len > self.match_distances[offs] {
                offs += 2;
            }
            loop {
                let distance = self.match_distances[offs + 1];
                let cur_and_len_price =
                    normal_match_price + coders.pos_len_price(distance, len, pos_state);
                let node = &mut self.nodes[len as usize];
                if cur_and_len_price < node.price {
                    node.price = cur_and_len_price;
                    node.pos_prev = 0;
                    node.back_prev = distance + NUM_REPS as u32;
                    node.prev1_is_char = false;
                }
                if len == self.match_distances[offs] {
                    offs += 2;
                    if offs == num_distance_pairs {
                        break;
                    }
                }
                len += 1;
            }
        }

        let mut position = position;
        let mut cur = 0usize;
        loop {
            cur += 1;
            if cur == len_end {
                return self.backward(cur);
            }
            let mut new_len = self.read_match_distances(mf);
            num_distance_pairs = self.num_distance_pairs;
            if new_len >= self.fast_bytes {
                self.longest_match_len = new_len;
                self.longest_match_found = true;
                return self.backward(cur);
            }
            position += 1;

            let state = self.state_at(cur);
            self.nodes[cur].state = state;
            self.nodes[cur].backs = self.reps;
            let cur_price = self.nodes[cur].price;

            let current_byte = mf.index_byte(-1);
            let match_byte = mf.index_byte(-(self.reps[0] as i32) - 2);
            pos_state = position as u32 & self.pos_mask;

            let cur_and1_price = cur_price
                + coders.is_match_price(state, pos_state, 0)
                + coders.lit.price(
                    &coders.model,
                    coders.lit.offset(position, mf.index_byte(-2)),
                    !state.is_literal(),
                    match_byte,
                    current_byte,
                );

            let mut next_is_char = false;
            {
                let next = &mut self.nodes[cur + 1];
                if cur_and1_price < next.price {
                    next.price = cur_and1_price;
                    next.pos_prev = cur;
                    next.make_as_char();
                    next_is_char = true;
                }
            }

            match_price = cur_price + coders.is_match_price(state, pos_state, 1);
            rep_match_price = match_price + coders.is_rep_price(state, 1);

            let next = self.nodes[cur + 1];
            if match_byte == current_byte && !(next.pos_prev < cur && next.back_prev == 0) {
                let short_rep_price = rep_match_price + coders.rep_len1_price(state, pos_state);
                let next = &mut self.nodes[cur + 1];
                if short_rep_price <= next.price {
                    next.price = short_rep_price;
                    next.pos_prev = cur;
                    next.make_as_short_rep();
                    next_is_char = true;
                }
            }

            let available_full = (mf.available_bytes() + 1).min((NUM_OPTS - 1 - cur) as u32);
            if available_full < 2 {
                continue;
            }
            let available = available_full.min(self.fast_bytes);

            if !next_is_char && match_byte != current_byte {
                // Literal followed by rep0.
                let limit = (available_full - 1).min(self.fast_bytes);
                let len_test2 = mf.match_len(0, self.reps[0], limit);
                if len_test2 >= 2 {
                    let state2 = state.after_literal();
                    let pos_state_next = (position + 1) as u32 & self.pos_mask;
                    let next_rep_match_price = cur_and1_price
                        + coders.is_match_price(state2, pos_state_next, 1)
                        + coders.is_rep_price(state2, 1);
                    let offset = cur + 1 + len_test2 as usize;
                    len_end = self.extend_to(len_end, offset);
                    let cur_and_len_price = next_rep_match_price
                        + coders.rep_price(0, len_test2, state2, pos_state_next);
                    let node = &mut self.nodes[offset];
                    if cur_and_len_price < node.price {
                        node.price = cur_and_len_price;
                        node.pos_prev = cur + 1;
                        node.back_prev = 0;
                        node.prev1_is_char = true;
                        node.prev2 = false;
                    }
                }
            }

            let mut start_len = 2;
            for rep_index in 0..NUM_REPS {
                let rep = self.reps[rep_index];
                let len_test = mf.match_len(-1, rep, available);
                if len_test < 2 {
                    continue;
                }
                let rep_price_base = rep_match_price;
                for len in (2..=len_test).rev() {
                    len_end = self.extend_to(len_end, cur + len as usize);
                    let cur_and_len_price =
                        rep_price_base + coders.rep_price(rep_index, len, state, pos_state);
                    let node = &mut self.nodes[cur + len as usize];
                    if cur_and_len_price < node.price {
                        node.price = cur_and_len_price;
                        node.pos_prev = cur;
                        node.back_prev = rep_index as u32;
                        node.prev1_is_char = false;
                    }
                }

                if rep_index == 0 {
                    start_len = len_test + 1;
                }

                // Rep match, literal, rep0.
                if len_test < available_full {
                    let limit = (available_full - 1 - len_test).min(self.fast_bytes);
                    let len_test2 = mf.match_len(len_test as i32, rep, limit);
                    if len_test2 >= 2 {
                        let mut state2 = state.after_long_rep();
                        let mut pos_state_next = (position + u64::from(len_test)) as u32 & self.pos_mask;
                        let cur_and_len_char_price = rep_match_price
                            + coders.rep_price(rep_index, len_test, state, pos_state)
                            + coders.is_match_price(state2, pos_state_next, 0)
                            + coders.lit.price(
                                &coders.model,
                                coders.lit.offset(
                                    position + u64::from(len_test),
                                    mf.index_byte(len_test as i32 - 2),
                                ),
                                true,
                                mf.index_byte(len_test as i32 - 1 - (rep as i32 + 1)),
                                mf.index_byte(len_test as i32 - 1),
                            );
                        state2.update_literal();
                        pos_state_next =
                            (position + u64::from(len_test) + 1) as u32 & self.pos_mask;
                        let next_rep_match_price = cur_and_len_char_price
                            + coders.is_match_price(state2, pos_state_next, 1)
                            + coders.is_rep_price(state2, 1);

                        let offset = len_test as usize + 1 + len_test2 as usize;
                        len_end = self.extend_to(len_end, cur + offset);
                        let cur_and_len_price = next_rep_match_price
                            + coders.rep_price(0, len_test2, state2, pos_state_next);
                        let node = &mut self.nodes[cur + offset];
                        if cur_and_len_price < node.price {
                            node.price = cur_and_len_price;
                            node.pos_prev = cur + len_test as usize + 1;
                            node.back_prev = 0;
                            node.prev1_is_char = true;
                            node.prev2 = true;
                            node.pos_prev2 = cur;
                            node.back_prev2 = rep_index as u32;
                        }
                    }
                }
            }

            if new_len > available {
                new_len = available;
                num_distance_pairs = 0;
                while new_len > self.match_distances[num_distance_pairs] {
                    num_distance_pairs += 2;
                }
                self.match_distances[num_distance_pairs] = new_len;
                num_distance_pairs += 2;
            }
            if new_len < start_len {
                continue;
            }

            normal_match_price = match_price + coders.is_rep_price(state, 0);
            len_end = self.extend_to(len_end, cur + new_len as usize);

            let mut offs = 0;
            while start_len > self.match_distances[offs] {
                offs += 2;
            }

            let mut len_test = start_len;
            loop {
                let cur_back = self.match_distances[offs + 1];
                let cur_and_len_price =
                    normal_match_price + coders.pos_len_price(cur_back, len_test, pos_state);
                {
                    let node = &mut self.nodes[cur + len_test as usize];
                    if cur_and_len_price < node.price {
                        node.price = cur_and_len_price;
                        node.pos_prev = cur;
                        node.back_prev = cur_back + NUM_REPS as u32;
                        node.prev1_is_char = false;
                    }
                }

                if len_test == self.match_distances[offs] {
                    // Match, literal, rep0.
                    if len_test < available_full {
                        let limit = (available_full - 1 - len_test).min(self.fast_bytes);
                        let len_test2 = mf.match_len(len_test as i32, cur_back, limit);
                        if len_test2 >= 2 {
                            let mut state2 = state.after_match();
                            let mut pos_state_next =
                                (position + u64::from(len_test)) as u32 & self.pos_mask;
                            let cur_and_len_char_price = cur_and_len_price
                                + coders.is_match_price(state2, pos_state_next, 0)
                                + coders.lit.price(
                                    &coders.model,
                                    coders.lit.offset(
                                        position + u64::from(len_test),
                                        mf.index_byte(len_test as i32 - 2),
                                    ),
                                    true,
                                    mf.index_byte(len_test as i32 - (cur_back as i32 + 1) - 1),
                                    mf.index_byte(len_test as i32 - 1),
                                );
                            state2.update_literal();
                            pos_state_next =
                                (position + u64::from(len_test) + 1) as u32 & self.pos_mask;
                            let next_rep_match_price = cur_and_len_char_price
                                + coders.is_match_price(state2, pos_state_next, 1)
                                + coders.is_rep_price(state2, 1);

                            let offset = len_test as usize + 1 + len_test2 as usize;
                            len_end = self.extend_to(len_end, cur + offset);
                            let price = next_rep_match_price
                                + coders.rep_price(0, len_test2, state2, pos_state_next);
                            let node = &mut self.nodes[cur + offset];
                            if price < node.price {
                                node.price = price;
                                node.pos_prev = cur + len_test as usize + 1;
                                node.back_prev = 0;
                                node.prev1_is_char = true;
                                node.prev2 = true;
                                node.pos_prev2 = cur;
                                node.back_prev2 = cur_back + NUM_REPS as u32;
                            }
                        }
                    }
                    offs += 2;
                    if offs == num_distance_pairs {
                        break;
                    }
                }
                len_test += 1;
            }
        }
    }

    /// Reset nodes past `len_end` up to `target` and return the new end.
    #[inline]
    fn extend_to(&mut self, mut len_end: usize, target: usize) -> usize {
        while len_end < target {
            len_end += 1;
            self.nodes[len_end].price = INFINITY_PRICE;
        }
        len_end
    }

    /// Rebuild the coder state and rep distances on the cheapest path into
    /// `cur`. Leaves the reps in `self.reps`.
    fn state_at(&mut self, cur: usize) -> State {
        let node = self.nodes[cur];
        let mut pos_prev = node.pos_prev;
        let mut state;
        if node.prev1_is_char {
            pos_prev -= 1;
            if node.prev2 {
                state = self.nodes[node.pos_prev2].state;
                if node.back_prev2 < NUM_REPS as u32 {
                    state.update_long_rep();
                } else {
                    state.update_match();
                }
            } else {
                state = self.nodes[pos_prev].state;
            }
            state.update_literal();
        } else {
            state = self.nodes[pos_prev].state;
        }

        if pos_prev == cur - 1 {
            if node.is_short_rep() {
                state.update_short_rep();
            } else {
                state.update_literal();
            }
            self.reps = self.nodes[pos_prev].backs;
            return state;
        }

        let back = if node.prev1_is_char && node.prev2 {
            pos_prev = node.pos_prev2;
            state.update_long_rep();
            node.back_prev2
        } else {
            if node.back_prev < NUM_REPS as u32 {
                state.update_long_rep();
            } else {
                state.update_match();
            }
            node.back_prev
        };

        let backs = self.nodes[pos_prev].backs;
        if back < NUM_REPS as u32 {
            let back = back as usize;
            self.reps[0] = backs[back];
            let mut slot = 1;
            for (i, &dist) in backs.iter().enumerate() {
                if i != back {
                    self.reps[slot] = dist;
                    slot += 1;
                }
            }
        } else {
            self.reps = [back - NUM_REPS as u32, backs[0], backs[1], backs[2]];
        }
        state
    }

    /// Reverse the links of the cheapest path ending at `cur` and return its
    /// first step.
    fn backward(&mut self, mut cur: usize) -> Decision {
        self.end_index = cur;
        let mut pos_mem = self.nodes[cur].pos_prev;
        let mut back_mem = self.nodes[cur].back_prev;
        loop {
            let node = self.nodes[cur];
            if node.prev1_is_char {
                self.nodes[pos_mem].make_as_char();
                self.nodes[pos_mem].pos_prev = pos_mem - 1;
                if node.prev2 {
                    let before = &mut self.nodes[pos_mem - 1];
                    before.prev1_is_char = false;
                    before.pos_prev = node.pos_prev2;
                    before.back_prev = node.back_prev2;
                }
            }
            let pos_prev = pos_mem;
            let back_cur = back_mem;

            back_mem = self.nodes[pos_prev].back_prev;
            pos_mem = self.nodes[pos_prev].pos_prev;

            self.nodes[pos_prev].back_prev = back_cur;
            self.nodes[pos_prev].pos_prev = cur;
            cur = pos_prev;
            if cur == 0 {
                break;
            }
        }
        self.current_index = self.nodes[0].pos_prev;
        Decision {
            len: self.current_index as u32,
            back: self.nodes[0].back_prev,
        }
    }
}
