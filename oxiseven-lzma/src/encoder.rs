//! LZMA compression.
//!
//! [`LzmaEncoder`] codes its input one block at a time. A block starts at
//! the current position and runs until roughly [`NUM_OPTS`] bytes have been
//! coded and the optimal parser has no decisions left over, or until the
//! input runs out, in which case the stream is flushed.
//!
//! Input is queued in the match finder's window source. The encoder makes the
//! same choices whatever the size of the pieces it was fed, as long as a block
//! only starts once [`LzmaEncoder::is_ready`] holds: either the input is
//! closed or at least [`LzmaEncoder::input_threshold`] bytes are queued.

use crate::EncoderConfig;
use crate::coders::CoderSet;
use crate::match_finder::BinTree;
use crate::model::{
    LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, NUM_REPS, ProbTable, State, state_index,
};
use crate::optimal::{BACK_LITERAL, Decision, NUM_OPTS, OptimalParser};
use crate::range_coder::RangeEncoder;
use oxiseven_core::error::Result;

/// Bytes coded per block before control returns to the caller.
const BLOCK_PROGRESS: u64 = 1 << 12;

/// Block-at-a-time LZMA encoder.
#[derive(Debug)]
pub struct LzmaEncoder {
    props: LzmaProperties,
    dict_size: u32,
    end_marker: bool,
    mf: BinTree,
    coders: CoderSet,
    parser: OptimalParser,
    rc: RangeEncoder,
    state: State,
    reps: [u32; NUM_REPS],
    previous_byte: u8,
    now_pos: u64,
    started: bool,
    finished: bool,
}

impl LzmaEncoder {
    /// Create an encoder for a validated configuration.
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;
        let props = config.properties();
        let dict_size = config.dict_size();
        let fast_bytes = config.fast_bytes();

        let mut mf = BinTree::new(config.match_finder());
        mf.create(dict_size, NUM_OPTS as u32, fast_bytes, MATCH_LEN_MAX as u32 + 1);

        log::debug!(
            "lzma encoder configured: dict={dict_size} fast_bytes={fast_bytes} mf={:?} end_marker={}",
            config.match_finder(),
            config.end_marker()
        );

        Ok(Self {
            props,
            dict_size,
            end_marker: config.end_marker(),
            mf,
            coders: CoderSet::new(props, dict_size, fast_bytes),
            parser: OptimalParser::new(fast_bytes, props.pos_mask()),
            rc: RangeEncoder::new(),
            state: State::new(),
            reps: [0; NUM_REPS],
            previous_byte: 0,
            now_pos: 0,
            started: false,
            finished: false,
        })
    }

    /// Literal and position bits of the stream.
    pub fn properties(&self) -> LzmaProperties {
        self.props
    }

    /// Dictionary size written to the header.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Queue `data` for compression.
    pub fn push_input(&mut self, data: &[u8]) {
        self.mf.window_mut().source_mut().push(data);
    }

    /// Signal that no more input follows.
    pub fn close_input(&mut self) {
        self.mf.window_mut().source_mut().close();
    }

    /// Whether the input has been closed.
    pub fn is_input_closed(&self) -> bool {
        self.mf.window().source().is_closed()
    }

    /// Bytes queued but not yet taken into the window.
    pub fn pending_input(&self) -> usize {
        self.mf.window().source().len()
    }

    /// Queued bytes needed before a block may start on an open input.
    pub fn input_threshold(&self) -> usize {
        self.mf.window().block_size() + 3 * NUM_OPTS
    }

    /// Whether [`LzmaEncoder::code_one_block`] can run without making
    /// choices that depend on how the input was split.
    pub fn is_ready(&self) -> bool {
        !self.finished && (self.is_input_closed() || self.pending_input() >= self.input_threshold())
    }

    /// Uncompressed bytes coded so far.
    pub fn bytes_in(&self) -> u64 {
        self.now_pos
    }

    /// Whether the stream has been flushed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Compressed bytes waiting to be drained.
    pub fn pending_output(&self) -> usize {
        self.rc.pending().len()
    }

    /// Move compressed bytes into `out`.
    pub fn drain_output(&mut self, out: &mut [u8]) -> usize {
        self.rc.drain_into(out)
    }

    /// Code one block. Returns `true` once the stream is complete and
    /// flushed.
    pub fn code_one_block(&mut self) -> bool {
        if self.finished {
            return true;
        }
        if !self.started {
            self.mf.init();
            self.started = true;
        }
        let block_start = self.now_pos;

        if self.now_pos == 0 {
            if self.mf.available_bytes() == 0 {
                self.flush();
                return true;
            }
            self.parser.read_match_distances(&mut self.mf);
            let pos_state = self.pos_state();
            self.encode_flag(ProbTable::IsMatch, state_index(self.state, pos_state), 0);
            self.state.update_literal();
            let byte = self.mf.index_byte(-(self.parser.additional_offset() as i32));
            let base = self.coders.lit.offset(self.now_pos, self.previous_byte);
            self.coders
                .lit
                .encode(&mut self.rc, &mut self.coders.model, base, byte);
            self.previous_byte = byte;
            self.parser.consume(1);
            self.now_pos += 1;
        }
        if self.mf.available_bytes() == 0 {
            self.flush();
            return true;
        }

        loop {
            let decision = self.parser.get_optimum(
                &mut self.mf,
                &self.coders,
                self.state,
                &self.reps,
                self.now_pos,
                self.previous_byte,
            );
            self.encode_decision(decision);
            self.parser.consume(decision.len);
            self.now_pos += u64::from(decision.len);

            if self.parser.additional_offset() == 0 {
                if self.coders.dist.distances_stale() {
                    self.coders.dist.fill_distances_prices(&self.coders.model);
                }
                if self.coders.dist.align_stale() {
                    self.coders.dist.fill_align_prices(&self.coders.model);
                }
                if self.mf.available_bytes() == 0 {
                    self.flush();
                    return true;
                }
                if self.now_pos - block_start >= BLOCK_PROGRESS {
                    log::trace!(
                        "lzma block done: in={} out={}",
                        self.now_pos,
                        self.rc.processed_size()
                    );
                    return false;
                }
            }
        }
    }

    #[inline]
    fn pos_state(&self) -> u32 {
        (self.now_pos as u32) & self.props.pos_mask()
    }

    #[inline]
    fn encode_flag(&mut self, table: ProbTable, index: usize, bit: u32) {
        let prob = &mut self.coders.model.table_mut(table)[index];
        self.rc.encode_bit(prob, bit);
    }

    fn encode_decision(&mut self, decision: Decision) {
        let Decision { len, back } = decision;
        let pos_state = self.pos_state();
        let complex = state_index(self.state, pos_state);
        let s = self.state.value();
        let offset = self.parser.additional_offset() as i32;

        if len == 1 && back == BACK_LITERAL {
            self.encode_flag(ProbTable::IsMatch, complex, 0);
            let byte = self.mf.index_byte(-offset);
            let base = self.coders.lit.offset(self.now_pos, self.previous_byte);
            if self.state.is_literal() {
                self.coders
                    .lit
                    .encode(&mut self.rc, &mut self.coders.model, base, byte);
            } else {
                let match_byte = self.mf.index_byte(-(self.reps[0] as i32) - 1 - offset);
                self.coders.lit.encode_matched(
                    &mut self.rc,
                    &mut self.coders.model,
                    base,
                    match_byte,
                    byte,
                );
            }
            self.previous_byte = byte;
            self.state.update_literal();
            return;
        }

        self.encode_flag(ProbTable::IsMatch, complex, 1);
        if (back as usize) < NUM_REPS {
            self.encode_flag(ProbTable::IsRep, s, 1);
            if back == 0 {
                self.encode_flag(ProbTable::IsRepG0, s, 0);
                self.encode_flag(ProbTable::IsRep0Long, complex, u32::from(len != 1));
            } else {
                self.encode_flag(ProbTable::IsRepG0, s, 1);
                if back == 1 {
                    self.encode_flag(ProbTable::IsRepG1, s, 0);
                } else {
                    self.encode_flag(ProbTable::IsRepG1, s, 1);
                    self.encode_flag(ProbTable::IsRepG2, s, back - 2);
                }
            }

            if len == 1 {
                self.state.update_short_rep();
            } else {
                self.coders.rep_len.encode(
                    &mut self.rc,
                    &mut self.coders.model,
                    len - MATCH_LEN_MIN as u32,
                    pos_state,
                );
                self.state.update_long_rep();
            }

            let index = back as usize;
            if index != 0 {
                let dist = self.reps[index];
                self.reps.copy_within(0..index, 1);
                self.reps[0] = dist;
            }
        } else {
            self.encode_flag(ProbTable::IsRep, s, 0);
            self.state.update_match();
            self.coders.match_len.encode(
                &mut self.rc,
                &mut self.coders.model,
                len - MATCH_LEN_MIN as u32,
                pos_state,
            );
            let dist = back - NUM_REPS as u32;
            self.coders
                .dist
                .encode(&mut self.rc, &mut self.coders.model, dist, len as usize);
            self.reps.copy_within(0..NUM_REPS - 1, 1);
            self.reps[0] = dist;
        }
        self.previous_byte = self.mf.index_byte(len as i32 - 1 - offset);
    }

    fn write_end_marker(&mut self) {
        let pos_state = self.pos_state();
        let complex = state_index(self.state, pos_state);
        let s = self.state.value();
        self.encode_flag(ProbTable::IsMatch, complex, 1);
        self.encode_flag(ProbTable::IsRep, s, 0);
        self.state.update_match();
        self.coders
            .match_len
            .encode(&mut self.rc, &mut self.coders.model, 0, pos_state);
        self.coders
            .dist
            .encode_end_marker(&mut self.rc, &mut self.coders.model);
    }

    fn flush(&mut self) {
        if self.end_marker {
            self.write_end_marker();
        }
        self.rc.flush();
        self.finished = true;
        log::debug!(
            "lzma encoder flushed: in={} out={}",
            self.now_pos,
            self.rc.processed_size()
        );
    }

    /// Release the window, tables and buffered output.
    pub fn release(&mut self) {
        self.mf.release();
        self.rc.release();
        self.finished = true;
    }

    /// Compress `data` in one go and return the raw payload, without a
    /// header.
    pub fn compress(mut self, data: &[u8]) -> Vec<u8> {
        self.push_input(data);
        self.close_input();
        while !self.code_one_block() {}
        let out = self.rc.pending().to_vec();
        self.release();
        out
    }
}
