//! LZMA decompression.
//!
//! [`LzmaDecoder`] decodes whatever compressed bytes it has been given and
//! stops when it needs more input, when its output window is full, or when
//! the stream ends. Every symbol is decoded inside a checkpoint: if the input
//! runs dry halfway through, the probability writes are undone and the
//! registers and input cursor restored, so the symbol is decoded again from
//! scratch once more bytes arrive. A symbol only reaches the output window
//! after it has been decoded completely and validated, so output is never
//! taken back.
//!
//! A stream of known size ends when that many bytes have been produced. The
//! range coder must then be exhausted, or be followed by an end marker. A
//! stream of unknown size must end with an end marker.

use crate::checkpoint::{Checkpoint, JournaledDecoder, Snapshot};
use crate::coders::{DistCoder, LenCoder, LitCoder};
use crate::header::LzmaHeader;
use crate::model::{
    LzmaModel, LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, NUM_REPS, ProbTable, State,
    state_index,
};
use crate::out_window::OutWindow;
use crate::range_coder::{BitDecode, InputBuffer, Interrupt, RangeDecoder, Step};
use oxiseven_core::error::{OxiSevenError, Result};

/// Why [`LzmaDecoder::decode_chunk`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Every buffered input byte has been used.
    NeedsInput,
    /// The output window must be drained before decoding can continue.
    NeedsOutput,
    /// The stream is complete.
    Finished,
}

/// One decoded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Literal(u8),
    /// A match or rep match; `dist` is the offset minus one.
    Match {
        dist: u32,
        len: u32,
    },
    EndMarker,
}

/// A symbol together with the coder state it leads to.
#[derive(Debug, Clone, Copy)]
struct Decoded {
    symbol: Symbol,
    state: State,
    reps: [u32; NUM_REPS],
}

/// Resumable LZMA decoder.
#[derive(Debug)]
pub struct LzmaDecoder {
    props: LzmaProperties,
    dict_size: u32,
    declared_size: Option<u64>,
    model: LzmaModel,
    lit: LitCoder,
    rc: RangeDecoder,
    window: OutWindow,
    journal: Checkpoint,
    state: State,
    reps: [u32; NUM_REPS],
    primed: bool,
    finished: bool,
}

impl LzmaDecoder {
    /// Create a decoder for a stream with the given properties.
    pub fn new(props: LzmaProperties, dict_size: u32, declared_size: Option<u64>) -> Self {
        Self::from_header(&LzmaHeader::new(props, dict_size, declared_size))
    }

    /// Create a decoder for a parsed header.
    pub fn from_header(header: &LzmaHeader) -> Self {
        Self {
            props: header.props,
            dict_size: header.dict_size.max(1),
            declared_size: header.uncompressed_size,
            model: LzmaModel::new(header.props),
            lit: LitCoder::new(header.props),
            rc: RangeDecoder::new(),
            window: OutWindow::new(header.window_size()),
            journal: Checkpoint::new(),
            state: State::new(),
            reps: [0; NUM_REPS],
            primed: false,
            finished: false,
        }
    }

    /// Literal and position bits of the stream.
    pub fn properties(&self) -> LzmaProperties {
        self.props
    }

    /// Declared uncompressed size, if known.
    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// The compressed input queue.
    pub fn input(&self) -> &InputBuffer {
        self.rc.input()
    }

    /// Mutable access to the compressed input queue.
    pub fn input_mut(&mut self) -> &mut InputBuffer {
        self.rc.input_mut()
    }

    /// Bytes produced so far, drained or not.
    pub fn total_out(&self) -> u64 {
        self.window.total_pos()
    }

    /// Decoded bytes not yet drained.
    pub fn pending_output(&self) -> usize {
        self.window.pending()
    }

    /// Move decoded bytes into `out`.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        self.window.drain_into(out)
    }

    /// Whether the end of the stream has been reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode as much as the buffered input and free window space allow.
    pub fn decode_chunk(&mut self) -> Result<ChunkStatus> {
        if self.finished {
            return Ok(ChunkStatus::Finished);
        }
        if !self.primed {
            let cursor = self.rc.input().cursor();
            match self.rc.init() {
                Ok(()) => self.primed = true,
                Err(Interrupt::NoInput) => {
                    self.rc.input_mut().rewind(cursor);
                    return Ok(ChunkStatus::NeedsInput);
                }
                Err(Interrupt::Fatal(err)) => return Err(err),
            }
        }

        let status = self.run();
        if !self.journal.is_open() {
            self.compact_input();
        }
        status
    }

    fn run(&mut self) -> Result<ChunkStatus> {
        loop {
            if self.declared_size == Some(self.window.total_pos()) {
                return self.finish_known_size();
            }
            if self.window.free() < MATCH_LEN_MAX {
                return Ok(ChunkStatus::NeedsOutput);
            }

            let decoded = match self.attempt() {
                Ok(decoded) => decoded,
                Err(Interrupt::NoInput) => return Ok(ChunkStatus::NeedsInput),
                Err(Interrupt::Fatal(err)) => return Err(err),
            };
            let total = self.window.total_pos();
            match decoded.symbol {
                Symbol::Literal(byte) => self.window.put_byte(byte),
                Symbol::Match { dist, len } => {
                    self.check_match(dist, len)?;
                    self.window.copy_block(dist, len as usize);
                }
                Symbol::EndMarker => {
                    if self.declared_size.is_some() {
                        return Err(OxiSevenError::corrupted(
                            total,
                            "end marker before the declared size",
                        ));
                    }
                    self.check_exhausted()?;
                    self.finish();
                    return Ok(ChunkStatus::Finished);
                }
            }
            self.state = decoded.state;
            self.reps = decoded.reps;
        }
    }

    /// The declared size has been produced. Either the range coder is spent,
    /// or an end marker follows.
    fn finish_known_size(&mut self) -> Result<ChunkStatus> {
        if self.rc.registers().code != 0 {
            let total = self.window.total_pos();
            match self.attempt() {
                Ok(Decoded {
                    symbol: Symbol::EndMarker,
                    ..
                }) => self.check_exhausted()?,
                Ok(_) => {
                    return Err(OxiSevenError::corrupted(
                        total,
                        "data continues past the declared size",
                    ));
                }
                Err(Interrupt::NoInput) => return Ok(ChunkStatus::NeedsInput),
                Err(Interrupt::Fatal(err)) => return Err(err),
            }
        }
        self.finish();
        Ok(ChunkStatus::Finished)
    }

    /// Decode one symbol under a checkpoint. On `NoInput` everything the
    /// attempt touched has been restored.
    fn attempt(&mut self) -> Step<Decoded> {
        self.journal.begin(Snapshot {
            registers: self.rc.registers(),
            cursor: self.rc.input().cursor(),
            state: self.state,
            reps: self.reps,
        });

        let pos_state = (self.window.total_pos() as u32) & self.props.pos_mask();
        let result = {
            let mut d = JournaledDecoder::new(&mut self.rc, &mut self.model, &mut self.journal);
            decode_symbol(&mut d, &self.lit, &self.window, self.state, self.reps, pos_state)
        };

        match result {
            Ok(_) => self.journal.commit(),
            Err(Interrupt::NoInput) => {
                if let Some(snapshot) = self.journal.rollback(&mut self.model) {
                    self.rc.restore(snapshot.registers);
                    self.rc.input_mut().rewind(snapshot.cursor);
                    self.state = snapshot.state;
                    self.reps = snapshot.reps;
                }
            }
            Err(Interrupt::Fatal(_)) => self.journal.discard(),
        }
        result
    }

    fn check_match(&self, dist: u32, len: u32) -> Result<()> {
        let total = self.window.total_pos();
        if u64::from(dist) >= total {
            return Err(OxiSevenError::corrupted(
                total,
                format!("match distance {} reaches before the start of the output", dist as u64 + 1),
            ));
        }
        if dist >= self.dict_size {
            return Err(OxiSevenError::corrupted(
                total,
                format!(
                    "match distance {} exceeds the dictionary size {}",
                    dist as u64 + 1,
                    self.dict_size
                ),
            ));
        }
        if let Some(size) = self.declared_size {
            if total + u64::from(len) > size {
                return Err(OxiSevenError::corrupted(
                    total,
                    format!("match of {len} bytes runs past the declared size {size}"),
                ));
            }
        }
        Ok(())
    }

    fn check_exhausted(&self) -> Result<()> {
        if self.rc.registers().code != 0 {
            return Err(OxiSevenError::corrupted(
                self.window.total_pos(),
                "range coder not exhausted at the end marker",
            ));
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        log::debug!(
            "lzma stream finished: out={} unread input={}",
            self.window.total_pos(),
            self.rc.input().remaining()
        );
    }

    fn compact_input(&mut self) {
        let input = self.rc.input_mut();
        if input.cursor() > 0 && input.cursor() >= input.remaining() {
            log::trace!("lzma input compacted by {} bytes", input.cursor());
            input.compact();
        }
    }

    /// Release the window and input, dropping any open checkpoint.
    pub fn release(&mut self) {
        self.journal.discard();
        self.window.release();
        self.rc.input_mut().clear();
        self.finished = true;
    }
}

fn decode_symbol<D: BitDecode>(
    d: &mut D,
    lit: &LitCoder,
    window: &OutWindow,
    state: State,
    mut reps: [u32; NUM_REPS],
    pos_state: u32,
) -> Step<Decoded> {
    let complex = state_index(state, pos_state);
    let s = state.value();

    if d.decode_bit(ProbTable::IsMatch, complex)? == 0 {
        let total = window.total_pos();
        let prev_byte = if total == 0 { 0 } else { window.get_byte(0) };
        let base = lit.offset(total, prev_byte);
        let byte = if state.is_literal() {
            lit.decode(d, base)?
        } else {
            lit.decode_matched(d, base, window.get_byte(reps[0]))?
        };
        return Ok(Decoded {
            symbol: Symbol::Literal(byte),
            state: state.after_literal(),
            reps,
        });
    }

    if d.decode_bit(ProbTable::IsRep, s)? == 0 {
        let len = LenCoder::decode(d, ProbTable::MatchLen, pos_state)? + MATCH_LEN_MIN as u32;
        let dist = DistCoder::decode(d, len as usize)?;
        if dist == u32::MAX {
            return Ok(Decoded {
                symbol: Symbol::EndMarker,
                state,
                reps,
            });
        }
        reps.copy_within(0..NUM_REPS - 1, 1);
        reps[0] = dist;
        return Ok(Decoded {
            symbol: Symbol::Match { dist, len },
            state: state.after_match(),
            reps,
        });
    }

    if d.decode_bit(ProbTable::IsRepG0, s)? == 0 {
        if d.decode_bit(ProbTable::IsRep0Long, complex)? == 0 {
            return Ok(Decoded {
                symbol: Symbol::Match {
                    dist: reps[0],
                    len: 1,
                },
                state: state.after_short_rep(),
                reps,
            });
        }
    } else {
        let dist = if d.decode_bit(ProbTable::IsRepG1, s)? == 0 {
            reps[1]
        } else {
            let dist = if d.decode_bit(ProbTable::IsRepG2, s)? == 0 {
                reps[2]
            } else {
                let dist = reps[3];
                reps[3] = reps[2];
                dist
            };
            reps[2] = reps[1];
            dist
        };
        reps[1] = reps[0];
        reps[0] = dist;
    }

    let len = LenCoder::decode(d, ProbTable::RepLen, pos_state)? + MATCH_LEN_MIN as u32;
    Ok(Decoded {
        symbol: Symbol::Match { dist: reps[0], len },
        state: state.after_long_rep(),
        reps,
    })
}
