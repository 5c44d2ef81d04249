//! Checkpoint store for resumable decoding.
//!
//! Compressed input may stop at any byte, including in the middle of a symbol.
//! Before each decode attempt the decoder opens a [`Checkpoint`] holding the
//! range coder registers, the input cursor, the coder state and the rep
//! distances. While the attempt runs, every probability write is journaled as
//! `(table, index, previous value)` through a [`JournaledDecoder`].
//!
//! If the attempt runs out of input, [`Checkpoint::rollback`] replays the
//! journal backwards and hands back the snapshot, leaving the model exactly as
//! it was; the bytes the attempt consumed stay in the input buffer and are read
//! again on the next attempt. A successful attempt calls
//! [`Checkpoint::commit`], which only clears the journal.

use crate::model::{LzmaModel, NUM_REPS, ProbTable, State};
use crate::range_coder::{BitDecode, RangeDecoder, RangeRegisters, Step};

/// Everything outside the probability tables that an attempt may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Range coder registers.
    pub registers: RangeRegisters,
    /// Input cursor.
    pub cursor: usize,
    /// Coder state.
    pub state: State,
    /// Rep distances.
    pub reps: [u32; NUM_REPS],
}

/// One journaled probability write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    table: ProbTable,
    index: u32,
    previous: u16,
}

/// Undo log of one decode attempt.
#[derive(Debug, Default)]
pub struct Checkpoint {
    snapshot: Option<Snapshot>,
    entries: Vec<Entry>,
}

impl Checkpoint {
    /// Create an empty checkpoint store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a checkpoint for a new attempt.
    ///
    /// At most one checkpoint is open at a time; opening one while another is
    /// still uncommitted is a logic error.
    pub fn begin(&mut self, snapshot: Snapshot) {
        debug_assert!(self.snapshot.is_none(), "checkpoint already open");
        self.entries.clear();
        self.snapshot = Some(snapshot);
    }

    /// Whether an attempt is in progress.
    pub fn is_open(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of journaled writes in the open attempt.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the value a cell held before it is written.
    ///
    /// A write to the cell most recently journaled is skipped; the entry
    /// already holds the older value.
    pub fn record(&mut self, table: ProbTable, index: usize, previous: u16) {
        let index = index as u32;
        if let Some(last) = self.entries.last() {
            if last.table == table && last.index == index {
                return;
            }
        }
        self.entries.push(Entry {
            table,
            index,
            previous,
        });
    }

    /// Accept the attempt.
    pub fn commit(&mut self) {
        self.entries.clear();
        self.snapshot = None;
    }

    /// Undo the attempt: restore every journaled cell, newest first, and
    /// return the snapshot taken when the attempt began.
    pub fn rollback(&mut self, model: &mut LzmaModel) -> Option<Snapshot> {
        let undone = self.entries.len();
        for entry in self.entries.drain(..).rev() {
            model.table_mut(entry.table)[entry.index as usize] = entry.previous;
        }
        let snapshot = self.snapshot.take();
        if snapshot.is_some() {
            log::trace!("checkpoint rollback, {undone} probability writes undone");
        }
        snapshot
    }

    /// Drop an open attempt without replaying it.
    pub fn discard(&mut self) {
        self.entries = Vec::new();
        self.snapshot = None;
    }
}

/// A [`BitDecode`] that journals every probability write into a checkpoint.
pub(crate) struct JournaledDecoder<'a> {
    rc: &'a mut RangeDecoder,
    model: &'a mut LzmaModel,
    journal: &'a mut Checkpoint,
}

impl<'a> JournaledDecoder<'a> {
    pub(crate) fn new(
        rc: &'a mut RangeDecoder,
        model: &'a mut LzmaModel,
        journal: &'a mut Checkpoint,
    ) -> Self {
        Self { rc, model, journal }
    }
}

impl BitDecode for JournaledDecoder<'_> {
    #[inline]
    fn decode_bit(&mut self, table: ProbTable, index: usize) -> Step<u32> {
        let cell = &mut self.model.table_mut(table)[index];
        self.journal.record(table, index, *cell);
        self.rc.decode_bit(cell)
    }

    fn decode_direct_bits(&mut self, count: u32) -> Step<u32> {
        self.rc.decode_direct_bits(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LzmaProperties;
    use crate::range_coder::{Interrupt, PROB_INIT, RangeEncoder};

    fn snapshot_of(rc: &RangeDecoder) -> Snapshot {
        Snapshot {
            registers: rc.registers(),
            cursor: rc.input().cursor(),
            state: State::new(),
            reps: [0; NUM_REPS],
        }
    }

    #[test]
    fn test_coalesces_repeated_cell() {
        let mut cp = Checkpoint::new();
        cp.begin(Snapshot {
            registers: RangeRegisters { range: 1, code: 0 },
            cursor: 0,
            state: State::new(),
            reps: [0; NUM_REPS],
        });
        cp.record(ProbTable::IsRep, 3, 1024);
        cp.record(ProbTable::IsRep, 3, 1055);
        cp.record(ProbTable::IsRepG0, 3, 1024);
        cp.record(ProbTable::IsRep, 3, 990);
        assert_eq!(cp.len(), 3);
    }

    #[test]
    fn test_rollback_restores_model_and_cursor() {
        let mut model = LzmaModel::new(LzmaProperties::default());
        let mut encoder = RangeEncoder::new();
        for symbol in [200u32, 13, 77] {
            encoder.encode_tree(model.table_mut(ProbTable::Literal), 1, 8, symbol);
        }
        let encoded = encoder.finish();

        let mut model = LzmaModel::new(LzmaProperties::default());
        let mut rc = RangeDecoder::new();
        rc.input_mut().push(&encoded[..6]);
        rc.init().unwrap();
        let mut cp = Checkpoint::new();

        // Decode until the buffer runs dry, then roll back.
        cp.begin(snapshot_of(&rc));
        let start = snapshot_of(&rc);
        let result = {
            let mut d = JournaledDecoder::new(&mut rc, &mut model, &mut cp);
            (0..3)
                .map(|_| d.decode_tree(ProbTable::Literal, 1, 8))
                .collect::<Step<Vec<u32>>>()
        };
        assert!(matches!(result, Err(Interrupt::NoInput)));
        assert!(!cp.is_empty());

        let snapshot = cp.rollback(&mut model).unwrap();
        assert_eq!(snapshot, start);
        rc.restore(snapshot.registers);
        rc.input_mut().rewind(snapshot.cursor);
        assert!(model.table(ProbTable::Literal).iter().all(|&p| p == PROB_INIT));

        // Retry with the full stream and get the original symbols.
        rc.input_mut().push(&encoded[6..]);
        cp.begin(snapshot_of(&rc));
        let mut d = JournaledDecoder::new(&mut rc, &mut model, &mut cp);
        for symbol in [200u32, 13, 77] {
            assert_eq!(d.decode_tree(ProbTable::Literal, 1, 8).unwrap(), symbol);
        }
        cp.commit();
        assert!(!cp.is_open());
    }

    #[test]
    fn test_discard_drops_snapshot() {
        let mut cp = Checkpoint::new();
        cp.begin(Snapshot {
            registers: RangeRegisters { range: 9, code: 4 },
            cursor: 2,
            state: State::new(),
            reps: [1, 2, 3, 4],
        });
        cp.record(ProbTable::Align, 1, 1000);
        cp.discard();
        assert!(!cp.is_open());
        let mut model = LzmaModel::new(LzmaProperties::default());
        assert!(cp.rollback(&mut model).is_none());
    }
}
