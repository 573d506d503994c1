//! Chain builder and the arithmetic for finding chain spans in the history list.

use std::ops::Range;

use super::HistoryError;
use super::operation::{ChainRole, Operation};

/// Tags operations registered between `start` and `finish` so they undo as one step.
#[derive(Debug, Default)]
pub(crate) struct ChainBuilder {
    open: bool,
    ignoring: bool,
    /// Whether the open chain has recorded its `Start` yet.
    recorded: bool,
}

impl ChainBuilder {
    pub fn start(&mut self) -> Result<(), HistoryError> {
        if self.open {
            return Err(HistoryError::ChainAlreadyOpen);
        }
        self.open = true;
        self.ignoring = false;
        self.recorded = false;
        Ok(())
    }

    /// Close the window. Returns whether any operation was tagged, i.e. whether
    /// the caller has an `End` to write.
    pub fn finish(&mut self) -> Result<bool, HistoryError> {
        if !self.open {
            return Err(HistoryError::ChainNotOpen);
        }
        let recorded = self.recorded;
        *self = Self::default();
        Ok(recorded)
    }

    pub fn ignore(&mut self, flag: bool) {
        if self.open {
            self.ignoring = flag;
        }
    }

    pub fn is_started(&self) -> bool {
        self.open
    }

    /// Role for the next registered operation.
    pub fn next_role(&mut self) -> ChainRole {
        if !self.open || self.ignoring {
            ChainRole::NoChain
        } else if self.recorded {
            ChainRole::Middle
        } else {
            self.recorded = true;
            ChainRole::Start
        }
    }

    /// The tagged part of the open chain was dropped; tag the next one as `Start` again.
    pub fn restart(&mut self) {
        self.recorded = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn continues_backward(ops: &[Operation], i: usize) -> bool {
    i > 0
        && matches!(ops[i].chain, ChainRole::Middle | ChainRole::End)
        && matches!(ops[i - 1].chain, ChainRole::Start | ChainRole::Middle)
}

fn continues_forward(ops: &[Operation], i: usize) -> bool {
    i + 1 < ops.len()
        && matches!(ops[i].chain, ChainRole::Start | ChainRole::Middle)
        && matches!(ops[i + 1].chain, ChainRole::Middle | ChainRole::End)
}

/// Whole chain containing `index`; a single-element range for unchained operations.
pub(crate) fn chain_bounds(ops: &[Operation], index: usize) -> Range<usize> {
    let mut start = index;
    while continues_backward(ops, start) {
        start -= 1;
    }
    let mut end = index;
    while continues_forward(ops, end) {
        end += 1;
    }
    start..end + 1
}

/// Operations to reverse when undoing with the cursor at `current` (> 0).
pub(crate) fn undo_span(ops: &[Operation], current: usize) -> Range<usize> {
    chain_bounds(ops, current - 1).start..current
}

/// Operations to replay when redoing with the cursor at `current` (< len).
pub(crate) fn redo_span(ops: &[Operation], current: usize) -> Range<usize> {
    current..chain_bounds(ops, current).end
}

/// Index of the last operation still tagged `Start` or `Middle`, i.e. the
/// one that becomes the chain's `End` when the builder is finished.
pub(crate) fn open_tail(ops: &[Operation]) -> Option<usize> {
    ops.iter()
        .rposition(|op| op.chain != ChainRole::NoChain)
        .filter(|&i| matches!(ops[i].chain, ChainRole::Start | ChainRole::Middle))
}

/// Rewrite roles so every chained run reads `Start`, `Middle`..., `End`.
/// A run of a single operation, e.g. a fragment left by an ignored member
/// or a removed tail, becomes `NoChain`.
pub(crate) fn normalize(ops: &mut [Operation]) {
    let mut i = 0;
    while i < ops.len() {
        if ops[i].chain == ChainRole::NoChain {
            i += 1;
            continue;
        }
        let run = chain_bounds(ops, i);
        for j in run.clone() {
            ops[j].chain = if run.len() == 1 {
                ChainRole::NoChain
            } else if j == run.start {
                ChainRole::Start
            } else if j + 1 == run.end {
                ChainRole::End
            } else {
                ChainRole::Middle
            };
        }
        i = run.end;
    }
}
