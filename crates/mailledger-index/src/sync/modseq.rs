//! Modification sequence tracking.
//!
//! The sync engine reports every per-message change to a [`ModseqTracker`].
//! Assigning and persisting modseqs is the tracker's business; the engine
//! only guarantees each change is reported once, in log order.

use std::num::NonZeroU64;

use crate::types::{ModSeq, SeqNum};

/// Receiver of per-message change notifications.
///
/// All methods default to doing nothing. Sequence numbers refer to the map
/// as it is at the time of the call: an expunged message is reported before
/// it is removed.
pub trait ModseqTracker {
    /// A message was appended.
    fn appended(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// A message's flags changed.
    fn flags_changed(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// A message's keywords changed.
    fn keywords_changed(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// A message's extension record changed.
    fn ext_changed(&mut self, seq: SeqNum, ext_id: u32) {
        let _ = (seq, ext_id);
    }

    /// A message is about to be expunged.
    fn expunged(&mut self, seq: SeqNum) {
        let _ = seq;
    }
}

/// A tracker that ignores all changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopModseq;

impl ModseqTracker for NoopModseq {}

/// A tracker that logs changes using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingModseq;

impl ModseqTracker for LoggingModseq {
    fn appended(&mut self, seq: SeqNum) {
        tracing::trace!(seq = seq.get(), "appended");
    }

    fn flags_changed(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "flags changed");
    }

    fn keywords_changed(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "keywords changed");
    }

    fn ext_changed(&mut self, seq: SeqNum, ext_id: u32) {
        tracing::trace!(seq = seq.get(), ext_id, "extension record changed");
    }

    fn expunged(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "expunged");
    }
}

/// Kind of change recorded by [`ModseqCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    /// Message appended.
    Appended,
    /// Flags changed.
    Flags,
    /// Keywords changed.
    Keywords,
    /// Extension record changed.
    Extension(u32),
    /// Message expunged.
    Expunged,
}

/// A tracker that assigns increasing modseqs and records every change.
#[derive(Debug, Clone, Default)]
pub struct ModseqCounter {
    highest: u64,
    changes: Vec<(SeqNum, Change, ModSeq)>,
}

impl ModseqCounter {
    /// Creates a counter starting after `highest`.
    #[must_use]
    pub fn starting_at(highest: Option<ModSeq>) -> Self {
        Self {
            highest: highest.map_or(0, ModSeq::get),
            changes: Vec::new(),
        }
    }

    /// Highest modseq assigned so far.
    #[must_use]
    pub fn highest_modseq(&self) -> Option<ModSeq> {
        ModSeq::from_u64(self.highest)
    }

    /// Changes in the order they were reported.
    #[must_use]
    pub fn changes(&self) -> &[(SeqNum, Change, ModSeq)] {
        &self.changes
    }

    fn record(&mut self, seq: SeqNum, change: Change) {
        self.highest = self.highest.saturating_add(1);
        let modseq = ModSeq::new(NonZeroU64::new(self.highest).unwrap_or(NonZeroU64::MAX));
        self.changes.push((seq, change, modseq));
    }
}

impl ModseqTracker for ModseqCounter {
    fn appended(&mut self, seq: SeqNum) {
        self.record(seq, Change::Appended);
    }

    fn flags_changed(&mut self, seq: SeqNum) {
        self.record(seq, Change::Flags);
    }

    fn keywords_changed(&mut self, seq: SeqNum) {
        self.record(seq, Change::Keywords);
    }

    fn ext_changed(&mut self, seq: SeqNum, ext_id: u32) {
        self.record(seq, Change::Extension(ext_id));
    }

    fn expunged(&mut self, seq: SeqNum) {
        self.record(seq, Change::Expunged);
    }
}
