//! Save and copy bookkeeping for a remote mailbox.
//!
//! When messages are appended or copied to a mailbox that lives on another
//! server, the server assigns the real UIDs and reports them through
//! `APPENDUID` and `COPYUID` response codes. Someone else may save to the
//! same mailbox meanwhile, so the local index can't keep its own appends:
//! each saved message is appended to the local transaction only for the
//! duration of the transaction and expunged again at commit. The saved UIDs
//! are handed back to the caller in [`CommitChanges`].
//!
//! ```
//! use mailledger_index::{MailFlags, SaveContext};
//!
//! let mut save = SaveContext::new(10);
//! let uid = save.handle_appenduid("1234 10");
//! save.add_to_index(uid, MailFlags::EMPTY, &["$Sent"])?;
//! save.finish()?;
//!
//! let (changes, _log) = save.commit_pre()?;
//! assert_eq!(changes.uid_validity.map(|v| v.get()), Some(1234));
//! assert_eq!(changes.saved_uids.to_string(), "10");
//! # Ok::<(), mailledger_index::SaveError>(())
//! ```

use thiserror::Error;

use crate::log::record::KeywordModify;
use crate::log::{LogError, LogWriter};
use crate::types::{IdRange, LogPosition, MailFlags, RangeSet, Uid, UidValidity};

/// Errors raised while staging saves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    /// The context was already finished or cancelled.
    #[error("Save context is already finished")]
    Finished,

    /// `commit_pre` was called before `finish`.
    #[error("Save context is not finished")]
    NotFinished,

    /// A save failed or was cancelled; the transaction can't commit.
    #[error("Save failed")]
    Failed,

    /// The server assigned a UID the local transaction can't append.
    #[error("Saved UID {uid} is below the next local UID {next_uid}")]
    UidNotAscending {
        /// UID reported for the save.
        uid: u32,
        /// Next UID the local transaction expects.
        next_uid: u32,
    },

    /// The local UID space is exhausted.
    #[error("No UIDs left for temporary appends")]
    UidsExhausted,

    /// Staging a log record failed.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Result type for save operations.
pub type SaveResult<T> = std::result::Result<T, SaveError>;

/// What the transaction reports back after a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommitChanges {
    /// UIDVALIDITY of the destination mailbox, if the server reported one.
    pub uid_validity: Option<UidValidity>,
    /// UIDs the server assigned to the saved messages.
    pub saved_uids: RangeSet,
}

/// Tracks one save/copy transaction against a remote mailbox.
#[derive(Debug)]
pub struct SaveContext {
    dest_uid_validity: Option<UidValidity>,
    saved_uids: RangeSet,
    staged: LogWriter,
    staged_uids: Vec<u32>,
    next_uid: u32,
    save_count: usize,
    failed: bool,
    finished: bool,
}

impl SaveContext {
    /// Creates a context for a transaction whose local map has `next_uid`.
    ///
    /// Staged records start at the beginning of log file 1.
    #[must_use]
    pub fn new(next_uid: u32) -> Self {
        Self::at(LogPosition::new(1, 0), next_uid)
    }

    /// Creates a context whose staged records start at `position`.
    #[must_use]
    pub fn at(position: LogPosition, next_uid: u32) -> Self {
        Self {
            dest_uid_validity: None,
            saved_uids: RangeSet::new(),
            staged: LogWriter::at(position),
            staged_uids: Vec::new(),
            next_uid: next_uid.max(1),
            save_count: 0,
            failed: false,
            finished: false,
        }
    }

    /// Handles the text of an `APPENDUID` response code:
    /// `<uidvalidity> <uid>`.
    ///
    /// Returns the assigned UID. Replies that don't parse, or that name a
    /// different UIDVALIDITY than the first one seen, are ignored.
    pub fn handle_appenduid(&mut self, text: &str) -> Option<Uid> {
        let mut args = text.split(' ');
        let (Some(validity), Some(dest), None) = (args.next(), args.next(), args.next()) else {
            return None;
        };
        self.record_dest_uids(validity, dest)
    }

    /// Handles the text of a `COPYUID` response code:
    /// `<uidvalidity> <source-set> <dest-set>`.
    ///
    /// Every destination UID is remembered. A UID is returned only when the
    /// destination set holds exactly one.
    pub fn handle_copyuid(&mut self, text: &str) -> Option<Uid> {
        let mut args = text.split(' ');
        let (Some(validity), Some(_src), Some(dest), None) =
            (args.next(), args.next(), args.next(), args.next())
        else {
            return None;
        };
        self.record_dest_uids(validity, dest)
    }

    fn record_dest_uids(&mut self, validity: &str, dest: &str) -> Option<Uid> {
        let validity = validity.parse::<u32>().ok().and_then(UidValidity::new)?;
        match self.dest_uid_validity {
            None => self.dest_uid_validity = Some(validity),
            Some(current) if current != validity => {
                tracing::debug!(
                    current = current.get(),
                    reported = validity.get(),
                    "ignoring saved UIDs for a different UIDVALIDITY"
                );
                return None;
            }
            Some(_) => {}
        }

        let dest = parse_uid_set(dest)?;
        for range in &dest {
            self.saved_uids.insert_range(*range);
        }
        match dest.as_slice() {
            [range] if range.low == range.high => Uid::new(range.low),
            _ => None,
        }
    }

    /// Stages a temporary append for one saved message.
    ///
    /// Without a server-assigned UID the message gets the next local UID.
    /// Returns the UID the message has in the staged log.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Finished`] after `finish` or `cancel`,
    /// [`SaveError::UidNotAscending`] if `uid` is below the next local UID,
    /// or a log error if a keyword name can't be encoded.
    pub fn add_to_index(&mut self, uid: Option<Uid>, flags: MailFlags, keywords: &[&str]) -> SaveResult<Uid> {
        if self.finished {
            return Err(SaveError::Finished);
        }
        let uid = match uid {
            Some(uid) if uid.get() < self.next_uid => {
                return Err(SaveError::UidNotAscending {
                    uid: uid.get(),
                    next_uid: self.next_uid,
                });
            }
            Some(uid) => uid,
            None => Uid::new(self.next_uid).ok_or(SaveError::UidsExhausted)?,
        };
        self.next_uid = uid.get().checked_add(1).ok_or(SaveError::UidsExhausted)?;

        self.staged.append(uid.get(), flags);
        for keyword in keywords {
            self.staged
                .keyword_update(KeywordModify::Add, keyword, uid.get(), uid.get())?;
        }
        self.staged_uids.push(uid.get());
        self.save_count += 1;
        tracing::trace!(uid = uid.get(), count = self.save_count, "save staged");
        Ok(uid)
    }

    /// Marks the current save as failed.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Ends the save phase.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Failed`] if any save failed.
    pub fn finish(&mut self) -> SaveResult<()> {
        self.finished = true;
        if self.failed { Err(SaveError::Failed) } else { Ok(()) }
    }

    /// Abandons the save phase.
    pub fn cancel(&mut self) {
        self.failed = true;
        self.finished = true;
    }

    /// Number of messages staged so far.
    #[must_use]
    pub const fn save_count(&self) -> usize {
        self.save_count
    }

    /// UIDVALIDITY reported by the server, if any.
    #[must_use]
    pub const fn dest_uid_validity(&self) -> Option<UidValidity> {
        self.dest_uid_validity
    }

    /// Destination UIDs reported so far.
    #[must_use]
    pub const fn saved_uids(&self) -> &RangeSet {
        &self.saved_uids
    }

    /// Prepares the commit: stages expunges for every temporary append and
    /// returns the changes to report along with the staged log.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::NotFinished`] before `finish`, and
    /// [`SaveError::Failed`] if a save failed or the context was cancelled.
    pub fn commit_pre(mut self) -> SaveResult<(CommitChanges, LogWriter)> {
        if !self.finished {
            return Err(SaveError::NotFinished);
        }
        if self.failed {
            return Err(SaveError::Failed);
        }

        let staged: RangeSet = self.staged_uids.iter().copied().collect();
        for range in staged.iter() {
            self.staged.expunge(range.low, range.high);
        }
        tracing::debug!(
            saved = self.save_count,
            uids = %self.saved_uids,
            "save transaction prepared"
        );

        let changes = CommitChanges {
            uid_validity: if self.saved_uids.is_empty() {
                None
            } else {
                self.dest_uid_validity
            },
            saved_uids: std::mem::take(&mut self.saved_uids),
        };
        Ok((changes, self.staged))
    }

    /// Drops everything staged. Messages already saved on the server stay
    /// there.
    pub fn rollback(mut self) {
        if !self.finished {
            self.cancel();
        }
        tracing::debug!(discarded = self.save_count, "save transaction rolled back");
    }
}

/// Parses an IMAP UID set such as `4,7:9`. `*` is not accepted.
fn parse_uid_set(text: &str) -> Option<Vec<IdRange>> {
    text.split(',')
        .map(|part| {
            let (low, high) = part.split_once(':').unwrap_or((part, part));
            let low = parse_uid(low)?;
            let high = parse_uid(high)?;
            IdRange::new(low.min(high), low.max(high))
        })
        .collect()
}

fn parse_uid(text: &str) -> Option<u32> {
    text.parse::<u32>().ok().filter(|uid| *uid != 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{SyncConfig, SyncHandlerType};
    use crate::map::IndexMap;
    use crate::sync::modseq::NoopModseq;
    use crate::sync::provider::NoExtensions;
    use crate::sync::{SyncEnv, sync_map};
    use crate::types::Flag;

    mod response_tests {
        use super::*;

        #[test]
        fn appenduid_records_validity_and_uid() {
            let mut save = SaveContext::new(1);
            assert_eq!(save.handle_appenduid("77 5").map(Uid::get), Some(5));
            assert_eq!(save.dest_uid_validity().map(UidValidity::get), Some(77));
            assert!(save.saved_uids().contains(5));
        }

        #[test]
        fn first_validity_wins() {
            let mut save = SaveContext::new(1);
            save.handle_appenduid("77 5");
            assert_eq!(save.handle_appenduid("78 6"), None);
            assert_eq!(save.saved_uids().to_string(), "5");
            assert_eq!(save.dest_uid_validity().map(UidValidity::get), Some(77));
        }

        #[test]
        fn malformed_replies_are_ignored() {
            let mut save = SaveContext::new(1);
            assert_eq!(save.handle_appenduid("77"), None);
            assert_eq!(save.handle_appenduid("77 5 6"), None);
            assert_eq!(save.handle_appenduid("x 5"), None);
            assert_eq!(save.handle_appenduid("0 5"), None);
            assert_eq!(save.handle_copyuid("77 1:2"), None);
            assert!(save.saved_uids().is_empty());
        }

        #[test]
        fn copyuid_collects_destination_set() {
            let mut save = SaveContext::new(1);
            assert_eq!(save.handle_copyuid("9 1:3 12:10"), None);
            assert_eq!(save.handle_copyuid("9 4 20").map(Uid::get), Some(20));
            assert_eq!(save.saved_uids().to_string(), "10:12,20");
        }
    }

    mod commit_tests {
        use super::*;

        #[test]
        fn temporary_appends_are_expunged_at_commit() {
            let mut save = SaveContext::new(3);
            let uid = save.handle_appenduid("5 40");
            let seen: MailFlags = [Flag::Seen].into_iter().collect();
            save.add_to_index(uid, seen, &["$Sent"]).unwrap();
            save.add_to_index(None, MailFlags::EMPTY, &[]).unwrap();
            assert_eq!(save.save_count(), 2);
            save.finish().unwrap();

            let (changes, log) = save.commit_pre().unwrap();
            assert_eq!(changes.saved_uids.to_string(), "40");

            let config = SyncConfig::default();
            let mut log = log.into_log();
            let mut hdr = IndexMap::new(5);
            hdr.header_mut().next_uid = 3;
            let outcome = sync_map(
                Arc::new(hdr),
                &mut log,
                SyncHandlerType::Head,
                SyncEnv {
                    config: &config,
                    provider: &NoExtensions,
                    modseq: &mut NoopModseq,
                },
            )
            .unwrap();
            assert_eq!(outcome.map.messages_count(), 0);
            assert_eq!(outcome.map.header().next_uid, 42);
            assert_eq!(outcome.map.keywords().lookup("$Sent"), Some(0));
        }

        #[test]
        fn uid_below_next_is_rejected() {
            let mut save = SaveContext::new(10);
            let err = save
                .add_to_index(Uid::new(4), MailFlags::EMPTY, &[])
                .unwrap_err();
            assert_eq!(err, SaveError::UidNotAscending { uid: 4, next_uid: 10 });
        }

        #[test]
        fn commit_requires_finish() {
            let save = SaveContext::new(1);
            assert_eq!(save.commit_pre().unwrap_err(), SaveError::NotFinished);
        }

        #[test]
        fn failed_save_blocks_commit() {
            let mut save = SaveContext::new(1);
            save.add_to_index(None, MailFlags::EMPTY, &[]).unwrap();
            save.fail();
            assert_eq!(save.finish().unwrap_err(), SaveError::Failed);
            assert_eq!(save.commit_pre().unwrap_err(), SaveError::Failed);
        }

        #[test]
        fn cancelled_context_rejects_saves() {
            let mut save = SaveContext::new(1);
            save.cancel();
            assert_eq!(
                save.add_to_index(None, MailFlags::EMPTY, &[]).unwrap_err(),
                SaveError::Finished
            );
            save.rollback();
        }
    }
}
