//! Base record handlers: appends, expunges, flag updates and index flags.

use std::ops::Range;

use crate::error::Result;
use crate::log::record::{AppendRecord, ExpungeGuid, FlagUpdate};
use crate::map::{MapHeader, MessageRecord};
use crate::types::{IdRange, MailFlags, SeqNum, Uid};

use super::SyncMapContext;

impl SyncMapContext<'_> {
    pub(crate) fn sync_append(&mut self, appends: &[AppendRecord]) -> Result<()> {
        for append in appends {
            let next_uid = self.map.header().next_uid;
            if append.uid < next_uid {
                return Err(self.set_corrupted(format!(
                    "Append with UID {}, but next_uid = {next_uid}",
                    append.uid
                )));
            }
            let (Some(uid), Some(new_next_uid)) = (Uid::new(append.uid), append.uid.checked_add(1))
            else {
                return Err(self.set_corrupted(format!("Append with invalid UID {}", append.uid)));
            };

            let map = Self::privatize(&mut self.map, &mut self.copied)?;
            let idx = map.push_record(MessageRecord {
                uid,
                flags: MailFlags::from_bits_truncate(append.flags),
            })?;
            map.header_mut().next_uid = new_next_uid;
            if let Some(seq) = SeqNum::from_index(idx) {
                self.modseq.appended(seq);
            }
        }
        Ok(())
    }

    pub(crate) fn sync_expunge(&mut self, ranges: &[IdRange]) -> Result<()> {
        for range in ranges {
            let span = self.map.uid_range_indexes(*range);
            self.expunge_span(span)?;
        }
        Ok(())
    }

    pub(crate) fn sync_expunge_guid(&mut self, expunges: &[ExpungeGuid]) -> Result<()> {
        for expunge in expunges {
            let Some(seq) = Uid::new(expunge.uid).and_then(|uid| self.map.lookup_uid(uid)) else {
                continue;
            };
            self.expunge_span(seq.index()..seq.index() + 1)?;
        }
        Ok(())
    }

    fn expunge_span(&mut self, span: Range<usize>) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }
        if self.handler_type.runs_expunge_handlers() {
            self.run_expunge_handlers(span.clone());
        }
        for idx in span.clone() {
            if let Some(seq) = SeqNum::from_index(idx) {
                self.modseq.expunged(seq);
            }
        }
        let map = Self::privatize(&mut self.map, &mut self.copied)?;
        map.remove_records(span);
        Ok(())
    }

    pub(crate) fn sync_flag_updates(&mut self, updates: &[FlagUpdate]) -> Result<()> {
        for update in updates {
            for idx in self.map.uid_range_indexes(update.uids) {
                let old = self.map.records()[idx].flags;
                let new = old.apply(update.add_flags, update.remove_flags);
                if old != new {
                    let map = Self::privatize(&mut self.map, &mut self.copied)?;
                    map.set_flags(idx, new);
                }
                if old != new || update.modseq_inc {
                    if let Some(seq) = SeqNum::from_index(idx) {
                        self.modseq.flags_changed(seq);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn sync_index_deleted(&mut self, deleted: bool) -> Result<()> {
        if self.map.header().is_index_deleted() == deleted {
            return Ok(());
        }
        let hdr = Self::privatize(&mut self.map, &mut self.copied)?.header_mut();
        if deleted {
            hdr.flags |= MapHeader::FLAG_INDEX_DELETED;
        } else {
            hdr.flags &= !MapHeader::FLAG_INDEX_DELETED;
        }
        Ok(())
    }
}
