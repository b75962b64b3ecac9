//! Record routing.

use crate::error::Result;
use crate::log::{RawRecord, Record, RecordType};
use crate::map::PreservedRecord;

use super::SyncMapContext;

impl SyncMapContext<'_> {
    /// Applies one log record to the map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Corrupted`] if the record is malformed or
    /// breaks an index invariant, and [`crate::Error::OutOfMemory`] if the
    /// map can't be copied or grown. After an error the pass is over; any
    /// further call fails with the same reason.
    pub fn sync_record(&mut self, record: &RawRecord) -> Result<()> {
        if self.errors {
            let reason = self.reason.clone().unwrap_or_default();
            return Err(self.set_corrupted(reason));
        }

        let map_position = self.map.header().log_position;
        self.position = record.position;
        self.record_end = record.end_position();
        if record.position < map_position {
            return Err(self.set_corrupted(format!(
                "Record at {} precedes the map's log position {map_position}",
                record.position
            )));
        }
        if let Some(prev) = self.prev_position {
            if record.position <= prev {
                return Err(self.set_corrupted(format!(
                    "Record at {} doesn't follow previous record at {prev}",
                    record.position
                )));
            }
        }
        self.prev_position = Some(record.position);

        let Some(kind) = RecordType::from_tag(record.tag) else {
            return Err(self.set_corrupted(format!(
                "Unknown transaction record type {:#x}",
                record.tag
            )));
        };
        if record.payload.len() % 4 != 0 {
            return Err(self.set_corrupted(format!(
                "{kind} record size {} is not a multiple of 4",
                record.payload.len()
            )));
        }
        let decoded = match Record::decode(kind, &record.payload) {
            Ok(decoded) => decoded,
            Err(err) => return Err(self.set_corrupted(err.to_string())),
        };

        tracing::trace!(position = %record.position, %kind, "applying record");
        match decoded {
            Record::Expunge(ranges) => self.sync_expunge(&ranges),
            Record::ExpungeGuid(expunges) => self.sync_expunge_guid(&expunges),
            Record::Append(appends) => self.sync_append(&appends),
            Record::FlagUpdate(updates) => self.sync_flag_updates(&updates),
            Record::ExtIntro(intros) => {
                for intro in &intros {
                    self.sync_ext_intro(intro)?;
                }
                Ok(())
            }
            Record::ExtReset(reset) => self.sync_ext_reset(&reset),
            Record::ExtHdrUpdate(update) => self.sync_ext_hdr_update(&update),
            Record::ExtRecUpdate { ext_id, updates } => self.sync_ext_rec_updates(ext_id, &updates),
            Record::ExtAtomicInc {
                ext_id,
                reset_id,
                incs,
            } => self.sync_ext_atomic_incs(ext_id, reset_id, &incs),
            Record::KeywordUpdate(update) => self.sync_keyword_update(&update),
            Record::KeywordReset(ranges) => self.sync_keyword_reset(&ranges),
            Record::IndexDeleted => self.sync_index_deleted(true),
            Record::IndexUndeleted => self.sync_index_deleted(false),
            Record::Unknown { tag, payload } => {
                tracing::debug!(position = %record.position, tag, "preserving unknown record");
                self.unknown_records.push(PreservedRecord {
                    position: record.position,
                    tag,
                    payload,
                });
                Ok(())
            }
        }
    }
}
