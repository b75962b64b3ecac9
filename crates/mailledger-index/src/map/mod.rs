//! In-memory index map.
//!
//! An [`IndexMap`] is a snapshot of the mailbox index: a header, one record
//! per message ordered by UID, a per-message extension blob and the
//! extension and keyword tables. Maps are shared between readers as
//! `Arc<IndexMap>` and are never mutated while shared; the sync engine works
//! on a private copy and publishes it when a pass completes.

pub mod ext;
pub mod keywords;

use std::ops::Range;

use bytes::Bytes;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::types::{IdRange, LogPosition, MailFlags, SeqNum, Uid};

pub use ext::{
    Extension, ExtensionLayout, ExtensionRegistry, ExtensionState, RecordLayout, is_valid_ext_name,
};
pub use keywords::{KEYWORDS_EXT_NAME, KeywordTable};

/// Supported major format version.
pub const MAJOR_VERSION: u8 = 7;

/// Highest supported minor format version.
pub const MINOR_VERSION: u8 = 3;

/// Index map header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapHeader {
    /// Major format version.
    pub major_version: u8,
    /// Minor format version.
    pub minor_version: u8,
    /// Mailbox UIDVALIDITY, 0 if not yet assigned.
    pub uid_validity: u32,
    /// UID the next appended message must at least have.
    pub next_uid: u32,
    /// Number of message records.
    pub messages_count: u32,
    /// Messages with `\Seen`.
    pub seen_messages_count: u32,
    /// Messages with `\Deleted`.
    pub deleted_messages_count: u32,
    /// First UID that may be recent.
    pub first_recent_uid: u32,
    /// No message below this UID lacks `\Seen`.
    pub first_unseen_uid_lowwater: u32,
    /// No message below this UID has `\Deleted`.
    pub first_deleted_uid_lowwater: u32,
    /// Log position up to which the map is synced.
    pub log_position: LogPosition,
    /// Header flag bits.
    pub flags: u32,
}

impl MapHeader {
    /// Header flag: the index has been marked deleted.
    pub const FLAG_INDEX_DELETED: u32 = 0x01;

    /// Creates a header for an empty map.
    #[must_use]
    pub const fn new(uid_validity: u32) -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            uid_validity,
            next_uid: 1,
            messages_count: 0,
            seen_messages_count: 0,
            deleted_messages_count: 0,
            first_recent_uid: 1,
            first_unseen_uid_lowwater: 1,
            first_deleted_uid_lowwater: 1,
            log_position: LogPosition::new(1, 0),
            flags: 0,
        }
    }

    /// Returns true if the index is marked deleted.
    #[must_use]
    pub const fn is_index_deleted(&self) -> bool {
        self.flags & Self::FLAG_INDEX_DELETED != 0
    }
}

impl Default for MapHeader {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRecord {
    /// Message UID.
    pub uid: Uid,
    /// Message flags.
    pub flags: MailFlags,
}

/// An ignorable log record this build doesn't understand, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedRecord {
    /// Position the record was read from.
    pub position: LogPosition,
    /// Wire tag.
    pub tag: u32,
    /// Raw payload.
    pub payload: Bytes,
}

/// Consistency violation found by [`IndexMap::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Index map is inconsistent: {0}")]
pub struct MapCheckError(pub String);

/// Mailbox index snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    hdr: MapHeader,
    records: Vec<MessageRecord>,
    ext_data: Vec<u8>,
    extensions: ExtensionRegistry,
    keywords: KeywordTable,
    preserved: Vec<PreservedRecord>,
}

impl IndexMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new(uid_validity: u32) -> Self {
        Self {
            hdr: MapHeader::new(uid_validity),
            ..Self::default()
        }
    }

    /// Creates an empty map with the given header.
    ///
    /// Message counters are reset to match the empty record list.
    #[must_use]
    pub fn with_header(mut hdr: MapHeader) -> Self {
        hdr.messages_count = 0;
        hdr.seen_messages_count = 0;
        hdr.deleted_messages_count = 0;
        Self {
            hdr,
            ..Self::default()
        }
    }

    /// Map header.
    #[must_use]
    pub const fn header(&self) -> &MapHeader {
        &self.hdr
    }

    pub(crate) fn header_mut(&mut self) -> &mut MapHeader {
        &mut self.hdr
    }

    /// Number of messages.
    #[must_use]
    pub const fn messages_count(&self) -> u32 {
        self.hdr.messages_count
    }

    /// All message records in sequence order.
    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Record for a sequence number.
    #[must_use]
    pub fn record(&self, seq: SeqNum) -> Option<&MessageRecord> {
        self.records.get(seq.index())
    }

    /// Sequence number of the message with `uid`.
    #[must_use]
    pub fn lookup_uid(&self, uid: Uid) -> Option<SeqNum> {
        self.records
            .binary_search_by_key(&uid, |rec| rec.uid)
            .ok()
            .and_then(SeqNum::from_index)
    }

    /// Record indexes whose UIDs fall inside `range`.
    #[must_use]
    pub fn uid_range_indexes(&self, range: IdRange) -> Range<usize> {
        let start = self.records.partition_point(|rec| rec.uid.get() < range.low);
        let end = self.records.partition_point(|rec| rec.uid.get() <= range.high);
        start..end.max(start)
    }

    /// Extension registry.
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub(crate) fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// Extension id for `name`.
    #[must_use]
    pub fn ext_id(&self, name: &str) -> Option<u32> {
        self.extensions.lookup(name)
    }

    /// Extension slot of a message.
    #[must_use]
    pub fn ext_record(&self, seq: SeqNum, ext_id: u32) -> Option<&[u8]> {
        self.ext_slot(seq.index(), ext_id)
    }

    /// Extension header bytes.
    #[must_use]
    pub fn ext_header(&self, ext_id: u32) -> Option<&[u8]> {
        self.extensions.get(ext_id).map(Extension::header)
    }

    pub(crate) fn ext_slot(&self, idx: usize, ext_id: u32) -> Option<&[u8]> {
        let ext = self.extensions.get(ext_id)?;
        if idx >= self.records.len() {
            return None;
        }
        let start = idx * self.extensions.stride() + ext.record_offset;
        self.ext_data.get(start..start + usize::from(ext.record_size))
    }

    pub(crate) fn ext_slot_mut(&mut self, idx: usize, ext_id: u32) -> Option<&mut [u8]> {
        let ext = self.extensions.get(ext_id)?;
        if idx >= self.records.len() {
            return None;
        }
        let start = idx * self.extensions.stride() + ext.record_offset;
        let end = start + usize::from(ext.record_size);
        self.ext_data.get_mut(start..end)
    }

    /// Zeroes one extension's slot in every message.
    pub(crate) fn clear_ext_slots(&mut self, ext_id: u32) {
        for idx in 0..self.records.len() {
            if let Some(slot) = self.ext_slot_mut(idx, ext_id) {
                slot.fill(0);
            }
        }
    }

    /// Keyword name table.
    #[must_use]
    pub const fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    pub(crate) fn keywords_mut(&mut self) -> &mut KeywordTable {
        &mut self.keywords
    }

    /// Keyword names set on a message.
    #[must_use]
    pub fn message_keywords(&self, seq: SeqNum) -> Vec<&str> {
        let Some(bitmap) = self
            .ext_id(KEYWORDS_EXT_NAME)
            .and_then(|id| self.ext_slot(seq.index(), id))
        else {
            return Vec::new();
        };
        self.keywords
            .iter()
            .enumerate()
            .filter(|(idx, _)| bitmap.get(idx / 8).is_some_and(|b| b & (1u8 << (idx % 8)) != 0))
            .map(|(_, name)| name)
            .collect()
    }

    /// Returns true if the message has the keyword set.
    #[must_use]
    pub fn has_keyword(&self, seq: SeqNum, name: &str) -> bool {
        let Some(idx) = self.keywords.lookup(name) else {
            return false;
        };
        self.ext_id(KEYWORDS_EXT_NAME)
            .and_then(|id| self.ext_slot(seq.index(), id))
            .and_then(|bitmap| bitmap.get(idx / 8))
            .is_some_and(|b| b & (1u8 << (idx % 8)) != 0)
    }

    /// Ignorable records carried forward from the log.
    #[must_use]
    pub fn preserved_records(&self) -> &[PreservedRecord] {
        &self.preserved
    }

    pub(crate) fn preserve(&mut self, records: Vec<PreservedRecord>) -> Result<()> {
        self.preserved
            .try_reserve(records.len())
            .map_err(|_| Error::OutOfMemory {
                context: "preserving unknown records",
            })?;
        self.preserved.extend(records);
        Ok(())
    }

    /// Copies the map, reporting allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if a buffer can't be allocated.
    pub fn try_clone(&self) -> Result<Self> {
        let oom = |_| Error::OutOfMemory {
            context: "copying the index map",
        };
        let mut records = Vec::new();
        records.try_reserve_exact(self.records.len()).map_err(oom)?;
        records.extend_from_slice(&self.records);
        let mut ext_data = Vec::new();
        ext_data.try_reserve_exact(self.ext_data.len()).map_err(oom)?;
        ext_data.extend_from_slice(&self.ext_data);
        let mut preserved = Vec::new();
        preserved.try_reserve_exact(self.preserved.len()).map_err(oom)?;
        preserved.extend_from_slice(&self.preserved);
        Ok(Self {
            hdr: self.hdr.clone(),
            records,
            ext_data,
            extensions: self.extensions.clone(),
            keywords: self.keywords.clone(),
            preserved,
        })
    }

    /// Appends a message with a zeroed extension slot and returns its
    /// record index.
    pub(crate) fn push_record(&mut self, rec: MessageRecord) -> Result<usize> {
        let stride = self.extensions.stride();
        let oom = |_| Error::OutOfMemory {
            context: "appending a message",
        };
        self.records.try_reserve(1).map_err(oom)?;
        self.ext_data.try_reserve(stride).map_err(oom)?;
        self.records.push(rec);
        self.ext_data.resize(self.ext_data.len() + stride, 0);
        self.hdr.messages_count += 1;
        self.account_flags(rec.uid.get(), None, Some(rec.flags));
        Ok(self.records.len() - 1)
    }

    /// Replaces a message's flags, keeping header counters in step.
    pub(crate) fn set_flags(&mut self, idx: usize, flags: MailFlags) {
        let Some(rec) = self.records.get_mut(idx) else {
            return;
        };
        let (uid, old) = (rec.uid.get(), rec.flags);
        rec.flags = flags;
        self.account_flags(uid, Some(old), Some(flags));
    }

    /// Removes the records at `range` and their extension slots.
    pub(crate) fn remove_records(&mut self, range: Range<usize>) {
        let range = range.start.min(self.records.len())..range.end.min(self.records.len());
        if range.is_empty() {
            return;
        }
        let stride = self.extensions.stride();
        let removed: Vec<MessageRecord> = self.records.drain(range.clone()).collect();
        self.ext_data.drain(range.start * stride..range.end * stride);
        self.hdr.messages_count -= removed.len() as u32;
        for rec in removed {
            self.account_flags(rec.uid.get(), Some(rec.flags), None);
        }
    }

    fn account_flags(&mut self, uid: u32, old: Option<MailFlags>, new: Option<MailFlags>) {
        let was_seen = old.is_some_and(MailFlags::is_seen);
        let is_seen = new.is_some_and(MailFlags::is_seen);
        let was_deleted = old.is_some_and(MailFlags::is_deleted);
        let is_deleted = new.is_some_and(MailFlags::is_deleted);
        let hdr = &mut self.hdr;

        match (was_seen, is_seen) {
            (false, true) => hdr.seen_messages_count += 1,
            (true, false) => hdr.seen_messages_count = hdr.seen_messages_count.saturating_sub(1),
            _ => {}
        }
        match (was_deleted, is_deleted) {
            (false, true) => hdr.deleted_messages_count += 1,
            (true, false) => {
                hdr.deleted_messages_count = hdr.deleted_messages_count.saturating_sub(1);
            }
            _ => {}
        }

        if new.is_some() && !is_seen && uid < hdr.first_unseen_uid_lowwater {
            hdr.first_unseen_uid_lowwater = uid;
        }
        if is_deleted && uid < hdr.first_deleted_uid_lowwater {
            hdr.first_deleted_uid_lowwater = uid;
        }
    }

    /// Rebuilds the extension blob after registry sizes changed.
    ///
    /// `old` is the layout before the change. Each extension keeps its
    /// existing bytes at its new offset; grown slots are zero-filled.
    pub(crate) fn relayout(&mut self, old: &RecordLayout) -> Result<()> {
        let new = self.extensions.compute_layout();
        let count = self.records.len();
        let mut data = Vec::new();
        data.try_reserve_exact(count * new.stride)
            .map_err(|_| Error::OutOfMemory {
                context: "migrating extension records",
            })?;
        data.resize(count * new.stride, 0);

        for idx in 0..count {
            let old_base = idx * old.stride;
            let new_base = idx * new.stride;
            for (ext, (old_off, old_size)) in old.offsets.iter().zip(&old.sizes).enumerate() {
                let len = (*old_size).min(new.sizes[ext]);
                if len == 0 {
                    continue;
                }
                let src = old_base + old_off;
                let dst = new_base + new.offsets[ext];
                data[dst..dst + len].copy_from_slice(&self.ext_data[src..src + len]);
            }
        }

        self.ext_data = data;
        self.extensions.apply_layout(&new);
        Ok(())
    }

    /// Verifies the map's internal invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MapCheckError`] describing the first violation found.
    pub fn check(&self) -> std::result::Result<(), MapCheckError> {
        let fail = |msg: String| Err(MapCheckError(msg));
        let hdr = &self.hdr;

        if hdr.messages_count as usize != self.records.len() {
            return fail(format!(
                "messages_count {} but {} records",
                hdr.messages_count,
                self.records.len()
            ));
        }
        if self.ext_data.len() != self.records.len() * self.extensions.stride() {
            return fail(format!(
                "extension data is {} bytes, expected {}",
                self.ext_data.len(),
                self.records.len() * self.extensions.stride()
            ));
        }

        let mut prev_uid = 0;
        let (mut seen, mut deleted) = (0u32, 0u32);
        for rec in &self.records {
            let uid = rec.uid.get();
            if uid <= prev_uid {
                return fail(format!("UID {uid} follows UID {prev_uid}"));
            }
            if uid >= hdr.next_uid {
                return fail(format!("UID {uid} >= next_uid {}", hdr.next_uid));
            }
            if rec.flags.is_seen() {
                seen += 1;
            } else if uid < hdr.first_unseen_uid_lowwater {
                return fail(format!(
                    "unseen UID {uid} below lowwater {}",
                    hdr.first_unseen_uid_lowwater
                ));
            }
            if rec.flags.is_deleted() {
                deleted += 1;
                if uid < hdr.first_deleted_uid_lowwater {
                    return fail(format!(
                        "deleted UID {uid} below lowwater {}",
                        hdr.first_deleted_uid_lowwater
                    ));
                }
            }
            prev_uid = uid;
        }
        if seen != hdr.seen_messages_count {
            return fail(format!(
                "seen_messages_count {} but {seen} seen",
                hdr.seen_messages_count
            ));
        }
        if deleted != hdr.deleted_messages_count {
            return fail(format!(
                "deleted_messages_count {} but {deleted} deleted",
                hdr.deleted_messages_count
            ));
        }

        for (id, ext) in self.extensions.iter() {
            if ext.hdr_data.len() != ext.hdr_size as usize {
                return fail(format!("extension {} header size mismatch", ext.name));
            }
            if ext.record_offset + usize::from(ext.record_size) > self.extensions.stride() {
                return fail(format!("extension {} record outside stride", ext.name));
            }
            if self.extensions.lookup(&ext.name) != Some(id) {
                return fail(format!("extension {} name lookup mismatch", ext.name));
            }
        }

        if !self.keywords.is_empty() {
            let size = self
                .ext_id(KEYWORDS_EXT_NAME)
                .and_then(|id| self.extensions.get(id))
                .map_or(0, |ext| usize::from(ext.record_size));
            if size < keywords::bitmap_size_for(self.keywords.len() - 1) {
                return fail(format!(
                    "keyword bitmap of {size} bytes can't hold {} keywords",
                    self.keywords.len()
                ));
            }
        }
        Ok(())
    }

    /// Condensed description of the map.
    #[must_use]
    pub fn summary(&self) -> MapSummary {
        MapSummary {
            uid_validity: self.hdr.uid_validity,
            next_uid: self.hdr.next_uid,
            messages: self.hdr.messages_count,
            seen: self.hdr.seen_messages_count,
            deleted: self.hdr.deleted_messages_count,
            first_unseen_uid_lowwater: self.hdr.first_unseen_uid_lowwater,
            first_deleted_uid_lowwater: self.hdr.first_deleted_uid_lowwater,
            log_position: self.hdr.log_position,
            index_deleted: self.hdr.is_index_deleted(),
            extensions: self
                .extensions
                .iter()
                .map(|(id, ext)| ExtensionSummary {
                    id,
                    name: ext.name.clone(),
                    reset_id: ext.reset_id,
                    hdr_size: ext.hdr_size,
                    record_size: ext.record_size,
                    known: ext.known,
                    state: ext.state,
                })
                .collect(),
            keywords: self.keywords.iter().map(str::to_string).collect(),
            preserved_records: self.preserved.len(),
        }
    }
}

/// Printable summary of an index map.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapSummary {
    /// Mailbox UIDVALIDITY.
    pub uid_validity: u32,
    /// Next UID.
    pub next_uid: u32,
    /// Message count.
    pub messages: u32,
    /// Seen message count.
    pub seen: u32,
    /// Deleted message count.
    pub deleted: u32,
    /// Unseen lowwater.
    pub first_unseen_uid_lowwater: u32,
    /// Deleted lowwater.
    pub first_deleted_uid_lowwater: u32,
    /// Synced log position.
    pub log_position: LogPosition,
    /// Whether the index is marked deleted.
    pub index_deleted: bool,
    /// Registered extensions.
    pub extensions: Vec<ExtensionSummary>,
    /// Keyword names in index order.
    pub keywords: Vec<String>,
    /// Number of preserved unknown records.
    pub preserved_records: usize,
}

/// Extension entry of a [`MapSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtensionSummary {
    /// Registry id.
    pub id: u32,
    /// Name.
    pub name: String,
    /// Reset epoch.
    pub reset_id: u32,
    /// Header size.
    pub hdr_size: u32,
    /// Record size.
    pub record_size: u16,
    /// Understood by this build.
    pub known: bool,
    /// Lifecycle state.
    pub state: ExtensionState,
}
