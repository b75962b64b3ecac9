//! Builder for transaction log frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::record::{EXT_ID_BY_NAME, KeywordModify, RecordType, pad4};
use super::{FRAME_HEADER_SIZE, LogError, MemoryLog};
use crate::types::{LogPosition, MailFlags};

/// Longest name an intro or keyword record can carry.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Description of an extension introduction to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtIntroSpec {
    /// Registry id, or [`EXT_ID_BY_NAME`] to register by name.
    pub ext_id: u32,
    /// Extension name.
    pub name: String,
    /// Reset epoch.
    pub reset_id: u32,
    /// Header size in bytes.
    pub hdr_size: u32,
    /// Per-message record size in bytes.
    pub record_size: u16,
    /// Per-message record alignment.
    pub record_align: u16,
}

impl ExtIntroSpec {
    /// Introduces an extension by name with the given record size and no
    /// header.
    #[must_use]
    pub fn new(name: impl Into<String>, record_size: u16) -> Self {
        Self {
            ext_id: EXT_ID_BY_NAME,
            name: name.into(),
            reset_id: 0,
            hdr_size: 0,
            record_size,
            record_align: natural_align(record_size),
        }
    }

    /// Sets the header size.
    #[must_use]
    pub const fn hdr_size(mut self, size: u32) -> Self {
        self.hdr_size = size;
        self
    }

    /// Sets the record alignment.
    #[must_use]
    pub const fn record_align(mut self, align: u16) -> Self {
        self.record_align = align;
        self
    }

    /// Sets the reset epoch.
    #[must_use]
    pub const fn reset_id(mut self, reset_id: u32) -> Self {
        self.reset_id = reset_id;
        self
    }

    /// Refers to an existing registry id instead of the name.
    #[must_use]
    pub const fn ext_id(mut self, ext_id: u32) -> Self {
        self.ext_id = ext_id;
        self
    }
}

/// Largest power-of-two alignment (up to 8) that divides `size`.
const fn natural_align(size: u16) -> u16 {
    if size % 8 == 0 && size != 0 {
        8
    } else if size % 4 == 0 && size != 0 {
        4
    } else if size % 2 == 0 && size != 0 {
        2
    } else {
        1
    }
}

/// Appends framed records to an in-memory log file.
///
/// Writers are used by local transactions (see [`crate::save`]) and by
/// tests; positions handed out by [`LogWriter::position`] are the positions
/// the sync engine will see when it reads the frames back.
#[derive(Debug, Clone)]
pub struct LogWriter {
    buf: BytesMut,
    file_seq: u32,
    base_offset: u64,
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LogWriter {
    /// Creates a writer for log file `file_seq` starting at offset 0.
    #[must_use]
    pub fn new(file_seq: u32) -> Self {
        Self::at(LogPosition::new(file_seq, 0))
    }

    /// Creates a writer whose first frame lands at `start`.
    #[must_use]
    pub fn at(start: LogPosition) -> Self {
        Self {
            buf: BytesMut::new(),
            file_seq: start.file_seq,
            base_offset: start.offset,
        }
    }

    /// Position of the next frame.
    #[must_use]
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.file_seq, self.base_offset + self.buf.len() as u64)
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a raw frame. The payload is padded to 4 bytes.
    pub fn raw(&mut self, tag: u32, payload: &[u8]) -> &mut Self {
        let padded = pad4(payload.len());
        self.buf.reserve(FRAME_HEADER_SIZE + padded);
        self.buf.put_u32_le(tag);
        self.buf.put_u32_le(u32::try_from(padded).unwrap_or(u32::MAX));
        self.buf.put_slice(payload);
        self.buf.put_bytes(0, padded - payload.len());
        self
    }

    fn frame(&mut self, kind: RecordType, body: &BytesMut) -> &mut Self {
        self.raw(kind.tag(), body)
    }

    /// Appends one message.
    pub fn append(&mut self, uid: u32, flags: MailFlags) -> &mut Self {
        self.appends(&[(uid, flags)])
    }

    /// Appends several messages in one record.
    pub fn appends(&mut self, messages: &[(u32, MailFlags)]) -> &mut Self {
        let mut body = BytesMut::with_capacity(messages.len() * 8);
        for (uid, flags) in messages {
            body.put_u32_le(*uid);
            body.put_u32_le(u32::from(flags.bits()));
        }
        self.frame(RecordType::Append, &body)
    }

    /// Expunges a UID range.
    pub fn expunge(&mut self, uid1: u32, uid2: u32) -> &mut Self {
        self.uid_ranges(RecordType::Expunge, &[(uid1, uid2)])
    }

    /// Expunges one UID with its GUID.
    pub fn expunge_guid(&mut self, uid: u32, guid: [u8; 16]) -> &mut Self {
        let mut body = BytesMut::with_capacity(20);
        body.put_u32_le(uid);
        body.put_slice(&guid);
        self.frame(RecordType::ExpungeGuid, &body)
    }

    /// Adds and removes flags over a UID range.
    pub fn flag_update(&mut self, uid1: u32, uid2: u32, add: MailFlags, remove: MailFlags) -> &mut Self {
        let mut body = BytesMut::with_capacity(12);
        body.put_u32_le(uid1);
        body.put_u32_le(uid2);
        body.put_u8(add.bits());
        body.put_u8(remove.bits());
        body.put_u8(0);
        body.put_u8(0);
        self.frame(RecordType::FlagUpdate, &body)
    }

    /// Introduces an extension.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NameTooLong`] if the name doesn't fit the record.
    pub fn ext_intro(&mut self, intro: &ExtIntroSpec) -> Result<&mut Self, LogError> {
        let name_size = name_len(&intro.name)?;
        let mut body = BytesMut::with_capacity(20 + pad4(intro.name.len()));
        body.put_u32_le(intro.ext_id);
        body.put_u32_le(intro.reset_id);
        body.put_u32_le(intro.hdr_size);
        body.put_u16_le(intro.record_size);
        body.put_u16_le(intro.record_align);
        body.put_u16_le(0);
        body.put_u16_le(name_size);
        put_padded(&mut body, intro.name.as_bytes());
        Ok(self.frame(RecordType::ExtIntro, &body))
    }

    /// Resets an extension to a new epoch.
    pub fn ext_reset(&mut self, ext_id: u32, new_reset_id: u32, preserve_data: bool) -> &mut Self {
        let mut body = BytesMut::with_capacity(12);
        body.put_u32_le(ext_id);
        body.put_u32_le(new_reset_id);
        body.put_u8(u8::from(preserve_data));
        body.put_bytes(0, 3);
        self.frame(RecordType::ExtReset, &body)
    }

    /// Writes `data` at `offset` in an extension header.
    ///
    /// Uses the compact 16-bit form when offset and size fit.
    pub fn ext_hdr_update(&mut self, ext_id: u32, offset: u32, data: &[u8]) -> &mut Self {
        let mut body = BytesMut::with_capacity(12 + pad4(data.len()));
        body.put_u32_le(ext_id);
        match (u16::try_from(offset), u16::try_from(data.len())) {
            (Ok(offset), Ok(size)) => {
                body.put_u16_le(offset);
                body.put_u16_le(size);
                put_padded(&mut body, data);
                self.frame(RecordType::ExtHdrUpdate, &body)
            }
            _ => {
                body.put_u32_le(offset);
                body.put_u32_le(u32::try_from(data.len()).unwrap_or(u32::MAX));
                put_padded(&mut body, data);
                self.frame(RecordType::ExtHdrUpdate32, &body)
            }
        }
    }

    /// Writes `data` at `offset` inside one message's extension record.
    pub fn ext_rec_update(&mut self, ext_id: u32, uid: u32, offset: u16, data: &[u8]) -> &mut Self {
        let size = u16::try_from(data.len()).unwrap_or(u16::MAX);
        let mut body = BytesMut::with_capacity(12 + pad4(data.len()));
        body.put_u32_le(ext_id);
        body.put_u32_le(uid);
        body.put_u16_le(offset);
        body.put_u16_le(size);
        put_padded(&mut body, &data[..usize::from(size)]);
        self.frame(RecordType::ExtRecUpdate, &body)
    }

    /// Adds `diff` to a message's counter in the given reset epoch.
    pub fn ext_atomic_inc(&mut self, ext_id: u32, reset_id: u32, uid: u32, diff: i32) -> &mut Self {
        let mut body = BytesMut::with_capacity(16);
        body.put_u32_le(ext_id);
        body.put_u32_le(reset_id);
        body.put_u32_le(uid);
        body.put_i32_le(diff);
        self.frame(RecordType::ExtAtomicInc, &body)
    }

    /// Adds or removes a keyword over a UID range.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NameTooLong`] if the name doesn't fit the record.
    pub fn keyword_update(
        &mut self,
        modify: KeywordModify,
        name: &str,
        uid1: u32,
        uid2: u32,
    ) -> Result<&mut Self, LogError> {
        let name_size = name_len(name)?;
        let mut body = BytesMut::with_capacity(12 + pad4(name.len()));
        body.put_u8(modify.as_u8());
        body.put_u8(0);
        body.put_u16_le(name_size);
        put_padded(&mut body, name.as_bytes());
        body.put_u32_le(uid1);
        body.put_u32_le(uid2);
        Ok(self.frame(RecordType::KeywordUpdate, &body))
    }

    /// Clears every keyword over a UID range.
    pub fn keyword_reset(&mut self, uid1: u32, uid2: u32) -> &mut Self {
        self.uid_ranges(RecordType::KeywordReset, &[(uid1, uid2)])
    }

    /// Marks the index deleted.
    pub fn index_deleted(&mut self) -> &mut Self {
        self.frame(RecordType::IndexDeleted, &BytesMut::new())
    }

    /// Clears the index deleted mark.
    pub fn index_undeleted(&mut self) -> &mut Self {
        self.frame(RecordType::IndexUndeleted, &BytesMut::new())
    }

    fn uid_ranges(&mut self, kind: RecordType, ranges: &[(u32, u32)]) -> &mut Self {
        let mut body = BytesMut::with_capacity(ranges.len() * 8);
        for (uid1, uid2) in ranges {
            body.put_u32_le(*uid1);
            body.put_u32_le(*uid2);
        }
        self.frame(kind, &body)
    }

    /// Returns the written frames.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// Returns a readable log over the written frames.
    #[must_use]
    pub fn into_log(self) -> MemoryLog {
        let start = LogPosition::new(self.file_seq, self.base_offset);
        MemoryLog::starting_at(start, self.buf.freeze())
    }
}

fn name_len(name: &str) -> Result<u16, LogError> {
    u16::try_from(name.len()).map_err(|_| LogError::NameTooLong { len: name.len() })
}

fn put_padded(buf: &mut BytesMut, data: &[u8]) {
    buf.put_slice(data);
    buf.put_bytes(0, pad4(data.len()) - data.len());
}
