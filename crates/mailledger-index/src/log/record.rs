//! Transaction log record types and payload decoding.
//!
//! Every record is a `{ type, size, payload }` frame. Payload fields are
//! little-endian and every variable-length part is padded to 4 bytes.

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::types::IdRange;

/// `ext_id` value in an introduction meaning "look the extension up by name".
pub const EXT_ID_BY_NAME: u32 = u32::MAX;

/// Record tags at or above this value may be skipped by readers that don't
/// understand them. Their bytes are preserved verbatim.
pub const IGNORABLE_TAG_MIN: u32 = 0x8000_0000;

/// Kind of a transaction log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Expunge UID ranges.
    Expunge,
    /// Append new message records.
    Append,
    /// Add/remove flags over UID ranges.
    FlagUpdate,
    /// Introduce (or re-introduce) an extension.
    ExtIntro,
    /// Reset an extension's data.
    ExtReset,
    /// Update an extension header (16-bit offsets).
    ExtHdrUpdate,
    /// Update bytes in per-message extension records.
    ExtRecUpdate,
    /// Add or remove a keyword over UID ranges.
    KeywordUpdate,
    /// Clear all keywords over UID ranges.
    KeywordReset,
    /// Atomically add deltas to per-message counters.
    ExtAtomicInc,
    /// Expunge single UIDs carrying their message GUID.
    ExpungeGuid,
    /// Update an extension header (32-bit offsets).
    ExtHdrUpdate32,
    /// Mark the index deleted.
    IndexDeleted,
    /// Clear the index deleted mark.
    IndexUndeleted,
    /// Unrecognized record in the ignorable tag range.
    Ignorable(u32),
}

impl RecordType {
    /// Parses a record tag. Returns `None` for unknown, non-ignorable tags.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0x0000_0001 => Self::Expunge,
            0x0000_0002 => Self::Append,
            0x0000_0004 => Self::FlagUpdate,
            0x0000_0040 => Self::ExtIntro,
            0x0000_0080 => Self::ExtReset,
            0x0000_0100 => Self::ExtHdrUpdate,
            0x0000_0200 => Self::ExtRecUpdate,
            0x0000_0400 => Self::KeywordUpdate,
            0x0000_0800 => Self::KeywordReset,
            0x0000_1000 => Self::ExtAtomicInc,
            0x0000_2000 => Self::ExpungeGuid,
            0x0001_0000 => Self::ExtHdrUpdate32,
            0x0002_0000 => Self::IndexDeleted,
            0x0004_0000 => Self::IndexUndeleted,
            t if t >= IGNORABLE_TAG_MIN => Self::Ignorable(t),
            _ => return None,
        })
    }

    /// Returns the wire tag of this record type.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::Expunge => 0x0000_0001,
            Self::Append => 0x0000_0002,
            Self::FlagUpdate => 0x0000_0004,
            Self::ExtIntro => 0x0000_0040,
            Self::ExtReset => 0x0000_0080,
            Self::ExtHdrUpdate => 0x0000_0100,
            Self::ExtRecUpdate => 0x0000_0200,
            Self::KeywordUpdate => 0x0000_0400,
            Self::KeywordReset => 0x0000_0800,
            Self::ExtAtomicInc => 0x0000_1000,
            Self::ExpungeGuid => 0x0000_2000,
            Self::ExtHdrUpdate32 => 0x0001_0000,
            Self::IndexDeleted => 0x0002_0000,
            Self::IndexUndeleted => 0x0004_0000,
            Self::Ignorable(tag) => tag,
        }
    }

    /// Minimum payload size for a well-formed record of this type.
    #[must_use]
    pub const fn min_size(self) -> usize {
        match self {
            Self::Expunge | Self::Append | Self::KeywordReset => 8,
            Self::FlagUpdate | Self::ExtReset | Self::ExtHdrUpdate32 => 12,
            Self::ExtIntro | Self::ExpungeGuid => 20,
            Self::KeywordUpdate => 4,
            Self::ExtHdrUpdate => 8,
            Self::ExtRecUpdate => 12,
            Self::ExtAtomicInc => 16,
            Self::IndexDeleted | Self::IndexUndeleted | Self::Ignorable(_) => 0,
        }
    }

    /// Size of one repeated payload element, for records made of a fixed
    /// size array.
    #[must_use]
    pub const fn unit_size(self) -> Option<usize> {
        match self {
            Self::Expunge | Self::Append | Self::KeywordReset => Some(8),
            Self::FlagUpdate => Some(12),
            Self::ExpungeGuid => Some(20),
            _ => None,
        }
    }

    /// Human-readable name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Expunge => "expunge",
            Self::Append => "append",
            Self::FlagUpdate => "flag update",
            Self::ExtIntro => "extension intro",
            Self::ExtReset => "extension reset",
            Self::ExtHdrUpdate | Self::ExtHdrUpdate32 => "extension header update",
            Self::ExtRecUpdate => "extension record update",
            Self::KeywordUpdate => "keyword update",
            Self::KeywordReset => "keyword reset",
            Self::ExtAtomicInc => "extension atomic increment",
            Self::ExpungeGuid => "expunge guid",
            Self::IndexDeleted => "index deleted",
            Self::IndexUndeleted => "index undeleted",
            Self::Ignorable(_) => "ignorable",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural problem found while decoding a record payload.
///
/// The display text is the corruption reason reported for the sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Tag outside the known and ignorable ranges.
    #[error("unknown record type {0:#x}")]
    UnknownType(u32),

    /// Payload shorter than the fixed part of the record.
    #[error("{kind} record too small (size {size} < {min})")]
    TooSmall {
        /// Record kind.
        kind: RecordType,
        /// Actual payload size.
        size: usize,
        /// Minimum payload size.
        min: usize,
    },

    /// Payload is not a whole number of elements.
    #[error("{kind} record size {size} is not a multiple of {unit}")]
    BadMultiple {
        /// Record kind.
        kind: RecordType,
        /// Actual payload size.
        size: usize,
        /// Element size.
        unit: usize,
    },

    /// UID range with `uid1 > uid2` or a zero UID.
    #[error("{kind} record has invalid UID range {uid1}..{uid2}")]
    InvalidUidRange {
        /// Record kind.
        kind: RecordType,
        /// First UID.
        uid1: u32,
        /// Last UID.
        uid2: u32,
    },

    /// A variable-length field runs past the end of the payload.
    #[error("{kind} record field {field} runs past the end of the record")]
    Overrun {
        /// Record kind.
        kind: RecordType,
        /// Name of the overrunning field.
        field: &'static str,
    },

    /// Name is not valid UTF-8.
    #[error("{kind} record has a name that is not valid UTF-8")]
    InvalidName {
        /// Record kind.
        kind: RecordType,
    },

    /// Unknown keyword modify type.
    #[error("keyword update has unknown modify type {0}")]
    UnknownKeywordModify(u8),

    /// Trailing bytes after the last element.
    #[error("{kind} record has {extra} trailing bytes")]
    Trailing {
        /// Record kind.
        kind: RecordType,
        /// Number of unparsed bytes.
        extra: usize,
    },
}

/// One appended message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendRecord {
    /// UID of the new message.
    pub uid: u32,
    /// Initial flag bits.
    pub flags: u8,
}

/// One flag update over a UID range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagUpdate {
    /// UIDs the update applies to.
    pub uids: IdRange,
    /// Flag bits to set.
    pub add_flags: u8,
    /// Flag bits to clear.
    pub remove_flags: u8,
    /// Force a modseq change even if no flag changes.
    pub modseq_inc: bool,
}

/// One extension introduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtIntro {
    /// Registry id, or [`EXT_ID_BY_NAME`].
    pub ext_id: u32,
    /// Reset epoch the writer saw.
    pub reset_id: u32,
    /// Header size in bytes.
    pub hdr_size: u32,
    /// Per-message record size in bytes.
    pub record_size: u16,
    /// Per-message record alignment.
    pub record_align: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// Extension name; may be empty when `ext_id` is given.
    pub name: String,
}

/// Extension reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtReset {
    /// Registry id.
    pub ext_id: u32,
    /// New reset epoch.
    pub new_reset_id: u32,
    /// Keep existing data instead of zeroing it.
    pub preserve_data: bool,
}

/// Extension header update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtHdrUpdate {
    /// Registry id.
    pub ext_id: u32,
    /// Byte offset inside the header.
    pub offset: u32,
    /// Bytes to write.
    pub data: Bytes,
}

/// One per-message extension record update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtRecUpdate {
    /// UID of the message.
    pub uid: u32,
    /// Byte offset inside the extension's record.
    pub offset: u16,
    /// Bytes to write.
    pub data: Bytes,
}

/// One atomic counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtAtomicInc {
    /// UID of the message.
    pub uid: u32,
    /// Signed delta to add.
    pub diff: i32,
}

/// Whether a keyword update adds or removes the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordModify {
    /// Set the keyword.
    Add,
    /// Clear the keyword.
    Remove,
}

impl KeywordModify {
    /// Wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Add => 1,
            Self::Remove => 2,
        }
    }
}

/// Keyword update over UID ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordUpdate {
    /// Add or remove.
    pub modify: KeywordModify,
    /// Keyword name.
    pub name: String,
    /// UIDs the update applies to.
    pub uids: Vec<IdRange>,
}

/// Expunge of one UID with its message GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpungeGuid {
    /// UID of the message.
    pub uid: u32,
    /// 128-bit message GUID.
    pub guid: [u8; 16],
}

/// A decoded transaction log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Expunge UID ranges.
    Expunge(Vec<IdRange>),
    /// Expunge single UIDs with GUIDs.
    ExpungeGuid(Vec<ExpungeGuid>),
    /// Append messages.
    Append(Vec<AppendRecord>),
    /// Flag updates.
    FlagUpdate(Vec<FlagUpdate>),
    /// Extension introductions.
    ExtIntro(Vec<ExtIntro>),
    /// Extension reset.
    ExtReset(ExtReset),
    /// Extension header update.
    ExtHdrUpdate(ExtHdrUpdate),
    /// Extension record updates.
    ExtRecUpdate {
        /// Registry id.
        ext_id: u32,
        /// Updates in log order.
        updates: Vec<ExtRecUpdate>,
    },
    /// Extension atomic increments.
    ExtAtomicInc {
        /// Registry id.
        ext_id: u32,
        /// Reset epoch the increments belong to.
        reset_id: u32,
        /// Increments in log order.
        incs: Vec<ExtAtomicInc>,
    },
    /// Keyword update.
    KeywordUpdate(KeywordUpdate),
    /// Keyword reset over UID ranges.
    KeywordReset(Vec<IdRange>),
    /// Index marked deleted.
    IndexDeleted,
    /// Index deleted mark cleared.
    IndexUndeleted,
    /// Unrecognized ignorable record, kept verbatim.
    Unknown {
        /// Wire tag.
        tag: u32,
        /// Raw payload.
        payload: Bytes,
    },
}

/// Rounds `n` up to a multiple of 4.
#[must_use]
pub const fn pad4(n: usize) -> usize {
    (n + 3) & !3
}

impl Record {
    /// Decodes a record payload.
    ///
    /// The caller has already checked the payload against
    /// [`RecordType::min_size`] and 4-byte alignment.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing the first structural problem.
    pub fn decode(kind: RecordType, payload: &Bytes) -> Result<Self, DecodeError> {
        if payload.len() < kind.min_size() {
            return Err(DecodeError::TooSmall {
                kind,
                size: payload.len(),
                min: kind.min_size(),
            });
        }
        if let Some(unit) = kind.unit_size() {
            if payload.len() % unit != 0 {
                return Err(DecodeError::BadMultiple {
                    kind,
                    size: payload.len(),
                    unit,
                });
            }
        }

        let mut buf = payload.clone();
        let record = match kind {
            RecordType::Expunge => Self::Expunge(decode_uid_ranges(kind, &mut buf)?),
            RecordType::KeywordReset => Self::KeywordReset(decode_uid_ranges(kind, &mut buf)?),
            RecordType::Append => {
                let mut appends = Vec::with_capacity(buf.len() / 8);
                while buf.has_remaining() {
                    let uid = buf.get_u32_le();
                    let flags = buf.get_u32_le();
                    if uid == 0 {
                        return Err(DecodeError::InvalidUidRange {
                            kind,
                            uid1: 0,
                            uid2: 0,
                        });
                    }
                    appends.push(AppendRecord {
                        uid,
                        // Only the low byte carries record flags.
                        flags: (flags & 0xff) as u8,
                    });
                }
                Self::Append(appends)
            }
            RecordType::FlagUpdate => {
                let mut updates = Vec::with_capacity(buf.len() / 12);
                while buf.has_remaining() {
                    let uids = read_uid_range(kind, &mut buf)?;
                    let add_flags = buf.get_u8();
                    let remove_flags = buf.get_u8();
                    let modseq_inc = buf.get_u8() != 0;
                    buf.advance(1);
                    updates.push(FlagUpdate {
                        uids,
                        add_flags,
                        remove_flags,
                        modseq_inc,
                    });
                }
                Self::FlagUpdate(updates)
            }
            RecordType::ExpungeGuid => {
                let mut expunges = Vec::with_capacity(buf.len() / 20);
                while buf.has_remaining() {
                    let uid = buf.get_u32_le();
                    if uid == 0 {
                        return Err(DecodeError::InvalidUidRange {
                            kind,
                            uid1: 0,
                            uid2: 0,
                        });
                    }
                    let mut guid = [0u8; 16];
                    buf.copy_to_slice(&mut guid);
                    expunges.push(ExpungeGuid { uid, guid });
                }
                Self::ExpungeGuid(expunges)
            }
            RecordType::ExtIntro => {
                let mut intros = Vec::new();
                while buf.has_remaining() {
                    if buf.remaining() < 20 {
                        return Err(DecodeError::Trailing {
                            kind,
                            extra: buf.remaining(),
                        });
                    }
                    let ext_id = buf.get_u32_le();
                    let reset_id = buf.get_u32_le();
                    let hdr_size = buf.get_u32_le();
                    let record_size = buf.get_u16_le();
                    let record_align = buf.get_u16_le();
                    let flags = buf.get_u16_le();
                    let name_size = usize::from(buf.get_u16_le());
                    let name = read_name(kind, &mut buf, name_size)?;
                    intros.push(ExtIntro {
                        ext_id,
                        reset_id,
                        hdr_size,
                        record_size,
                        record_align,
                        flags,
                        name,
                    });
                }
                Self::ExtIntro(intros)
            }
            RecordType::ExtReset => {
                let ext_id = buf.get_u32_le();
                let new_reset_id = buf.get_u32_le();
                let preserve_data = buf.get_u8() != 0;
                Self::ExtReset(ExtReset {
                    ext_id,
                    new_reset_id,
                    preserve_data,
                })
            }
            RecordType::ExtHdrUpdate | RecordType::ExtHdrUpdate32 => {
                let ext_id = buf.get_u32_le();
                let (offset, size) = if kind == RecordType::ExtHdrUpdate {
                    (u32::from(buf.get_u16_le()), usize::from(buf.get_u16_le()))
                } else {
                    (buf.get_u32_le(), buf.get_u32_le() as usize)
                };
                let data = take_padded(kind, &mut buf, size, "data")?;
                Self::ExtHdrUpdate(ExtHdrUpdate {
                    ext_id,
                    offset,
                    data,
                })
            }
            RecordType::ExtRecUpdate => {
                let ext_id = buf.get_u32_le();
                let mut updates = Vec::new();
                while buf.has_remaining() {
                    if buf.remaining() < 8 {
                        return Err(DecodeError::Trailing {
                            kind,
                            extra: buf.remaining(),
                        });
                    }
                    let uid = buf.get_u32_le();
                    let offset = buf.get_u16_le();
                    let size = usize::from(buf.get_u16_le());
                    if uid == 0 {
                        return Err(DecodeError::InvalidUidRange {
                            kind,
                            uid1: 0,
                            uid2: 0,
                        });
                    }
                    let data = take_padded(kind, &mut buf, size, "data")?;
                    updates.push(ExtRecUpdate { uid, offset, data });
                }
                Self::ExtRecUpdate { ext_id, updates }
            }
            RecordType::ExtAtomicInc => {
                let ext_id = buf.get_u32_le();
                let reset_id = buf.get_u32_le();
                if buf.remaining() % 8 != 0 {
                    return Err(DecodeError::BadMultiple {
                        kind,
                        size: payload.len(),
                        unit: 8,
                    });
                }
                let mut incs = Vec::with_capacity(buf.remaining() / 8);
                while buf.has_remaining() {
                    let uid = buf.get_u32_le();
                    let diff = buf.get_i32_le();
                    if uid == 0 {
                        return Err(DecodeError::InvalidUidRange {
                            kind,
                            uid1: 0,
                            uid2: 0,
                        });
                    }
                    incs.push(ExtAtomicInc { uid, diff });
                }
                Self::ExtAtomicInc {
                    ext_id,
                    reset_id,
                    incs,
                }
            }
            RecordType::KeywordUpdate => {
                let modify = match buf.get_u8() {
                    1 => KeywordModify::Add,
                    2 => KeywordModify::Remove,
                    other => return Err(DecodeError::UnknownKeywordModify(other)),
                };
                buf.advance(1);
                let name_size = usize::from(buf.get_u16_le());
                let name = read_name(kind, &mut buf, name_size)?;
                if buf.remaining() % 8 != 0 {
                    return Err(DecodeError::BadMultiple {
                        kind,
                        size: payload.len(),
                        unit: 8,
                    });
                }
                let uids = decode_uid_ranges(kind, &mut buf)?;
                Self::KeywordUpdate(KeywordUpdate { modify, name, uids })
            }
            RecordType::IndexDeleted => Self::IndexDeleted,
            RecordType::IndexUndeleted => Self::IndexUndeleted,
            RecordType::Ignorable(tag) => {
                return Ok(Self::Unknown {
                    tag,
                    payload: payload.clone(),
                });
            }
        };
        Ok(record)
    }
}

fn read_uid_range(kind: RecordType, buf: &mut Bytes) -> Result<IdRange, DecodeError> {
    let uid1 = buf.get_u32_le();
    let uid2 = buf.get_u32_le();
    if uid1 == 0 {
        return Err(DecodeError::InvalidUidRange { kind, uid1, uid2 });
    }
    IdRange::new(uid1, uid2).ok_or(DecodeError::InvalidUidRange { kind, uid1, uid2 })
}

fn decode_uid_ranges(kind: RecordType, buf: &mut Bytes) -> Result<Vec<IdRange>, DecodeError> {
    let mut ranges = Vec::with_capacity(buf.remaining() / 8);
    while buf.remaining() >= 8 {
        ranges.push(read_uid_range(kind, buf)?);
    }
    if buf.has_remaining() {
        return Err(DecodeError::Trailing {
            kind,
            extra: buf.remaining(),
        });
    }
    Ok(ranges)
}

/// Splits `size` bytes off `buf` and skips the padding after them.
fn take_padded(
    kind: RecordType,
    buf: &mut Bytes,
    size: usize,
    field: &'static str,
) -> Result<Bytes, DecodeError> {
    let padded = pad4(size);
    if buf.remaining() < padded {
        return Err(DecodeError::Overrun { kind, field });
    }
    let data = buf.split_to(size);
    buf.advance(padded - size);
    Ok(data)
}

fn read_name(kind: RecordType, buf: &mut Bytes, size: usize) -> Result<String, DecodeError> {
    let raw = take_padded(kind, buf, size, "name")?;
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidName { kind })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn payload(words: &[u32]) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        for w in words {
            buf.put_u32_le(*w);
        }
        buf.freeze()
    }

    mod record_type_tests {
        use super::*;

        #[test]
        fn tag_round_trip() {
            for tag in [0x1, 0x2, 0x4, 0x40, 0x80, 0x100, 0x200, 0x400, 0x800, 0x1000, 0x2000] {
                assert_eq!(RecordType::from_tag(tag).unwrap().tag(), tag);
            }
        }

        #[test]
        fn unknown_low_tag_rejected() {
            assert!(RecordType::from_tag(0x8).is_none());
            assert!(RecordType::from_tag(0x0800_0000).is_none());
        }

        #[test]
        fn high_tags_are_ignorable() {
            assert_eq!(
                RecordType::from_tag(0x8000_0010),
                Some(RecordType::Ignorable(0x8000_0010))
            );
        }
    }

    mod decode_tests {
        use super::*;

        #[test]
        fn expunge_ranges() {
            let rec = Record::decode(RecordType::Expunge, &payload(&[1, 3, 7, 7])).unwrap();
            assert_eq!(
                rec,
                Record::Expunge(vec![IdRange::new(1, 3).unwrap(), IdRange::single(7)])
            );
        }

        #[test]
        fn inverted_range_is_error() {
            let err = Record::decode(RecordType::Expunge, &payload(&[5, 2])).unwrap_err();
            assert!(matches!(err, DecodeError::InvalidUidRange { uid1: 5, uid2: 2, .. }));
        }

        #[test]
        fn append_bad_multiple() {
            let err = Record::decode(RecordType::Append, &payload(&[1, 0, 2])).unwrap_err();
            assert!(matches!(err, DecodeError::BadMultiple { unit: 8, .. }));
        }

        #[test]
        fn too_small() {
            let err = Record::decode(RecordType::ExtAtomicInc, &payload(&[0, 0])).unwrap_err();
            assert_eq!(
                err.to_string(),
                "extension atomic increment record too small (size 8 < 16)"
            );
        }

        #[test]
        fn hdr_update_overrun() {
            // ext_id 0, offset 0, size 16 but only 4 data bytes follow
            let mut buf = bytes::BytesMut::new();
            buf.put_u32_le(0);
            buf.put_u16_le(0);
            buf.put_u16_le(16);
            buf.put_u32_le(0xdead_beef);
            let err = Record::decode(RecordType::ExtHdrUpdate, &buf.freeze()).unwrap_err();
            assert!(matches!(err, DecodeError::Overrun { field: "data", .. }));
        }

        #[test]
        fn keyword_unknown_modify() {
            let err = Record::decode(RecordType::KeywordUpdate, &payload(&[0x0000_0003])).unwrap_err();
            assert_eq!(err, DecodeError::UnknownKeywordModify(3));
        }

        #[test]
        fn ignorable_kept_verbatim() {
            let raw = payload(&[0xabcd, 0x1234]);
            let rec = Record::decode(RecordType::Ignorable(0x9000_0000), &raw).unwrap();
            assert_eq!(
                rec,
                Record::Unknown {
                    tag: 0x9000_0000,
                    payload: raw
                }
            );
        }
    }

    #[test]
    fn pad4_rounds_up() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 4);
        assert_eq!(pad4(4), 4);
        assert_eq!(pad4(5), 8);
    }
}
