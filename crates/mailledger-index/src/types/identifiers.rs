//! Core index identifiers.
//!
//! Types for sequence numbers, UIDs, UIDVALIDITY and transaction log positions.

use std::num::{NonZeroU32, NonZeroU64};

/// Message sequence number.
///
/// Sequence numbers are assigned to messages in a mailbox starting from 1.
/// They are ephemeral and change when messages are expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Creates a sequence number from a zero-based record index.
    #[must_use]
    pub fn from_index(idx: usize) -> Option<Self> {
        u32::try_from(idx)
            .ok()
            .and_then(|n| n.checked_add(1))
            .and_then(Self::new)
    }

    /// Returns the zero-based record index for this sequence number.
    #[must_use]
    pub fn index(self) -> usize {
        (self.get() - 1) as usize
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// UIDs are persistent identifiers that don't change when messages are expunged.
/// Combined with `UIDVALIDITY`, they uniquely identify a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value for a mailbox.
///
/// If this value changes, all cached UIDs are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a new UIDVALIDITY.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Modification sequence number.
///
/// Every change to a message's flags, keywords or extension data is assigned
/// a new, higher modseq.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModSeq(NonZeroU64);

impl ModSeq {
    /// Creates a new `ModSeq` from a non-zero u64.
    #[must_use]
    pub const fn new(value: NonZeroU64) -> Self {
        Self(value)
    }

    /// Creates a new `ModSeq` from a u64, returning `None` if zero.
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ModSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record inside the transaction log.
///
/// Logs rotate into numbered files; within one file a record is addressed by
/// the byte offset of its frame. Positions order by file first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogPosition {
    /// Sequence number of the log file.
    pub file_seq: u32,
    /// Byte offset inside the log file.
    pub offset: u64,
}

impl LogPosition {
    /// Creates a new log position.
    #[must_use]
    pub const fn new(file_seq: u32, offset: u64) -> Self {
        Self { file_seq, offset }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_seq, self.offset)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::unreadable_literal,
    clippy::similar_names
)]
mod tests {
    use super::*;

    mod seq_num_tests {
        use super::*;

        #[test]
        fn new_zero_returns_none() {
            assert!(SeqNum::new(0).is_none());
        }

        #[test]
        fn index_round_trip() {
            let seq = SeqNum::from_index(0).unwrap();
            assert_eq!(seq.get(), 1);
            assert_eq!(seq.index(), 0);
            assert_eq!(SeqNum::from_index(41).unwrap().get(), 42);
        }

        #[test]
        fn from_index_overflow() {
            assert!(SeqNum::from_index(u32::MAX as usize).is_none());
        }
    }

    mod uid_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(Uid::new(100).unwrap().get(), 100);
        }

        #[test]
        fn ordering() {
            assert!(Uid::new(100).unwrap() < Uid::new(200).unwrap());
        }

        #[test]
        fn display() {
            assert_eq!(Uid::new(12345).unwrap().to_string(), "12345");
        }
    }

    mod modseq_tests {
        use super::*;

        #[test]
        fn zero_is_rejected() {
            assert!(ModSeq::from_u64(0).is_none());
            assert_eq!(ModSeq::from_u64(7).unwrap().get(), 7);
        }
    }

    mod log_position_tests {
        use super::*;

        #[test]
        fn orders_by_file_then_offset() {
            let a = LogPosition::new(1, 900);
            let b = LogPosition::new(2, 0);
            let c = LogPosition::new(2, 24);
            assert!(a < b);
            assert!(b < c);
        }

        #[test]
        fn display() {
            assert_eq!(LogPosition::new(3, 128).to_string(), "3:128");
        }
    }

    #[test]
    fn uid_validity_equality() {
        let uv1 = UidValidity::new(123).unwrap();
        let uv2 = UidValidity::new(123).unwrap();
        let uv3 = UidValidity::new(456).unwrap();
        assert_eq!(uv1, uv2);
        assert_ne!(uv1, uv3);
    }
}
