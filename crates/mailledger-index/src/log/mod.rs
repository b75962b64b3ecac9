//! Transaction log access.
//!
//! The sync engine reads the log strictly in position order through the
//! [`LogSource`] trait. How the log is stored and delivered is up to the
//! implementation; [`MemoryLog`] serves frames out of a byte buffer and
//! [`LogWriter`] produces them.
//!
//! ## Frame layout
//!
//! ```text
//! ┌────────────┬────────────┬──────────────────────────┐
//! │ type (u32) │ size (u32) │ payload (size bytes)     │
//! └────────────┴────────────┴──────────────────────────┘
//! ```
//!
//! Integers are little-endian. A record's position is the offset of its
//! frame header.

pub mod record;
mod writer;

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::types::LogPosition;

pub use record::{DecodeError, Record, RecordType};
pub use writer::{ExtIntroSpec, LogWriter, MAX_NAME_LEN};

/// Size of the `{type, size}` frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Errors raised by log sources and writers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// The requested position is not inside the available log.
    #[error("Log position {position} is outside the available log ({first}..{end})")]
    PositionOutOfRange {
        /// Requested position.
        position: LogPosition,
        /// First available position.
        first: LogPosition,
        /// End of available data.
        end: LogPosition,
    },

    /// A frame claims more bytes than a sealed log holds.
    #[error("Truncated record at {position}: needs {needed} bytes, {available} available")]
    Truncated {
        /// Frame position.
        position: LogPosition,
        /// Bytes the frame claims.
        needed: usize,
        /// Bytes left in the log.
        available: usize,
    },

    /// Name too long to encode.
    #[error("Name of {len} bytes is too long for a log record")]
    NameTooLong {
        /// Name length in bytes.
        len: usize,
    },
}

/// One undecoded record as read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Position of the frame.
    pub position: LogPosition,
    /// Record type tag.
    pub tag: u32,
    /// Record payload.
    pub payload: Bytes,
}

impl RawRecord {
    /// Position right after this record's frame.
    #[must_use]
    pub fn end_position(&self) -> LogPosition {
        LogPosition::new(
            self.position.file_seq,
            self.position.offset + (FRAME_HEADER_SIZE + self.payload.len()) as u64,
        )
    }

    /// Decodes the payload according to the tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed payloads and for unknown tags
    /// outside the ignorable range.
    pub fn decode(&self) -> Result<Record, DecodeError> {
        let kind = RecordType::from_tag(self.tag).ok_or(DecodeError::UnknownType(self.tag))?;
        Record::decode(kind, &self.payload)
    }
}

/// Ordered, byte-addressable source of transaction log records.
pub trait LogSource {
    /// First position still available in the log.
    fn first_position(&self) -> LogPosition;

    /// Position of the next record to be read.
    fn position(&self) -> LogPosition;

    /// Moves the read cursor to `position`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::PositionOutOfRange`] if the position isn't
    /// available.
    fn seek(&mut self, position: LogPosition) -> Result<(), LogError>;

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at the end of the available data, which is not an
    /// error: more records may be appended later. A frame that is only partly
    /// written also ends the available data; the position stays at its start.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Truncated`] if a frame is cut short in a log that
    /// won't grow any more.
    fn next_record(&mut self) -> Result<Option<RawRecord>, LogError>;
}

/// A single log file held in memory.
///
/// The buffer is treated as a snapshot of a log that may still be growing,
/// so a partial frame at the end is left for a later pass. Call
/// [`MemoryLog::sealed`] when the data is known to be complete.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    data: Bytes,
    start: LogPosition,
    cursor: usize,
    sealed: bool,
}

impl MemoryLog {
    /// Creates a log for file 1 whose data starts at offset 0.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self::starting_at(LogPosition::new(1, 0), data)
    }

    /// Creates a log whose first byte lives at `start`.
    ///
    /// Use a non-zero start offset for logs whose head has been truncated.
    #[must_use]
    pub fn starting_at(start: LogPosition, data: Bytes) -> Self {
        Self {
            data,
            start,
            cursor: 0,
            sealed: false,
        }
    }

    /// Marks the data as final: a partial frame at the end becomes
    /// [`LogError::Truncated`] instead of the end of the log.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Returns true if the log won't grow any more.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Bytes after the read cursor that haven't been returned as records.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Position right after the last byte.
    #[must_use]
    pub fn end_position(&self) -> LogPosition {
        LogPosition::new(self.start.file_seq, self.start.offset + self.data.len() as u64)
    }

    /// Raw bytes of the log.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }
}

impl MemoryLog {
    fn partial_frame(
        &self,
        position: LogPosition,
        needed: usize,
        available: usize,
    ) -> Result<Option<RawRecord>, LogError> {
        if self.sealed {
            return Err(LogError::Truncated {
                position,
                needed,
                available,
            });
        }
        tracing::trace!(%position, needed, available, "partial frame at end of log");
        Ok(None)
    }
}

impl LogSource for MemoryLog {
    fn first_position(&self) -> LogPosition {
        self.start
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.start.file_seq, self.start.offset + self.cursor as u64)
    }

    fn seek(&mut self, position: LogPosition) -> Result<(), LogError> {
        let end = self.end_position();
        if position < self.start || position > end {
            return Err(LogError::PositionOutOfRange {
                position,
                first: self.start,
                end,
            });
        }
        // Same file as `start`, so the offset difference fits the buffer.
        self.cursor = usize::try_from(position.offset - self.start.offset).unwrap_or(self.data.len());
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>, LogError> {
        let available = self.data.len() - self.cursor;
        if available == 0 {
            return Ok(None);
        }
        let position = self.position();
        if available < FRAME_HEADER_SIZE {
            return self.partial_frame(position, FRAME_HEADER_SIZE, available);
        }

        let mut header = &self.data[self.cursor..self.cursor + FRAME_HEADER_SIZE];
        let tag = header.get_u32_le();
        let size = header.get_u32_le() as usize;
        let needed = FRAME_HEADER_SIZE.saturating_add(size);
        if needed > available {
            return self.partial_frame(position, needed, available);
        }

        let start = self.cursor + FRAME_HEADER_SIZE;
        let payload = self.data.slice(start..start + size);
        self.cursor = start + size;
        Ok(Some(RawRecord {
            position,
            tag,
            payload,
        }))
    }
}
