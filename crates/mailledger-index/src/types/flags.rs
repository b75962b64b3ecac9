//! Message flags as stored in index records.

/// A single system flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message has been read.
    Seen,
    /// Message is a draft.
    Draft,
    /// Record changed locally and hasn't been written to the backend yet.
    Dirty,
}

impl Flag {
    /// All flags in bit order.
    pub const ALL: [Self; 6] = [
        Self::Answered,
        Self::Flagged,
        Self::Deleted,
        Self::Seen,
        Self::Draft,
        Self::Dirty,
    ];

    /// Returns the record bit for this flag.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Answered => 0x01,
            Self::Flagged => 0x02,
            Self::Deleted => 0x04,
            Self::Seen => 0x08,
            Self::Draft => 0x10,
            Self::Dirty => 0x80,
        }
    }

    /// Parses an IMAP system flag name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "\\ANSWERED" => Some(Self::Answered),
            "\\FLAGGED" => Some(Self::Flagged),
            "\\DELETED" => Some(Self::Deleted),
            "\\SEEN" => Some(Self::Seen),
            "\\DRAFT" => Some(Self::Draft),
            _ => None,
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Seen => "\\Seen",
            Self::Draft => "\\Draft",
            Self::Dirty => "$Dirty",
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flag bits of one message record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MailFlags(u8);

impl MailFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);

    /// Bits that are defined in the record format.
    pub const MASK: u8 = 0x9f;

    /// Creates flags from raw record bits, dropping undefined bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub const fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Sets a flag.
    pub fn insert(&mut self, flag: Flag) {
        self.0 |= flag.bit();
    }

    /// Clears a flag.
    pub fn remove(&mut self, flag: Flag) {
        self.0 &= !flag.bit();
    }

    /// Applies add and remove masks, returning the new flags.
    #[must_use]
    pub const fn apply(self, add: u8, remove: u8) -> Self {
        Self::from_bits_truncate((self.0 & !remove) | add)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub const fn is_seen(self) -> bool {
        self.contains(Flag::Seen)
    }

    /// Returns true if the message is marked for deletion.
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        self.contains(Flag::Deleted)
    }

    /// Returns true if no flags are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns an iterator over the set flags.
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<Flag> for MailFlags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::EMPTY;
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}
