//! Keyword name table.
//!
//! Keyword names map to dense indexes, which select bits in each message's
//! keyword bitmap. Indexes are never reused within a map.

use std::collections::HashMap;

/// Name of the internal extension holding per-message keyword bitmaps.
pub const KEYWORDS_EXT_NAME: &str = "keywords";

/// Longest accepted keyword name in bytes.
pub const MAX_KEYWORD_LEN: usize = 255;

/// Returns true if `name` is a valid keyword name.
///
/// Names are non-empty, at most [`MAX_KEYWORD_LEN`] bytes and contain no
/// whitespace or control characters.
#[must_use]
pub fn is_valid_keyword(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_KEYWORD_LEN
        && !name.chars().any(|c| c.is_control() || c.is_whitespace())
}

/// Bitmap bytes needed to hold keyword index `idx`, rounded up to 4.
#[must_use]
pub const fn bitmap_size_for(idx: usize) -> usize {
    (idx / 8 + 1).next_multiple_of(4)
}

/// Append-only keyword name table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl KeywordTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered keywords.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no keyword has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of `name`, if registered.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Name registered at `idx`.
    #[must_use]
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// Registered names in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Registers `name` and returns its index; returns the existing index
    /// if the name is known.
    pub(crate) fn register(&mut self, name: &str) -> usize {
        if let Some(idx) = self.lookup(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), idx);
        idx
    }
}
