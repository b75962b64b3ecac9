//! Extension registry.
//!
//! Each index map carries a registry describing the extensions whose data it
//! stores: a header blob per extension and a slot inside every message's
//! extension record. Slots are laid out in registration order, each aligned
//! to its extension's record alignment.

use std::collections::HashMap;

use crate::types::LogPosition;

/// Longest accepted extension name in bytes.
pub const MAX_EXT_NAME_LEN: usize = 64;

/// Returns true if `name` is a valid extension name.
///
/// Names are non-empty ASCII made of letters, digits, `-`, `_` and `.`.
#[must_use]
pub fn is_valid_ext_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_EXT_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Lifecycle of an extension within a map.
///
/// Extensions that were never introduced have no registry entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtensionState {
    /// Registered by an introduction; no data written yet.
    Introduced,
    /// Re-introduced with a larger layout; existing slots were migrated.
    Migrated,
    /// Data has been written since the last introduction.
    Active,
}

/// One registered extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub(crate) name: String,
    pub(crate) reset_id: u32,
    pub(crate) hdr_size: u32,
    pub(crate) record_size: u16,
    pub(crate) record_align: u16,
    pub(crate) record_offset: usize,
    pub(crate) intro_position: LogPosition,
    pub(crate) known: bool,
    pub(crate) state: ExtensionState,
    pub(crate) hdr_data: Vec<u8>,
}

impl Extension {
    /// Extension name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current reset epoch.
    #[must_use]
    pub const fn reset_id(&self) -> u32 {
        self.reset_id
    }

    /// Header size in bytes.
    #[must_use]
    pub const fn hdr_size(&self) -> u32 {
        self.hdr_size
    }

    /// Per-message record size in bytes.
    #[must_use]
    pub const fn record_size(&self) -> u16 {
        self.record_size
    }

    /// Per-message record alignment.
    #[must_use]
    pub const fn record_align(&self) -> u16 {
        self.record_align
    }

    /// Offset of this extension's slot inside a message's extension record.
    #[must_use]
    pub const fn record_offset(&self) -> usize {
        self.record_offset
    }

    /// Log position of the introduction that registered the current layout.
    #[must_use]
    pub const fn intro_position(&self) -> LogPosition {
        self.intro_position
    }

    /// Whether this build understands the extension's data.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.known
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ExtensionState {
        self.state
    }

    /// Header bytes.
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.hdr_data
    }

    /// Marks that data was written after the introduction.
    pub(crate) fn activate(&mut self) {
        self.state = ExtensionState::Active;
    }
}

/// Layout of a new registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionLayout {
    /// Extension name.
    pub name: String,
    /// Reset epoch.
    pub reset_id: u32,
    /// Header size in bytes.
    pub hdr_size: u32,
    /// Per-message record size in bytes.
    pub record_size: u16,
    /// Per-message record alignment (1, 2, 4 or 8).
    pub record_align: u16,
}

/// Slot placement of every extension, as computed by
/// [`ExtensionRegistry::compute_layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Slot offset per extension id.
    pub offsets: Vec<usize>,
    /// Slot size per extension id.
    pub sizes: Vec<usize>,
    /// Bytes per message.
    pub stride: usize,
}

/// Registry of the extensions stored in one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionRegistry {
    exts: Vec<Extension>,
    by_name: HashMap<String, u32>,
    stride: usize,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exts.len()
    }

    /// Returns true if no extension is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exts.is_empty()
    }

    /// Bytes of extension data per message.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the extension with the given id.
    #[must_use]
    pub fn get(&self, ext_id: u32) -> Option<&Extension> {
        self.exts.get(ext_id as usize)
    }

    pub(crate) fn get_mut(&mut self, ext_id: u32) -> Option<&mut Extension> {
        self.exts.get_mut(ext_id as usize)
    }

    /// Looks up an extension id by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Iterates over `(id, extension)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Extension)> {
        (0u32..).zip(self.exts.iter())
    }

    /// Adds an extension. The caller recomputes the layout and migrates
    /// existing records.
    pub(crate) fn register(
        &mut self,
        layout: ExtensionLayout,
        intro_position: LogPosition,
        known: bool,
    ) -> u32 {
        let ext_id = u32::try_from(self.exts.len()).unwrap_or(u32::MAX);
        self.by_name.insert(layout.name.clone(), ext_id);
        self.exts.push(Extension {
            hdr_data: vec![0; layout.hdr_size as usize],
            name: layout.name,
            reset_id: layout.reset_id,
            hdr_size: layout.hdr_size,
            record_size: layout.record_size,
            record_align: layout.record_align.max(1),
            record_offset: 0,
            intro_position,
            known,
            state: ExtensionState::Introduced,
        });
        ext_id
    }

    /// Computes slot offsets and the per-message stride for the current
    /// record sizes.
    #[must_use]
    pub fn compute_layout(&self) -> RecordLayout {
        let mut offsets = Vec::with_capacity(self.exts.len());
        let mut sizes = Vec::with_capacity(self.exts.len());
        let mut offset = 0usize;
        let mut max_align = 1usize;
        for ext in &self.exts {
            let size = usize::from(ext.record_size);
            if size == 0 {
                offsets.push(0);
                sizes.push(0);
                continue;
            }
            let align = usize::from(ext.record_align.max(1));
            max_align = max_align.max(align);
            offset = offset.next_multiple_of(align);
            offsets.push(offset);
            sizes.push(size);
            offset += size;
        }
        RecordLayout {
            offsets,
            sizes,
            stride: offset.next_multiple_of(max_align),
        }
    }

    /// Stores a layout computed by [`Self::compute_layout`].
    pub(crate) fn apply_layout(&mut self, layout: &RecordLayout) {
        for (ext, offset) in self.exts.iter_mut().zip(&layout.offsets) {
            ext.record_offset = *offset;
        }
        self.stride = layout.stride;
    }
}
