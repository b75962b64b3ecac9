//! Extension record handlers.

use crate::error::{Error, Result};
use crate::log::record::{EXT_ID_BY_NAME, ExtAtomicInc, ExtHdrUpdate, ExtIntro, ExtRecUpdate, ExtReset};
use crate::map::{ExtensionLayout, ExtensionState, is_valid_ext_name};
use crate::types::Uid;

use super::{CurrentExt, SyncMapContext};

impl SyncMapContext<'_> {
    pub(crate) fn sync_ext_intro(&mut self, intro: &ExtIntro) -> Result<()> {
        let align = intro.record_align;
        if !matches!(align, 1 | 2 | 4 | 8) {
            return Err(self.set_corrupted(format!(
                "Extension record alignment {align} is not 1, 2, 4 or 8"
            )));
        }
        if intro.record_size % align != 0 {
            return Err(self.set_corrupted(format!(
                "Extension record size {} is not a multiple of alignment {align}",
                intro.record_size
            )));
        }
        if intro.hdr_size > self.config.max_ext_header_size {
            return Err(self.set_corrupted(format!(
                "Extension header size {} exceeds limit {}",
                intro.hdr_size, self.config.max_ext_header_size
            )));
        }
        if intro.record_size > self.config.max_ext_record_size {
            return Err(self.set_corrupted(format!(
                "Extension record size {} exceeds limit {}",
                intro.record_size, self.config.max_ext_record_size
            )));
        }

        let existing = if intro.ext_id == EXT_ID_BY_NAME {
            if !is_valid_ext_name(&intro.name) {
                return Err(self.set_corrupted(format!(
                    "Extension introduction with invalid name {:?}",
                    intro.name
                )));
            }
            self.map.ext_id(&intro.name)
        } else {
            let Some(ext) = self.map.extensions().get(intro.ext_id) else {
                return Err(self.set_corrupted(format!(
                    "Extension introduction for unknown extension id {}",
                    intro.ext_id
                )));
            };
            if !intro.name.is_empty() && intro.name != ext.name() {
                let reason = format!(
                    "Extension introduction for id {} has name {} but it is registered as {}",
                    intro.ext_id,
                    intro.name,
                    ext.name()
                );
                return Err(self.set_corrupted(reason));
            }
            Some(intro.ext_id)
        };

        match existing {
            Some(ext_id) => self.reintroduce_ext(ext_id, intro),
            None => self.register_ext(intro),
        }
    }

    fn register_ext(&mut self, intro: &ExtIntro) -> Result<()> {
        let known = self.internal_update || self.provider.is_known(&intro.name);
        let old_layout = self.map.extensions().compute_layout();
        let position = self.position;

        let map = Self::privatize(&mut self.map, &mut self.copied)?;
        let ext_id = map.extensions_mut().register(
            ExtensionLayout {
                name: intro.name.clone(),
                reset_id: intro.reset_id,
                hdr_size: intro.hdr_size,
                record_size: intro.record_size,
                record_align: intro.record_align,
            },
            position,
            known,
        );
        map.relayout(&old_layout)?;

        if !known && !self.unknown_extensions.contains(&ext_id) {
            self.unknown_extensions.push(ext_id);
            tracing::debug!(name = %intro.name, ext_id, "keeping data of unknown extension");
        }
        tracing::trace!(name = %intro.name, ext_id, record_size = intro.record_size, "extension registered");
        self.set_cur_ext(ext_id, false);
        Ok(())
    }

    fn reintroduce_ext(&mut self, ext_id: u32, intro: &ExtIntro) -> Result<()> {
        let Some(ext) = self.map.extensions().get(ext_id) else {
            return Err(self.set_corrupted(format!("Extension id {ext_id} vanished")));
        };
        let (name, reset_id, hdr_size, record_size, record_align) = (
            ext.name().to_string(),
            ext.reset_id(),
            ext.hdr_size(),
            ext.record_size(),
            ext.record_align(),
        );

        if intro.reset_id != reset_id {
            tracing::debug!(
                %name,
                intro_reset_id = intro.reset_id,
                reset_id,
                "ignoring updates for extension from another reset epoch"
            );
            self.set_cur_ext(ext_id, true);
            return Ok(());
        }
        if intro.hdr_size < hdr_size || intro.record_size < record_size {
            return Err(self.set_corrupted(format!(
                "Extension {name} shrunk (header {hdr_size} -> {}, record {record_size} -> {})",
                intro.hdr_size, intro.record_size
            )));
        }
        if intro.hdr_size == hdr_size
            && intro.record_size == record_size
            && intro.record_align == record_align
        {
            self.set_cur_ext(ext_id, false);
            return Ok(());
        }

        let old_layout = self.map.extensions().compute_layout();
        let position = self.position;
        let map = Self::privatize(&mut self.map, &mut self.copied)?;
        if let Some(ext) = map.extensions_mut().get_mut(ext_id) {
            let new_hdr_size = intro.hdr_size as usize;
            ext.hdr_data
                .try_reserve(new_hdr_size.saturating_sub(ext.hdr_data.len()))
                .map_err(|_| Error::OutOfMemory {
                    context: "growing an extension header",
                })?;
            ext.hdr_data.resize(new_hdr_size, 0);
            ext.hdr_size = intro.hdr_size;
            ext.record_size = intro.record_size;
            ext.record_align = intro.record_align;
            ext.intro_position = position;
            ext.state = ExtensionState::Migrated;
        }
        map.relayout(&old_layout)?;

        tracing::debug!(
            %name,
            hdr_size = intro.hdr_size,
            record_size = intro.record_size,
            "extension resized"
        );
        self.set_cur_ext(ext_id, false);
        Ok(())
    }

    fn set_cur_ext(&mut self, id: u32, ignore: bool) {
        if self.internal_update {
            return;
        }
        self.cur_ext = Some(CurrentExt {
            id,
            intro_end_position: self.record_end,
            ignore,
        });
    }

    /// Validates that `ext_id` names an extension introduced before the
    /// current record.
    fn checked_ext(&mut self, ext_id: u32, what: &str) -> Result<u32> {
        let Some(ext) = self.map.extensions().get(ext_id) else {
            return Err(self.set_corrupted(format!("{what} for unknown extension id {ext_id}")));
        };
        if ext.intro_position() >= self.position {
            let reason = format!(
                "{what} for extension {} before its introduction at {}",
                ext.name(),
                ext.intro_position()
            );
            return Err(self.set_corrupted(reason));
        }
        if let Some(cur) = self.cur_ext.filter(|cur| cur.id == ext_id) {
            if self.position < cur.intro_end_position {
                let reason = format!(
                    "{what} at {} overlaps the introduction of extension {} ending at {}",
                    self.position,
                    ext.name(),
                    cur.intro_end_position
                );
                return Err(self.set_corrupted(reason));
            }
        }
        Ok(ext_id)
    }

    /// Returns true if updates for `ext_id` are being skipped.
    fn ext_ignored(&self, ext_id: u32) -> bool {
        match self.cur_ext {
            Some(cur) if cur.id == ext_id && cur.ignore => {
                tracing::trace!(ext_id, intro_end = %cur.intro_end_position, "skipping update for ignored extension");
                true
            }
            _ => false,
        }
    }

    pub(crate) fn sync_ext_reset(&mut self, reset: &ExtReset) -> Result<()> {
        let ext_id = self.checked_ext(reset.ext_id, "Extension reset")?;
        if self.ext_ignored(ext_id) {
            return Ok(());
        }

        let map = Self::privatize(&mut self.map, &mut self.copied)?;
        if let Some(ext) = map.extensions_mut().get_mut(ext_id) {
            ext.reset_id = reset.new_reset_id;
            if !reset.preserve_data {
                ext.hdr_data.fill(0);
            }
        }
        if !reset.preserve_data {
            map.clear_ext_slots(ext_id);
        }
        tracing::debug!(ext_id, reset_id = reset.new_reset_id, preserve = reset.preserve_data, "extension reset");
        Ok(())
    }

    pub(crate) fn sync_ext_hdr_update(&mut self, update: &ExtHdrUpdate) -> Result<()> {
        let ext_id = self.checked_ext(update.ext_id, "Extension header update")?;
        if self.ext_ignored(ext_id) {
            return Ok(());
        }

        let hdr_size = self.map.extensions().get(ext_id).map_or(0, |ext| ext.hdr_size());
        let end = u64::from(update.offset) + update.data.len() as u64;
        if end > u64::from(hdr_size) {
            return Err(self.set_corrupted(format!(
                "Extension header update points outside header size (offset {} + size {} > {hdr_size})",
                update.offset,
                update.data.len()
            )));
        }

        let map = Self::privatize(&mut self.map, &mut self.copied)?;
        if let Some(ext) = map.extensions_mut().get_mut(ext_id) {
            let start = update.offset as usize;
            ext.hdr_data[start..start + update.data.len()].copy_from_slice(&update.data);
            ext.activate();
        }
        Ok(())
    }

    pub(crate) fn sync_ext_rec_updates(&mut self, ext_id: u32, updates: &[ExtRecUpdate]) -> Result<()> {
        let ext_id = self.checked_ext(ext_id, "Extension record update")?;
        if self.ext_ignored(ext_id) {
            return Ok(());
        }
        let record_size = self
            .map
            .extensions()
            .get(ext_id)
            .map_or(0, |ext| usize::from(ext.record_size()));

        for update in updates {
            let offset = usize::from(update.offset);
            if offset + update.data.len() > record_size {
                return Err(self.set_corrupted(format!(
                    "Extension record update outside record size (offset {offset} + size {} > {record_size})",
                    update.data.len()
                )));
            }
            let Some(seq) = Uid::new(update.uid).and_then(|uid| self.map.lookup_uid(uid)) else {
                continue;
            };

            let map = Self::privatize(&mut self.map, &mut self.copied)?;
            if let Some(slot) = map.ext_slot_mut(seq.index(), ext_id) {
                slot[offset..offset + update.data.len()].copy_from_slice(&update.data);
            }
            if let Some(ext) = map.extensions_mut().get_mut(ext_id) {
                ext.activate();
            }
            self.modseq.ext_changed(seq, ext_id);
        }
        Ok(())
    }

    pub(crate) fn sync_ext_atomic_incs(
        &mut self,
        ext_id: u32,
        reset_id: u32,
        incs: &[ExtAtomicInc],
    ) -> Result<()> {
        let ext_id = self.checked_ext(ext_id, "Extension atomic increment")?;
        let Some(ext) = self.map.extensions().get(ext_id) else {
            return Ok(());
        };
        let (name, cur_reset_id, record_size) =
            (ext.name().to_string(), ext.reset_id(), ext.record_size());

        if reset_id != cur_reset_id {
            return Err(self.set_corrupted(format!(
                "Extension {name} atomic increment for reset id {reset_id}, current is {cur_reset_id}"
            )));
        }
        if !matches!(record_size, 1 | 2 | 4 | 8) {
            return Err(self.set_corrupted(format!(
                "Extension {name} record size {record_size} can't be atomically incremented"
            )));
        }
        let max = if record_size == 8 {
            i128::from(u64::MAX)
        } else {
            (1i128 << (u32::from(record_size) * 8)) - 1
        };

        for inc in incs {
            let Some(seq) = Uid::new(inc.uid).and_then(|uid| self.map.lookup_uid(uid)) else {
                continue;
            };
            let orig = self.map.ext_slot(seq.index(), ext_id).map_or(0, read_le);
            let value = i128::from(orig) + i128::from(inc.diff);
            if value < 0 {
                return Err(self.set_corrupted(format!(
                    "Extension {name} record inc drops number below zero (uid={}, diff={}, orig={orig})",
                    inc.uid, inc.diff
                )));
            }
            if value > max {
                return Err(self.set_corrupted(format!(
                    "Extension {name} record inc overflows number (uid={}, diff={}, orig={orig})",
                    inc.uid, inc.diff
                )));
            }

            let map = Self::privatize(&mut self.map, &mut self.copied)?;
            if let Some(slot) = map.ext_slot_mut(seq.index(), ext_id) {
                write_le(slot, u64::try_from(value).unwrap_or(u64::MAX));
            }
            if let Some(ext) = map.extensions_mut().get_mut(ext_id) {
                ext.activate();
            }
            self.modseq.ext_changed(seq, ext_id);
        }
        Ok(())
    }
}

/// Reads a little-endian unsigned integer of `bytes.len()` bytes.
fn read_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Writes `value` little-endian into all of `bytes`.
fn write_le(bytes: &mut [u8], value: u64) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}
