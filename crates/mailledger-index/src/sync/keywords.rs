//! Keyword record handlers.
//!
//! Keyword bits live in the internal keywords extension. When a new keyword
//! index no longer fits the bitmap, the extension is grown through an
//! internal introduction, which migrates every message's bitmap.

use crate::error::Result;
use crate::log::record::{EXT_ID_BY_NAME, ExtIntro, KeywordModify, KeywordUpdate};
use crate::map::KEYWORDS_EXT_NAME;
use crate::map::keywords::{bitmap_size_for, is_valid_keyword};
use crate::types::{IdRange, SeqNum};

use super::SyncMapContext;

impl SyncMapContext<'_> {
    pub(crate) fn sync_keyword_update(&mut self, update: &KeywordUpdate) -> Result<()> {
        if !is_valid_keyword(&update.name) {
            return Err(self.set_corrupted(format!(
                "Keyword update with invalid keyword name {:?}",
                update.name
            )));
        }

        let idx = match (self.map.keywords().lookup(&update.name), update.modify) {
            (Some(idx), _) => idx,
            // Nothing can have a keyword that was never added.
            (None, KeywordModify::Remove) => return Ok(()),
            (None, KeywordModify::Add) => {
                if self.map.keywords().len() >= self.config.max_keywords {
                    return Err(self.set_corrupted(format!(
                        "Too many keywords (limit {})",
                        self.config.max_keywords
                    )));
                }
                let map = Self::privatize(&mut self.map, &mut self.copied)?;
                map.keywords_mut().register(&update.name)
            }
        };
        let ext_id = self.ensure_keyword_bitmap(idx)?;

        let add = update.modify == KeywordModify::Add;
        let (byte, mask) = (idx / 8, 1u8 << (idx % 8));
        for range in &update.uids {
            for rec_idx in self.map.uid_range_indexes(*range) {
                let Some(old) = self.map.ext_slot(rec_idx, ext_id).and_then(|bitmap| bitmap.get(byte).copied())
                else {
                    continue;
                };
                let new = if add { old | mask } else { old & !mask };
                if old == new {
                    continue;
                }
                let map = Self::privatize(&mut self.map, &mut self.copied)?;
                if let Some(slot) = map.ext_slot_mut(rec_idx, ext_id) {
                    slot[byte] = new;
                }
                if let Some(seq) = SeqNum::from_index(rec_idx) {
                    self.modseq.keywords_changed(seq);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn sync_keyword_reset(&mut self, ranges: &[IdRange]) -> Result<()> {
        let Some(ext_id) = self.map.ext_id(KEYWORDS_EXT_NAME) else {
            return Ok(());
        };
        for range in ranges {
            for rec_idx in self.map.uid_range_indexes(*range) {
                let has_keywords = self
                    .map
                    .ext_slot(rec_idx, ext_id)
                    .is_some_and(|bitmap| bitmap.iter().any(|b| *b != 0));
                if !has_keywords {
                    continue;
                }
                let map = Self::privatize(&mut self.map, &mut self.copied)?;
                if let Some(slot) = map.ext_slot_mut(rec_idx, ext_id) {
                    slot.fill(0);
                }
                if let Some(seq) = SeqNum::from_index(rec_idx) {
                    self.modseq.keywords_changed(seq);
                }
            }
        }
        Ok(())
    }

    /// Makes sure the keyword bitmap can hold keyword index `idx` and
    /// returns the keywords extension id.
    fn ensure_keyword_bitmap(&mut self, idx: usize) -> Result<u32> {
        let needed = bitmap_size_for(idx);
        let existing = self.map.ext_id(KEYWORDS_EXT_NAME).and_then(|id| {
            self.map
                .extensions()
                .get(id)
                .map(|ext| (id, ext.reset_id(), ext.hdr_size(), ext.record_size(), ext.record_align()))
        });
        if let Some((id, _, _, size, _)) = existing {
            if usize::from(size) >= needed {
                return Ok(id);
            }
        }

        let Ok(record_size) = u16::try_from(needed) else {
            return Err(self.set_corrupted(format!("Keyword bitmap of {needed} bytes is too large")));
        };
        let intro = match existing {
            Some((id, reset_id, hdr_size, _, align)) => ExtIntro {
                ext_id: id,
                reset_id,
                hdr_size,
                record_size,
                record_align: if record_size % align == 0 { align } else { 1 },
                flags: 0,
                name: KEYWORDS_EXT_NAME.to_string(),
            },
            None => ExtIntro {
                ext_id: EXT_ID_BY_NAME,
                reset_id: 0,
                hdr_size: 0,
                record_size,
                record_align: 1,
                flags: 0,
                name: KEYWORDS_EXT_NAME.to_string(),
            },
        };

        tracing::trace!(keywords = idx + 1, bytes = needed, "growing keyword bitmap");
        self.internal_update = true;
        let result = self.sync_ext_intro(&intro);
        self.internal_update = false;
        result?;

        match self.map.ext_id(KEYWORDS_EXT_NAME) {
            Some(id) => Ok(id),
            None => Err(self.set_corrupted("Keyword extension missing after introduction")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use crate::config::{SyncConfig, SyncHandlerType};
    use crate::log::LogWriter;
    use crate::log::record::KeywordModify;
    use crate::map::{IndexMap, KEYWORDS_EXT_NAME};
    use crate::sync::modseq::{Change, ModseqCounter};
    use crate::sync::provider::NoExtensions;
    use crate::sync::{SyncEnv, SyncOutcome, sync_map};
    use crate::types::{MailFlags, SeqNum};

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn replay_with(
        config: &SyncConfig,
        writer: LogWriter,
        modseq: &mut ModseqCounter,
    ) -> crate::Result<SyncOutcome> {
        let mut log = writer.into_log();
        sync_map(
            Arc::new(IndexMap::new(1)),
            &mut log,
            SyncHandlerType::Head,
            SyncEnv {
                config,
                provider: &NoExtensions,
                modseq,
            },
        )
    }

    fn replay(writer: LogWriter) -> crate::Result<SyncOutcome> {
        let config = SyncConfig::builder().verify_after_sync(true).build();
        replay_with(&config, writer, &mut ModseqCounter::default())
    }

    fn three_messages() -> LogWriter {
        let mut writer = LogWriter::new(1);
        writer.appends(&[(1, MailFlags::EMPTY), (2, MailFlags::EMPTY), (3, MailFlags::EMPTY)]);
        writer
    }

    #[test]
    fn add_and_remove() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Add, "$Junk", 1, 3)
            .unwrap()
            .keyword_update(KeywordModify::Remove, "$Junk", 2, 2)
            .unwrap();
        let map = replay(writer).unwrap().map;
        assert!(map.has_keyword(seq(1), "$Junk"));
        assert!(!map.has_keyword(seq(2), "$Junk"));
        assert_eq!(map.message_keywords(seq(3)), vec!["$Junk"]);
        let ext = map.extensions().get(map.ext_id(KEYWORDS_EXT_NAME).unwrap()).unwrap();
        assert_eq!(ext.record_size(), 4);
    }

    #[test]
    fn remove_unknown_keyword_is_noop() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Remove, "$Never", 1, 3)
            .unwrap();
        let map = replay(writer).unwrap().map;
        assert!(map.keywords().is_empty());
        assert!(map.ext_id(KEYWORDS_EXT_NAME).is_none());
    }

    #[test]
    fn bitmap_grows_and_keeps_bits() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Add, "k0", 2, 2)
            .unwrap();
        for i in 1..40 {
            writer
                .keyword_update(KeywordModify::Add, &format!("k{i}"), 3, 3)
                .unwrap();
        }
        let map = replay(writer).unwrap().map;
        let ext = map.extensions().get(map.ext_id(KEYWORDS_EXT_NAME).unwrap()).unwrap();
        assert_eq!(ext.record_size(), 8);
        assert_eq!(map.message_keywords(seq(2)), vec!["k0"]);
        assert_eq!(map.message_keywords(seq(3)).len(), 39);
        assert!(map.has_keyword(seq(3), "k39"));
    }

    #[test]
    fn reset_is_range_bounded() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Add, "$Work", 1, 3)
            .unwrap()
            .keyword_reset(2, 3);
        let mut modseq = ModseqCounter::default();
        let config = SyncConfig::default();
        let map = replay_with(&config, writer, &mut modseq).unwrap().map;
        assert!(map.has_keyword(seq(1), "$Work"));
        assert!(map.message_keywords(seq(2)).is_empty());
        assert!(map.message_keywords(seq(3)).is_empty());
        // the name keeps its index
        assert_eq!(map.keywords().lookup("$Work"), Some(0));
        let keyword_changes = modseq
            .changes()
            .iter()
            .filter(|(_, change, _)| *change == Change::Keywords)
            .count();
        assert_eq!(keyword_changes, 5);
    }

    #[test]
    fn keyword_limit() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Add, "a", 1, 1)
            .unwrap()
            .keyword_update(KeywordModify::Add, "b", 1, 1)
            .unwrap();
        let config = SyncConfig::builder().max_keywords(1).build();
        let err = replay_with(&config, writer, &mut ModseqCounter::default()).unwrap_err();
        assert!(err.reason().unwrap().contains("Too many keywords"));
    }

    #[test]
    fn invalid_name_is_corruption() {
        let mut writer = three_messages();
        writer
            .keyword_update(KeywordModify::Add, "bad name", 1, 1)
            .unwrap();
        let err = replay(writer).unwrap_err();
        assert!(err.reason().unwrap().contains("invalid keyword name"));
    }
}
