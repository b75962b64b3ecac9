//! Shared index handle and reader views.
//!
//! An [`Index`] owns the published head map. Readers take a [`View`], which
//! pins the map that was current when the view was opened or last
//! refreshed. A sync pass builds the next map privately and publishes it
//! with a single atomic swap, so a view never sees a partially applied pass.
//!
//! # Example
//!
//! ```
//! use mailledger_index::{Index, IndexMap, LogWriter, MailFlags, NoopModseq};
//!
//! let index = Index::new(IndexMap::new(1));
//! let view = index.open_view();
//!
//! let mut writer = LogWriter::new(1);
//! writer.append(1, MailFlags::EMPTY);
//! let mut log = writer.into_log();
//! index.sync(&mut log, &mut NoopModseq)?;
//!
//! assert_eq!(view.map().messages_count(), 0);
//! assert_eq!(index.open_view().map().messages_count(), 1);
//! # Ok::<(), mailledger_index::Error>(())
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::{SyncConfig, SyncHandlerType};
use crate::error::Result;
use crate::log::LogSource;
use crate::map::IndexMap;
use crate::sync::modseq::{ModseqTracker, NoopModseq};
use crate::sync::provider::{ExtensionProvider, NoExtensions};
use crate::sync::{SyncEnv, SyncOutcome, sync_map};

/// Shared mailbox index.
pub struct Index {
    head: ArcSwap<IndexMap>,
    sync_lock: Mutex<()>,
    config: SyncConfig,
    provider: Arc<dyn ExtensionProvider + Send + Sync>,
}

impl Index {
    /// Creates an index publishing `map`, with default configuration and no
    /// known extensions.
    #[must_use]
    pub fn new(map: IndexMap) -> Self {
        Self::with_config(map, SyncConfig::default(), Arc::new(NoExtensions))
    }

    /// Creates an index with explicit configuration and extension provider.
    #[must_use]
    pub fn with_config(
        map: IndexMap,
        config: SyncConfig,
        provider: Arc<dyn ExtensionProvider + Send + Sync>,
    ) -> Self {
        Self {
            head: ArcSwap::from_pointee(map),
            sync_lock: Mutex::new(()),
            config,
            provider,
        }
    }

    /// Sync configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Currently published map.
    #[must_use]
    pub fn map(&self) -> Arc<IndexMap> {
        self.head.load_full()
    }

    /// Opens a view on the currently published map.
    #[must_use]
    pub fn open_view(&self) -> View {
        View {
            map: self.head.load_full(),
        }
    }

    /// Applies all available log records to the head map and publishes the
    /// result.
    ///
    /// Passes are serialized; readers are never blocked. Nothing is
    /// published if the pass fails.
    ///
    /// # Errors
    ///
    /// Returns any error from [`sync_map`]; the published map is unchanged.
    pub fn sync(&self, log: &mut dyn LogSource, modseq: &mut dyn ModseqTracker) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.lock();
        let current = self.head.load_full();
        let outcome = sync_map(
            current,
            log,
            self.config.handler_type,
            SyncEnv {
                config: &self.config,
                provider: self.provider.as_ref(),
                modseq,
            },
        )?;
        if outcome.records > 0 {
            self.head.store(Arc::clone(&outcome.map));
            tracing::debug!(
                records = outcome.records,
                position = %outcome.end_position,
                messages = outcome.map.messages_count(),
                "index map published"
            );
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("config", &self.config)
            .field("position", &self.head.load().header().log_position)
            .finish_non_exhaustive()
    }
}

/// A reader's snapshot of the index.
#[derive(Debug, Clone)]
pub struct View {
    map: Arc<IndexMap>,
}

impl View {
    /// Creates a view over a standalone map.
    #[must_use]
    pub const fn from_map(map: Arc<IndexMap>) -> Self {
        Self { map }
    }

    /// The pinned map.
    #[must_use]
    pub fn map(&self) -> &IndexMap {
        &self.map
    }

    /// Shared handle to the pinned map.
    #[must_use]
    pub fn map_arc(&self) -> Arc<IndexMap> {
        Arc::clone(&self.map)
    }

    /// Moves the view to the index's currently published map.
    pub fn refresh(&mut self, index: &Index) {
        self.map = index.map();
    }

    /// Replays the log onto this view only.
    ///
    /// Expunge handlers never run for views and the shared index is not
    /// touched. Returns the number of records applied.
    ///
    /// # Errors
    ///
    /// Returns any error from [`sync_map`]; the view keeps its old map.
    pub fn sync(
        &mut self,
        log: &mut dyn LogSource,
        config: &SyncConfig,
        provider: &dyn ExtensionProvider,
    ) -> Result<usize> {
        let outcome = sync_map(
            Arc::clone(&self.map),
            log,
            SyncHandlerType::View,
            SyncEnv {
                config,
                provider,
                modseq: &mut NoopModseq,
            },
        )?;
        self.map = outcome.map;
        Ok(outcome.records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::log::LogWriter;
    use crate::types::MailFlags;

    #[test]
    fn sync_publishes_new_map() {
        let index = Index::new(IndexMap::new(1));
        let before = index.map();
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY);
        let outcome = index.sync(&mut writer.into_log(), &mut NoopModseq).unwrap();
        assert!(outcome.copied);
        assert_eq!(before.messages_count(), 0);
        assert_eq!(index.map().messages_count(), 1);
    }

    #[test]
    fn failed_sync_publishes_nothing() {
        let index = Index::new(IndexMap::new(1));
        let mut writer = LogWriter::new(1);
        writer.append(4, MailFlags::EMPTY).append(2, MailFlags::EMPTY);
        assert!(index.sync(&mut writer.into_log(), &mut NoopModseq).is_err());
        assert_eq!(index.map().messages_count(), 0);
        assert_eq!(index.map().header().next_uid, 1);
    }

    #[test]
    fn view_refresh_and_private_sync() {
        let index = Index::new(IndexMap::new(1));
        let mut view = index.open_view();

        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY).append(2, MailFlags::EMPTY);
        let records = view
            .sync(&mut writer.into_log(), index.config(), &NoExtensions)
            .unwrap();
        assert_eq!(records, 2);
        assert_eq!(view.map().messages_count(), 2);
        assert_eq!(index.map().messages_count(), 0);

        view.refresh(&index);
        assert_eq!(view.map().messages_count(), 0);
    }
}
