//! Transaction log replay.
//!
//! A sync pass reads records from a [`LogSource`] starting at the map's
//! recorded log position and applies them one at a time:
//!
//! ```text
//! ┌──────┐  sync_map   ┌──────────┐  end of log   ┌───────────┐
//! │ idle │ ──────────→ │ applying │ ────────────→ │ published │
//! └──────┘             └──────────┘               └───────────┘
//!                           │ corruption / error
//!                           ▼
//!                      ┌─────────┐
//!                      │ aborted │  (input map untouched)
//!                      └─────────┘
//! ```
//!
//! The map is copied on the first mutation if anyone else holds a
//! reference to it, so readers never observe a half-applied pass.

mod dispatch;
mod expunge;
mod ext;
mod keywords;
pub mod modseq;
pub mod provider;
mod records;

use std::sync::Arc;

use crate::config::{SyncConfig, SyncHandlerType};
use crate::error::{Error, Result};
use crate::log::LogSource;
use crate::map::{IndexMap, MAJOR_VERSION, MINOR_VERSION, PreservedRecord};
use crate::types::LogPosition;

use expunge::ExpungeHandlerSlot;
use modseq::ModseqTracker;
use provider::ExtensionProvider;

/// Collaborators of a sync pass.
pub struct SyncEnv<'a> {
    /// Limits and switches.
    pub config: &'a SyncConfig,
    /// Extension knowledge and expunge handlers.
    pub provider: &'a dyn ExtensionProvider,
    /// Receiver of per-message changes.
    pub modseq: &'a mut dyn ModseqTracker,
}

/// Result of a successful sync pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The updated map. Same allocation as the input if nothing changed or
    /// the input wasn't shared.
    pub map: Arc<IndexMap>,
    /// Number of records applied.
    pub records: usize,
    /// Log position after the last applied record.
    pub end_position: LogPosition,
    /// True if the map had to be copied before modification.
    pub copied: bool,
}

/// Extension targeted by the most recent introduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CurrentExt {
    pub(crate) id: u32,
    /// Updates for `id` must start at or after this position.
    pub(crate) intro_end_position: LogPosition,
    /// Record and header updates are skipped until the next introduction.
    pub(crate) ignore: bool,
}

/// State of one sync pass.
///
/// Created per pass and dropped when it ends; nothing here outlives the
/// pass except the map itself.
pub struct SyncMapContext<'a> {
    map: Arc<IndexMap>,
    copied: bool,
    handler_type: SyncHandlerType,
    config: &'a SyncConfig,
    provider: &'a dyn ExtensionProvider,
    modseq: &'a mut dyn ModseqTracker,

    position: LogPosition,
    record_end: LogPosition,
    prev_position: Option<LogPosition>,
    cur_ext: Option<CurrentExt>,

    expunge_handlers: Vec<ExpungeHandlerSlot>,
    expunge_handlers_set: bool,
    expunge_handlers_used: bool,

    unknown_extensions: Vec<u32>,
    unknown_records: Vec<PreservedRecord>,
    internal_update: bool,
    errors: bool,
    reason: Option<String>,
}

impl<'a> SyncMapContext<'a> {
    /// Starts a pass over `map`.
    #[must_use]
    pub fn new(map: Arc<IndexMap>, handler_type: SyncHandlerType, env: SyncEnv<'a>) -> Self {
        let position = map.header().log_position;
        Self {
            map,
            copied: false,
            handler_type,
            config: env.config,
            provider: env.provider,
            modseq: env.modseq,
            position,
            record_end: position,
            prev_position: None,
            cur_ext: None,
            expunge_handlers: Vec::new(),
            expunge_handlers_set: false,
            expunge_handlers_used: false,
            unknown_extensions: Vec::new(),
            unknown_records: Vec::new(),
            internal_update: false,
            errors: false,
            reason: None,
        }
    }

    /// The map as modified so far.
    #[must_use]
    pub fn map(&self) -> &IndexMap {
        &self.map
    }

    /// Handler type of this pass.
    #[must_use]
    pub const fn handler_type(&self) -> SyncHandlerType {
        self.handler_type
    }

    /// Position of the record being applied.
    #[must_use]
    pub const fn position(&self) -> LogPosition {
        self.position
    }

    /// Returns true if the map was copied during this pass.
    #[must_use]
    pub const fn is_copied(&self) -> bool {
        self.copied
    }

    /// Corruption reason, once the pass has failed.
    #[must_use]
    pub fn corruption_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns a mutable map, copying it first if it is shared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the copy can't be allocated.
    pub fn atomic_map(&mut self) -> Result<&mut IndexMap> {
        Self::privatize(&mut self.map, &mut self.copied)
    }

    /// Field-level form of [`Self::atomic_map`] so callers can keep using
    /// other context fields while holding the map.
    fn privatize<'m>(map: &'m mut Arc<IndexMap>, copied: &mut bool) -> Result<&'m mut IndexMap> {
        if Arc::get_mut(map).is_none() {
            let private = map.try_clone()?;
            *map = Arc::new(private);
            *copied = true;
            tracing::trace!("index map copied for modification");
        }
        Ok(Arc::make_mut(map))
    }

    /// Marks the pass failed at the current record and returns the error to
    /// propagate.
    ///
    /// Every later [`Self::sync_record`] call fails with the same reason, so
    /// a caller that detects a problem of its own can stop the pass the same
    /// way a malformed record does.
    pub fn set_corrupted(&mut self, reason: impl Into<String>) -> Error {
        let reason = reason.into();
        self.errors = true;
        tracing::error!(position = %self.position, %reason, "corrupted transaction log record");
        self.reason = Some(reason.clone());
        Error::Corrupted {
            position: self.position,
            reason,
        }
    }

    /// Ends the pass after `records` records, with the log read up to
    /// `end_position`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the pass already failed or the map
    /// fails its consistency check, and [`Error::OutOfMemory`] if the map
    /// can't be copied.
    pub fn finish(mut self, records: usize, end_position: LogPosition) -> Result<SyncOutcome> {
        if self.errors {
            let reason = self.reason.clone().unwrap_or_default();
            return Err(self.set_corrupted(reason));
        }
        if records > 0 {
            let unknown = std::mem::take(&mut self.unknown_records);
            let map = self.atomic_map()?;
            map.header_mut().log_position = end_position;
            if !unknown.is_empty() {
                map.preserve(unknown)?;
            }
        }

        if self.config.verify_after_sync {
            if let Err(err) = self.map.check() {
                self.position = end_position;
                return Err(self.set_corrupted(err.0));
            }
        }

        self.deinit_expunge_handlers();
        Ok(SyncOutcome {
            map: std::mem::take(&mut self.map),
            records,
            end_position,
            copied: self.copied,
        })
    }
}

impl Drop for SyncMapContext<'_> {
    fn drop(&mut self) {
        self.deinit_expunge_handlers();
    }
}

impl std::fmt::Debug for SyncMapContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMapContext")
            .field("handler_type", &self.handler_type)
            .field("position", &self.position)
            .field("copied", &self.copied)
            .field("cur_ext", &self.cur_ext)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Checks whether `map` can be synced from `log` at all.
///
/// Returns the reason the index must be reopened instead, if any.
#[must_use]
pub fn want_index_reopen(map: &IndexMap, log: &dyn LogSource) -> Option<String> {
    let hdr = map.header();
    if hdr.major_version != MAJOR_VERSION {
        return Some(format!(
            "Major version changed ({} != {MAJOR_VERSION})",
            hdr.major_version
        ));
    }
    if hdr.minor_version > MINOR_VERSION {
        return Some(format!(
            "Minor version {} is newer than supported {MINOR_VERSION}",
            hdr.minor_version
        ));
    }
    let first = log.first_position();
    if hdr.log_position < first {
        return Some(format!(
            "Log position {} is no longer available (log starts at {first})",
            hdr.log_position
        ));
    }
    None
}

/// Applies every available log record to `map`.
///
/// On success the returned map contains all records up to the end of the
/// available log. On failure nothing is returned; `map` itself is never
/// modified if another reference to it exists.
///
/// # Errors
///
/// - [`Error::ReopenRequired`] if the map's format or log position is unusable
/// - [`Error::Corrupted`] at the first record that violates the format
/// - [`Error::OutOfMemory`] if the map can't be copied or grown
/// - [`Error::Log`] if the log source fails
pub fn sync_map(
    map: Arc<IndexMap>,
    log: &mut dyn LogSource,
    handler_type: SyncHandlerType,
    env: SyncEnv<'_>,
) -> Result<SyncOutcome> {
    if let Some(reason) = want_index_reopen(&map, log) {
        tracing::warn!(%reason, "index must be reopened");
        return Err(Error::ReopenRequired { reason });
    }

    let start = map.header().log_position;
    log.seek(start)?;

    let mut ctx = SyncMapContext::new(map, handler_type, env);
    let mut records = 0;
    while let Some(record) = log.next_record()? {
        ctx.sync_record(&record)?;
        records += 1;
    }

    let end_position = log.position();
    tracing::debug!(
        %handler_type,
        records,
        start = %start,
        end = %end_position,
        "index map synced"
    );
    ctx.finish(records, end_position)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::log::{LogWriter, MemoryLog};
    use crate::sync::modseq::NoopModseq;
    use crate::sync::provider::NoExtensions;
    use crate::types::MailFlags;
    use bytes::Bytes;

    fn run(map: Arc<IndexMap>, log: &mut dyn LogSource) -> Result<SyncOutcome> {
        let config = SyncConfig::builder().verify_after_sync(true).build();
        let mut modseq = NoopModseq;
        sync_map(
            map,
            log,
            SyncHandlerType::Head,
            SyncEnv {
                config: &config,
                provider: &NoExtensions,
                modseq: &mut modseq,
            },
        )
    }

    #[test]
    fn empty_log_keeps_map() {
        let map = Arc::new(IndexMap::new(1));
        let mut log = MemoryLog::new(Bytes::new());
        let outcome = run(Arc::clone(&map), &mut log).unwrap();
        assert_eq!(outcome.records, 0);
        assert!(!outcome.copied);
        assert!(Arc::ptr_eq(&outcome.map, &map));
    }

    #[test]
    fn unshared_map_is_updated_in_place() {
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY);
        let mut log = writer.into_log();
        let outcome = run(Arc::new(IndexMap::new(1)), &mut log).unwrap();
        assert!(!outcome.copied);
        assert_eq!(outcome.map.messages_count(), 1);
        assert_eq!(outcome.map.header().log_position, log.end_position());
    }

    #[test]
    fn shared_map_is_copied_once() {
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY).append(2, MailFlags::EMPTY);
        let mut log = writer.into_log();
        let map = Arc::new(IndexMap::new(1));
        let outcome = run(Arc::clone(&map), &mut log).unwrap();
        assert!(outcome.copied);
        assert_eq!(map.messages_count(), 0);
        assert_eq!(outcome.map.messages_count(), 2);
    }

    #[test]
    fn major_version_mismatch_requires_reopen() {
        let mut map = IndexMap::new(1);
        map.header_mut().major_version = 6;
        let mut log = MemoryLog::new(Bytes::new());
        let err = run(Arc::new(map), &mut log).unwrap_err();
        assert!(matches!(err, Error::ReopenRequired { .. }));
        assert!(err.reason().unwrap().contains("Major version"));
    }

    #[test]
    fn newer_minor_version_requires_reopen() {
        let mut map = IndexMap::new(1);
        map.header_mut().minor_version = MINOR_VERSION + 1;
        let log = MemoryLog::new(Bytes::new());
        assert!(want_index_reopen(&map, &log).is_some());
    }

    #[test]
    fn rotated_log_requires_reopen() {
        let map = IndexMap::new(1);
        let log = MemoryLog::starting_at(LogPosition::new(2, 0), Bytes::new());
        let reason = want_index_reopen(&map, &log).unwrap();
        assert!(reason.contains("no longer available"));
    }

    #[test]
    fn truncated_log_is_log_error() {
        let mut log = MemoryLog::new(Bytes::from_static(&[2, 0, 0, 0, 8, 0, 0, 0]));
        let err = run(Arc::new(IndexMap::new(1)), &mut log).unwrap_err();
        assert!(matches!(err, Error::Log(_)));
    }
}
