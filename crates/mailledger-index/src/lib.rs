//! # mailledger-index
//!
//! Transaction-log sync engine for the MailLedger mailbox index.
//!
//! A mailbox index is an in-memory [`IndexMap`]: one record per message
//! (UID and flags), a header with counters and the log position the map
//! reflects, per-extension header and record data, and a keyword table.
//! Every change to a mailbox is first written to an append-only
//! transaction log; the engine replays the log onto a map to bring it up to
//! date.
//!
//! ## Features
//!
//! - **Copy-on-write maps**: readers keep their `Arc<IndexMap>` while a sync
//!   pass builds the next map privately
//! - **Atomic publication**: a finished pass is published with one pointer
//!   swap, a failed pass publishes nothing
//! - **Extensions**: named per-message data with layout migration, reset
//!   epochs, header and record updates and atomic counters
//! - **Keywords**: per-message keyword bitmaps that grow on demand
//! - **Expunge handlers**: extension owners see a message's data before it
//!   is removed
//! - **Corruption detection**: malformed or inconsistent records abort the
//!   pass with the offending log position
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use mailledger_index::{
//!     ExtIntroSpec, IndexMap, LogWriter, MailFlags, NoExtensions, NoopModseq, SeqNum, SyncConfig,
//!     SyncEnv, SyncHandlerType, sync_map,
//! };
//!
//! let mut writer = LogWriter::new(1);
//! writer
//!     .ext_intro(&ExtIntroSpec::new("size", 4))?
//!     .append(1, MailFlags::EMPTY)
//!     .ext_rec_update(0, 1, 0, &1u32.to_le_bytes())
//!     .ext_atomic_inc(0, 0, 1, 5);
//! let mut log = writer.into_log();
//!
//! let config = SyncConfig::default();
//! let outcome = sync_map(
//!     Arc::new(IndexMap::new(1)),
//!     &mut log,
//!     SyncHandlerType::Head,
//!     SyncEnv {
//!         config: &config,
//!         provider: &NoExtensions,
//!         modseq: &mut NoopModseq,
//!     },
//! )?;
//!
//! let seq = SeqNum::new(1).unwrap();
//! assert_eq!(outcome.map.ext_record(seq, 0), Some(&6u32.to_le_bytes()[..]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Sync Pipeline
//!
//! ```text
//! ┌───────────┐  RawRecord  ┌────────────────┐  IndexMap  ┌───────────┐
//! │ LogSource │ ──────────→ │ SyncMapContext │ ─────────→ │   Index   │
//! └───────────┘             └────────────────┘   (swap)   └───────────┘
//!                                   │                           │
//!                           ExpungeHandler,               open_view()
//!                           ModseqTracker                       ▼
//!                                                            View
//! ```
//!
//! ## Modules
//!
//! - [`config`]: sync configuration and handler types
//! - [`index`]: shared index handle and reader views
//! - [`log`]: transaction log framing, reading and writing
//! - [`map`]: the index map, extension registry and keyword table
//! - [`save`]: save/copy bookkeeping for remote mailboxes
//! - [`sync`]: the sync engine
//! - [`types`]: identifiers, flags and range sets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod index;
pub mod log;
pub mod map;
pub mod save;
pub mod sync;
pub mod types;

pub use config::{SyncConfig, SyncConfigBuilder, SyncHandlerType};
pub use error::{Error, Result};
pub use index::{Index, View};
pub use log::record::KeywordModify;
pub use log::{ExtIntroSpec, LogError, LogSource, LogWriter, MemoryLog, RawRecord};
pub use map::{IndexMap, MapHeader, MapSummary, MessageRecord};
pub use save::{CommitChanges, SaveContext, SaveError};
pub use sync::modseq::{LoggingModseq, ModseqCounter, ModseqTracker, NoopModseq};
pub use sync::provider::{ExpungeHandler, ExtensionProvider, KnownExtensions, NoExtensions};
pub use sync::{SyncEnv, SyncMapContext, SyncOutcome, sync_map, want_index_reopen};
pub use types::{Flag, IdRange, LogPosition, MailFlags, ModSeq, RangeSet, SeqNum, Uid, UidValidity};
