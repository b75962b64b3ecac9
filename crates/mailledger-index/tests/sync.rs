//! Integration tests for the sync engine.
//!
//! Logs are produced with `LogWriter` and replayed through the public API,
//! either directly with `sync_map` or through a shared `Index`.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mailledger_index::{
    Error, ExpungeHandler, ExtIntroSpec, Flag, Index, IndexMap, KeywordModify, KnownExtensions, LogPosition,
    LogSource, LogWriter, MailFlags, MemoryLog, ModseqCounter, NoExtensions, NoopModseq, SeqNum, SyncConfig,
    SyncEnv, SyncHandlerType, SyncMapContext, SyncOutcome, Uid, sync_map, want_index_reopen,
};

/// Shows the engine's log output for failing tests (`RUST_LOG=mailledger_index=trace`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seq(n: u32) -> SeqNum {
    SeqNum::new(n).unwrap()
}

fn replay(writer: LogWriter) -> mailledger_index::Result<SyncOutcome> {
    replay_onto(Arc::new(IndexMap::new(1)), writer)
}

fn replay_onto(map: Arc<IndexMap>, writer: LogWriter) -> mailledger_index::Result<SyncOutcome> {
    init_tracing();
    let config = SyncConfig::builder().verify_after_sync(true).build();
    let mut log = writer.into_log();
    sync_map(
        map,
        &mut log,
        SyncHandlerType::Head,
        SyncEnv {
            config: &config,
            provider: &NoExtensions,
            modseq: &mut NoopModseq,
        },
    )
}

/// Writes a log containing only the records added by `build`, positioned
/// after the map's current log position.
fn continue_log(index: &Index, build: impl FnOnce(&mut LogWriter)) -> MemoryLog {
    init_tracing();
    let mut writer = LogWriter::at(index.map().header().log_position);
    build(&mut writer);
    writer.into_log()
}

mod message_tests {
    use super::*;

    #[test]
    fn append_two_expunge_first() {
        let mut writer = LogWriter::new(1);
        writer
            .append(1, MailFlags::EMPTY)
            .append(2, MailFlags::EMPTY)
            .expunge(1, 1);
        let map = replay(writer).unwrap().map;
        assert_eq!(map.messages_count(), 1);
        assert_eq!(map.record(seq(1)).unwrap().uid, Uid::new(2).unwrap());
        assert_eq!(map.lookup_uid(Uid::new(2).unwrap()), Some(seq(1)));
        assert_eq!(map.lookup_uid(Uid::new(1).unwrap()), None);
    }

    #[test]
    fn count_is_appends_minus_expunges() {
        let mut writer = LogWriter::new(1);
        for uid in 1..=20 {
            writer.append(uid, MailFlags::EMPTY);
        }
        writer.expunge(3, 7).expunge(15, 15).expunge(30, 40);
        let outcome = replay(writer).unwrap();
        assert_eq!(outcome.map.messages_count(), 14);
        assert_eq!(outcome.map.header().messages_count, 14);
        assert_eq!(outcome.records, 23);
        assert!(outcome.map.check().is_ok());
    }

    #[test]
    fn log_position_advances() {
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY);
        let end = writer.position();
        let outcome = replay(writer).unwrap();
        assert_eq!(outcome.end_position, end);
        assert_eq!(outcome.map.header().log_position, end);
    }
}

mod extension_tests {
    use super::*;

    #[test]
    fn record_update_then_atomic_increment() {
        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("size", 4))
            .unwrap()
            .append(1, MailFlags::EMPTY)
            .ext_rec_update(0, 1, 0, &1u32.to_le_bytes())
            .ext_atomic_inc(0, 0, 1, 5);
        let map = replay(writer).unwrap().map;
        assert_eq!(map.ext_record(seq(1), 0), Some(&6u32.to_le_bytes()[..]));
    }

    #[test]
    fn record_update_reads_back() {
        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("guid", 8))
            .unwrap()
            .appends(&[(1, MailFlags::EMPTY), (2, MailFlags::EMPTY)])
            .ext_rec_update(0, 2, 4, &[1, 2, 3, 4]);
        let map = replay(writer).unwrap().map;
        assert_eq!(map.ext_record(seq(1), 0), Some(&[0u8; 8][..]));
        assert_eq!(map.ext_record(seq(2), 0), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
    }

    #[test]
    fn header_update_touches_only_its_extension() {
        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("a", 4).hdr_size(8))
            .unwrap()
            .ext_intro(&ExtIntroSpec::new("b", 4).hdr_size(8))
            .unwrap()
            .ext_hdr_update(1, 2, &[0xaa, 0xbb]);
        let map = replay(writer).unwrap().map;
        assert_eq!(map.ext_header(0), Some(&[0u8; 8][..]));
        assert_eq!(map.ext_header(1), Some(&[0, 0, 0xaa, 0xbb, 0, 0, 0, 0][..]));
    }

    #[test]
    fn atomic_increment_below_zero_aborts() {
        let index = Index::new(IndexMap::new(1));
        let mut log = continue_log(&index, |w| {
            w.ext_intro(&ExtIntroSpec::new("count", 4))
                .unwrap()
                .append(1, MailFlags::EMPTY)
                .ext_atomic_inc(0, 0, 1, 1)
                .ext_atomic_inc(0, 0, 1, -2);
        });
        let err = index.sync(&mut log, &mut NoopModseq).unwrap_err();
        assert!(err.reason().unwrap().contains("drops number below zero"));
        assert_eq!(index.map().messages_count(), 0);
        assert!(index.map().extensions().is_empty());
    }

    #[test]
    fn atomic_increment_overflow_aborts() {
        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("count", 1))
            .unwrap()
            .append(1, MailFlags::EMPTY)
            .ext_atomic_inc(0, 0, 1, 250)
            .ext_atomic_inc(0, 0, 1, 10);
        let err = replay(writer).unwrap_err();
        assert!(err.reason().unwrap().contains("overflows number"));
    }

    #[test]
    fn unknown_extension_id_aborts_without_publishing() {
        let index = Index::new(IndexMap::new(1));
        let mut log = continue_log(&index, |w| {
            w.append(1, MailFlags::EMPTY);
        });
        index.sync(&mut log, &mut NoopModseq).unwrap();
        let before = index.map();

        let mut log = continue_log(&index, |w| {
            w.append(2, MailFlags::EMPTY)
                .ext_rec_update(7, 1, 0, &[1, 0, 0, 0]);
        });
        let err = index.sync(&mut log, &mut NoopModseq).unwrap_err();
        assert!(matches!(err, Error::Corrupted { .. }));
        assert!(err.reason().unwrap().contains("for unknown extension id 7"));
        assert_eq!(*index.map(), *before);
        assert_eq!(index.map().messages_count(), 1);
    }

    #[test]
    fn reset_clears_records() {
        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("cache", 4))
            .unwrap()
            .append(1, MailFlags::EMPTY)
            .ext_rec_update(0, 1, 0, &[9, 9, 9, 9])
            .ext_reset(0, 2, false);
        let map = replay(writer).unwrap().map;
        assert_eq!(map.ext_record(seq(1), 0), Some(&[0u8; 4][..]));
        assert_eq!(map.extensions().get(0).unwrap().reset_id(), 2);
    }
}

mod keyword_tests {
    use super::*;

    #[test]
    fn reset_is_range_bounded_and_indexes_stay() {
        let mut writer = LogWriter::new(1);
        writer
            .appends(&[(1, MailFlags::EMPTY), (2, MailFlags::EMPTY), (3, MailFlags::EMPTY)])
            .keyword_update(KeywordModify::Add, "$Work", 1, 3)
            .unwrap()
            .keyword_reset(2, 3)
            .keyword_update(KeywordModify::Add, "$Later", 3, 3)
            .unwrap();
        let map = replay(writer).unwrap().map;
        assert_eq!(map.message_keywords(seq(1)), vec!["$Work"]);
        assert!(map.message_keywords(seq(2)).is_empty());
        assert_eq!(map.message_keywords(seq(3)), vec!["$Later"]);
        assert_eq!(map.keywords().lookup("$Work"), Some(0));
        assert_eq!(map.keywords().lookup("$Later"), Some(1));
    }
}

mod publication_tests {
    use super::*;

    #[test]
    fn readers_keep_their_map() {
        let index = Index::new(IndexMap::new(1));
        let mut log = continue_log(&index, |w| {
            w.ext_intro(&ExtIntroSpec::new("size", 4))
                .unwrap()
                .append(1, MailFlags::EMPTY)
                .ext_rec_update(0, 1, 0, &[1, 0, 0, 0]);
        });
        index.sync(&mut log, &mut NoopModseq).unwrap();

        let view = index.open_view();
        let snapshot = view.map().clone();

        let mut log = continue_log(&index, |w| {
            w.ext_rec_update(0, 1, 0, &[2, 0, 0, 0])
                .flag_update(1, 1, [Flag::Seen].into_iter().collect(), MailFlags::EMPTY)
                .append(2, MailFlags::EMPTY);
        });
        let outcome = index.sync(&mut log, &mut NoopModseq).unwrap();
        assert!(outcome.copied);

        assert_eq!(*view.map(), snapshot);
        assert_eq!(view.map().ext_record(seq(1), 0), Some(&[1, 0, 0, 0][..]));
        assert_eq!(index.map().ext_record(seq(1), 0), Some(&[2, 0, 0, 0][..]));
        assert_eq!(index.map().messages_count(), 2);
    }

    #[test]
    fn nothing_new_publishes_nothing() {
        let index = Index::new(IndexMap::new(1));
        let before = index.map();
        let mut log = continue_log(&index, |_| {});
        let outcome = index.sync(&mut log, &mut NoopModseq).unwrap();
        assert_eq!(outcome.records, 0);
        assert!(Arc::ptr_eq(&before, &index.map()));
    }

    #[test]
    fn unavailable_log_position_requires_reopen() {
        let map = IndexMap::new(1);
        let log = MemoryLog::starting_at(LogPosition::new(3, 0), bytes_of(LogWriter::new(3)));
        assert!(want_index_reopen(&map, &log).is_some());

        let index = Index::new(map);
        let mut log = log;
        let err = index.sync(&mut log, &mut NoopModseq).unwrap_err();
        assert!(matches!(err, Error::ReopenRequired { .. }));
    }

    #[test]
    fn partial_tail_frame_waits_for_next_pass() {
        init_tracing();
        let index = Index::new(IndexMap::new(1));
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY).append(2, MailFlags::EMPTY);
        let complete = writer.position();
        let head = writer.freeze();

        // Frame header of an append whose payload isn't written yet.
        let mut data = head.to_vec();
        data.extend_from_slice(&[2, 0, 0, 0, 8, 0, 0, 0]);
        let mut log = MemoryLog::new(Bytes::from(data));
        let outcome = index.sync(&mut log, &mut NoopModseq).unwrap();
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.end_position, complete);
        assert_eq!(log.remaining(), 8);
        assert_eq!(index.map().messages_count(), 2);
        assert_eq!(index.map().header().log_position, complete);

        let mut tail = LogWriter::at(complete);
        tail.append(3, MailFlags::EMPTY);
        let mut data = head.to_vec();
        data.extend_from_slice(&tail.freeze());
        let mut log = MemoryLog::new(Bytes::from(data));
        let outcome = index.sync(&mut log, &mut NoopModseq).unwrap();
        assert_eq!(outcome.records, 1);
        assert_eq!(index.map().messages_count(), 3);
    }

    #[test]
    fn partial_tail_frame_in_sealed_log_fails() {
        let index = Index::new(IndexMap::new(1));
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY);
        let mut data = writer.freeze().to_vec();
        data.extend_from_slice(&[2, 0, 0, 0, 8, 0, 0, 0]);
        let mut log = MemoryLog::new(Bytes::from(data)).sealed();
        let err = index.sync(&mut log, &mut NoopModseq).unwrap_err();
        assert!(matches!(err, Error::Log(_)));
        assert_eq!(index.map().messages_count(), 0);
    }

    fn bytes_of(writer: LogWriter) -> Bytes {
        writer.freeze()
    }
}

mod manual_pass_tests {
    use super::*;

    #[test]
    fn caller_reported_corruption_stops_the_pass() {
        init_tracing();
        let mut writer = LogWriter::new(1);
        writer.append(1, MailFlags::EMPTY).append(2, MailFlags::EMPTY);
        let mut log = writer.into_log();

        let config = SyncConfig::default();
        let mut modseq = NoopModseq;
        let mut ctx = SyncMapContext::new(
            Arc::new(IndexMap::new(1)),
            SyncHandlerType::File,
            SyncEnv {
                config: &config,
                provider: &NoExtensions,
                modseq: &mut modseq,
            },
        );
        ctx.sync_record(&log.next_record().unwrap().unwrap()).unwrap();

        let err = ctx.set_corrupted("Message 1 has no cached body");
        assert!(err.is_corruption());
        assert_eq!(ctx.corruption_reason(), Some("Message 1 has no cached body"));

        let err = ctx.sync_record(&log.next_record().unwrap().unwrap()).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(err.reason(), Some("Message 1 has no cached body"));
        assert!(ctx.finish(1, log.position()).is_err());
    }
}

mod expunge_handler_tests {
    use super::*;

    type Calls = Arc<Mutex<Vec<(&'static str, u32, Vec<u8>)>>>;

    fn recorder(name: &'static str, calls: &Calls) -> impl Fn() -> Box<dyn ExpungeHandler> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || -> Box<dyn ExpungeHandler> {
            let calls = Arc::clone(&calls);
            Box::new(move |uid: Uid, record: &[u8]| {
                calls.lock().unwrap().push((name, uid.get(), record.to_vec()));
            })
        }
    }

    #[test]
    fn pass_driven_record_by_record() {
        init_tracing();
        let calls = Calls::default();
        let provider = KnownExtensions::new().with_expunge_handler("a", recorder("a", &calls));

        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("a", 4))
            .unwrap()
            .appends(&[(1, MailFlags::EMPTY), (2, MailFlags::EMPTY)])
            .ext_rec_update(0, 1, 0, &[1, 0, 0, 0]);
        let setup_end = writer.position();
        writer.expunge(1, 1);
        let end = writer.position();
        let mut log = writer.into_log();

        let config = SyncConfig::default();
        let mut modseq = NoopModseq;
        let mut ctx = SyncMapContext::new(
            Arc::new(IndexMap::new(1)),
            SyncHandlerType::Head,
            SyncEnv {
                config: &config,
                provider: &provider,
                modseq: &mut modseq,
            },
        );
        let mut records = 0;
        while log.position() < setup_end {
            ctx.sync_record(&log.next_record().unwrap().unwrap()).unwrap();
            records += 1;
        }

        ctx.init_expunge_handlers();
        ctx.sync_record(&log.next_record().unwrap().unwrap()).unwrap();
        records += 1;
        assert_eq!(*calls.lock().unwrap(), vec![("a", 1, vec![1, 0, 0, 0])]);
        ctx.deinit_expunge_handlers();

        assert!(log.next_record().unwrap().is_none());
        let outcome = ctx.finish(records, log.position()).unwrap();
        assert_eq!(outcome.end_position, end);
        assert_eq!(outcome.records, 4);
        assert_eq!(outcome.map.messages_count(), 1);
        assert_eq!(outcome.map.header().log_position, end);
    }

    #[test]
    fn every_handler_sees_every_expunged_message_once() {
        let calls = Calls::default();
        let provider = KnownExtensions::new()
            .with_expunge_handler("a", recorder("a", &calls))
            .with_expunge_handler("b", recorder("b", &calls));

        let mut writer = LogWriter::new(1);
        writer
            .ext_intro(&ExtIntroSpec::new("a", 4))
            .unwrap()
            .ext_intro(&ExtIntroSpec::new("b", 4))
            .unwrap()
            .appends(&[(1, MailFlags::EMPTY), (2, MailFlags::EMPTY), (3, MailFlags::EMPTY)])
            .ext_rec_update(0, 2, 0, &[2, 0, 0, 0])
            .ext_rec_update(1, 3, 0, &[3, 0, 0, 0])
            .expunge(2, 3);

        let config = SyncConfig::default();
        let mut modseq = ModseqCounter::default();
        let mut log = writer.into_log();
        let map = sync_map(
            Arc::new(IndexMap::new(1)),
            &mut log,
            SyncHandlerType::Head,
            SyncEnv {
                config: &config,
                provider: &provider,
                modseq: &mut modseq,
            },
        )
        .unwrap()
        .map;

        assert_eq!(map.messages_count(), 1);
        let mut calls = calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                ("a", 2, vec![2, 0, 0, 0]),
                ("a", 3, vec![0, 0, 0, 0]),
                ("b", 2, vec![0, 0, 0, 0]),
                ("b", 3, vec![3, 0, 0, 0]),
            ]
        );
    }
}
