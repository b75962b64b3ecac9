//! `mailledger-indexctl` - replay a transaction log and print the result
//!
//! Reads one log file, replays it onto an empty index map the way a file
//! sync would, and prints a JSON summary of the resulting map. Exits with a
//! non-zero status if the log is corrupted.
//!
//! ```text
//! mailledger-indexctl <log-file> [--file-seq N] [--uid-validity N] [--known NAME]... [--sealed]
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use mailledger_index::{
    IndexMap, KnownExtensions, LogPosition, MapHeader, MemoryLog, ModseqCounter, SyncConfig, SyncEnv,
    SyncHandlerType, sync_map,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "mailledger-indexctl")]
#[command(about = "Replay a MailLedger index transaction log and print the resulting map")]
struct Args {
    /// Transaction log file to replay
    #[arg(value_name = "LOG_FILE")]
    path: PathBuf,

    /// Sequence number of the log file
    #[arg(long, default_value_t = 1)]
    file_seq: u32,

    /// UIDVALIDITY of the empty map the log is replayed onto
    #[arg(long, default_value_t = 0)]
    uid_validity: u32,

    /// Extension the replay treats as known (repeatable)
    #[arg(long, value_name = "NAME")]
    known: Vec<String>,

    /// Fail on a partial frame at the end of the file instead of stopping there
    #[arg(long)]
    sealed: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailledger_indexctl=info,mailledger_index=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let data = std::fs::read(&args.path).with_context(|| format!("failed to read {}", args.path.display()))?;
    info!(path = %args.path.display(), bytes = data.len(), "replaying log");

    let start = LogPosition::new(args.file_seq, 0);
    let mut log = MemoryLog::starting_at(start, Bytes::from(data));
    if args.sealed {
        log = log.sealed();
    }

    let mut hdr = MapHeader::new(args.uid_validity);
    hdr.log_position = start;
    let provider = args
        .known
        .iter()
        .fold(KnownExtensions::new(), |provider, name| provider.with(name.as_str()));
    let config = SyncConfig::builder()
        .handler_type(SyncHandlerType::File)
        .verify_after_sync(true)
        .build();
    let mut modseq = ModseqCounter::default();

    let outcome = sync_map(
        Arc::new(IndexMap::with_header(hdr)),
        &mut log,
        config.handler_type,
        SyncEnv {
            config: &config,
            provider: &provider,
            modseq: &mut modseq,
        },
    )
    .with_context(|| format!("failed to replay {}", args.path.display()))?;

    if log.remaining() > 0 {
        warn!(
            end = %outcome.end_position,
            bytes = log.remaining(),
            "partial frame at end of log left unread"
        );
    }
    info!(
        records = outcome.records,
        end = %outcome.end_position,
        messages = outcome.map.messages_count(),
        "log replayed"
    );

    let report = serde_json::json!({
        "records": outcome.records,
        "end_position": outcome.end_position,
        "highest_modseq": modseq.highest_modseq(),
        "changes": modseq.changes().len(),
        "unread_bytes": log.remaining(),
        "map": outcome.map.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
