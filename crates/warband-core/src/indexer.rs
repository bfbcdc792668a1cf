use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use contracts::{ChainEvent, ChainEventType, RawLogEntry, CURSOR_INDEXER};
use tracing::{info, warn};

use crate::settings;
use crate::store::{SqliteLedgerStore, StoreError};

#[derive(Debug)]
pub enum FetchError {
    Unreachable(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(detail) => write!(f, "log source unreachable: {detail}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    UnknownKind(String),
    BadTxHash(String),
    MissingActor,
    BadFee(f64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown event kind: {kind}"),
            Self::BadTxHash(raw) => write!(f, "malformed tx hash: {raw}"),
            Self::MissingActor => write!(f, "log entry has no actor address"),
            Self::BadFee(fee) => write!(f, "fee is not a valid amount: {fee}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug)]
pub enum IndexError {
    Fetch(FetchError),
    Store(StoreError),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "fetch failed: {err}"),
            Self::Store(err) => write!(f, "store failed: {err}"),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<FetchError> for IndexError {
    fn from(value: FetchError) -> Self {
        Self::Fetch(value)
    }
}

impl From<StoreError> for IndexError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// The on-chain log collaborator. Implementations must yield entries at or
/// after `from_block` in chain order; they are free to return more than one
/// invocation's worth.
pub trait LogSource {
    fn fetch_logs(&self, from_block: u64) -> Result<Vec<RawLogEntry>, FetchError>;
}

/// In-memory source for tests and dry runs.
#[derive(Debug, Default)]
pub struct StaticLogSource {
    entries: Vec<RawLogEntry>,
}

impl StaticLogSource {
    pub fn new(entries: Vec<RawLogEntry>) -> Self {
        Self { entries }
    }
}

impl LogSource for StaticLogSource {
    fn fetch_logs(&self, from_block: u64) -> Result<Vec<RawLogEntry>, FetchError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.block_number >= from_block)
            .cloned()
            .collect())
    }
}

/// Reads the newline-delimited JSON drop maintained by the chain relay. A
/// missing file means the relay has not exported yet and is not an error;
/// unreadable IO is transient and surfaces as `FetchError`.
#[derive(Debug)]
pub struct JsonlLogSource {
    path: PathBuf,
}

impl JsonlLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSource for JsonlLogSource {
    fn fetch_logs(&self, from_block: u64) -> Result<Vec<RawLogEntry>, FetchError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|err| FetchError::Unreachable(format!("{}: {err}", self.path.display())))?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|err| {
                FetchError::Unreachable(format!("{}: {err}", self.path.display()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawLogEntry>(&line) {
                Ok(entry) => {
                    if entry.block_number >= from_block {
                        entries.push(entry);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "skipping unparseable relay line");
                }
            }
        }
        Ok(entries)
    }
}

pub fn is_tx_hash(raw: &str) -> bool {
    raw.strip_prefix("0x")
        .map(|digits| digits.len() == 64 && hex::decode(digits).is_ok())
        .unwrap_or(false)
}

pub fn decode_log(entry: &RawLogEntry) -> Result<ChainEvent, DecodeError> {
    let kind = entry.kind.trim().to_ascii_uppercase();
    let event_type =
        ChainEventType::parse(&kind).ok_or_else(|| DecodeError::UnknownKind(entry.kind.clone()))?;

    if !is_tx_hash(&entry.tx_hash) {
        return Err(DecodeError::BadTxHash(entry.tx_hash.clone()));
    }
    if entry.actor.trim().is_empty() {
        return Err(DecodeError::MissingActor);
    }
    if !entry.fee_paid.is_finite() || entry.fee_paid < 0.0 {
        return Err(DecodeError::BadFee(entry.fee_paid));
    }

    Ok(ChainEvent {
        tx_hash: entry.tx_hash.to_ascii_lowercase(),
        log_index: entry.log_index,
        block_number: entry.block_number,
        event_type,
        actor: entry.actor.clone(),
        target: entry
            .target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(str::to_string),
        fee_paid: entry.fee_paid,
        occurred_at: entry.timestamp,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexRunReport {
    pub fetched: u64,
    pub skipped: u64,
    pub appended: u64,
    pub duplicates: u64,
    pub cursor: u64,
}

pub struct ChainIndexer;

impl ChainIndexer {
    /// One scheduler-triggered run: fetch everything past the cursor, decode,
    /// append, advance. Safe to fire concurrently or repeatedly — every write
    /// under the hood is keyed on a natural unique id, so identical input
    /// always converges to the same ledger state.
    ///
    /// A malformed entry is skipped and logged; it never blocks the entries
    /// behind it. A transient fetch failure returns before any write, leaving
    /// the cursor for the next scheduled retry.
    pub fn index_events(
        store: &mut SqliteLedgerStore,
        source: &dyn LogSource,
    ) -> Result<IndexRunReport, IndexError> {
        let cursor = store.cursor_position(CURSOR_INDEXER)?;
        let from_block = if cursor == 0 {
            settings::indexer_start_block(store)?
        } else {
            cursor + 1
        };

        let raw_entries = source.fetch_logs(from_block)?;
        if raw_entries.is_empty() {
            return Ok(IndexRunReport {
                cursor,
                ..IndexRunReport::default()
            });
        }

        let mut report = IndexRunReport {
            fetched: raw_entries.len() as u64,
            ..IndexRunReport::default()
        };

        let mut events = Vec::with_capacity(raw_entries.len());
        let mut max_block = cursor;
        for entry in &raw_entries {
            max_block = max_block.max(entry.block_number);
            match decode_log(entry) {
                Ok(event) => events.push(event),
                Err(err) => {
                    report.skipped += 1;
                    warn!(
                        tx_hash = %entry.tx_hash,
                        log_index = entry.log_index,
                        error = %err,
                        "skipping undecodable log entry"
                    );
                }
            }
        }

        let ingest = store.ingest_batch(&events, max_block)?;
        report.appended = ingest.appended;
        report.duplicates = ingest.duplicates;
        report.cursor = max_block;

        info!(
            fetched = report.fetched,
            appended = report.appended,
            duplicates = report.duplicates,
            skipped = report.skipped,
            cursor = report.cursor,
            "chain index run complete"
        );
        Ok(report)
    }
}
