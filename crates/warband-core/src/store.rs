use std::fmt;
use std::path::Path;

use contracts::{
    ChainEvent, ChainEventType, NewsItem, QuestProgressRecord, QuestState, ReferralRecord,
    RevenueKind, RevenueTransaction, UserRecord, CURSOR_INDEXER,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Corrupt(detail) => write!(f, "corrupt ledger row: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Typed result of an insert against a natural unique key. Callers branch on
/// this instead of inspecting constraint-violation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created)
    }

    fn from_changes(changes: usize) -> Self {
        if changes == 0 {
            Self::AlreadyExists
        } else {
            Self::Created
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub appended: u64,
    pub duplicates: u64,
    pub revenue_recorded: u64,
    pub referrals_created: u64,
}

/// The append-mostly ledger of normalized chain events plus everything the
/// ledger derives exactly once per event: revenue rows, referral rows, user
/// presence. All uniqueness lives in SQL constraints so overlapping ingestion
/// runs converge to identical state.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Connection,
}

impl SqliteLedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chain_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                actor TEXT NOT NULL,
                target TEXT,
                fee_paid REAL NOT NULL,
                occurred_at INTEGER NOT NULL,
                UNIQUE (tx_hash, log_index)
            );

            CREATE TABLE IF NOT EXISTS revenue_transactions (
                tx_hash TEXT PRIMARY KEY,
                amount REAL NOT NULL,
                kind TEXT NOT NULL,
                actor TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                wallet_address TEXT PRIMARY KEY,
                shares INTEGER NOT NULL DEFAULT 0,
                farcaster_id TEXT,
                last_seen_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS referrals (
                referee TEXT PRIMARY KEY,
                referrer TEXT NOT NULL,
                joined_at INTEGER NOT NULL,
                total_fees_paid REAL NOT NULL DEFAULT 0,
                total_profit_share REAL NOT NULL DEFAULT 0,
                referral_points INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS quest_progress (
                wallet_address TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                state TEXT NOT NULL,
                progress REAL NOT NULL,
                updated_seq INTEGER NOT NULL,
                PRIMARY KEY (wallet_address, quest_id)
            );

            CREATE TABLE IF NOT EXISTS quest_rewards (
                wallet_address TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                reward_points INTEGER NOT NULL,
                issued_at INTEGER NOT NULL,
                PRIMARY KEY (wallet_address, quest_id)
            );

            CREATE TABLE IF NOT EXISTS payment_claims (
                route TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                claimed_at INTEGER NOT NULL,
                PRIMARY KEY (route, tx_hash)
            );

            CREATE TABLE IF NOT EXISTS news_items (
                source_tx_hash TEXT NOT NULL,
                source_log_index INTEGER NOT NULL,
                category TEXT NOT NULL,
                headline TEXT NOT NULL,
                body TEXT NOT NULL,
                published_at TEXT NOT NULL,
                PRIMARY KEY (source_tx_hash, source_log_index)
            );

            CREATE TABLE IF NOT EXISTS consumer_cursors (
                consumer TEXT PRIMARY KEY,
                position INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chain_events_time ON chain_events(occurred_at);
            CREATE INDEX IF NOT EXISTS idx_chain_events_type_time ON chain_events(event_type, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_chain_events_actor_time ON chain_events(actor, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_revenue_time ON revenue_transactions(recorded_at);
            CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', '1970-01-01T00:00:00Z')",
            [],
        )?;

        Ok(())
    }

    /// Appends a decoded batch and every per-event derived row in ONE
    /// transaction, then advances the indexer cursor in the same transaction.
    /// Derived rows (revenue, referral, presence) are written only for events
    /// whose insert reported `Created`, so re-ingesting a range never
    /// double-counts. A storage failure rolls the whole batch back and leaves
    /// the cursor where it was.
    pub fn ingest_batch(
        &mut self,
        events: &[ChainEvent],
        cursor_to: u64,
    ) -> Result<IngestReport, StoreError> {
        let tx = self.conn.transaction()?;
        let mut report = IngestReport::default();

        for event in events {
            let actor = normalize_address(&event.actor);
            let target = event.target.as_deref().map(normalize_address);

            let changes = tx.execute(
                "INSERT OR IGNORE INTO chain_events (
                    tx_hash,
                    log_index,
                    block_number,
                    event_type,
                    actor,
                    target,
                    fee_paid,
                    occurred_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.tx_hash,
                    i64::try_from(event.log_index).unwrap_or(i64::MAX),
                    i64::try_from(event.block_number).unwrap_or(i64::MAX),
                    event.event_type.as_str(),
                    actor,
                    target,
                    event.fee_paid,
                    event.occurred_at,
                ],
            )?;

            if changes == 0 {
                report.duplicates += 1;
                continue;
            }
            report.appended += 1;

            touch_user(&tx, &actor, event.occurred_at)?;

            if event.event_type == ChainEventType::Join {
                if let Some(referrer) = target.as_deref() {
                    if referrer != actor
                        && record_referral_tx(&tx, &actor, referrer, event.occurred_at)?
                            .is_created()
                    {
                        report.referrals_created += 1;
                    }
                }
            }

            if event.fee_paid > 0.0 {
                let outcome = tx.execute(
                    "INSERT OR IGNORE INTO revenue_transactions (
                        tx_hash, amount, kind, actor, recorded_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        event.tx_hash,
                        event.fee_paid,
                        RevenueKind::for_event(event.event_type).as_str(),
                        actor,
                        event.occurred_at,
                    ],
                )?;
                if InsertOutcome::from_changes(outcome).is_created() {
                    report.revenue_recorded += 1;
                }
                accrue_referral_fee_tx(&tx, &actor, event.fee_paid)?;
            }
        }

        advance_cursor_tx(&tx, CURSOR_INDEXER, cursor_to)?;
        tx.commit()?;
        Ok(report)
    }

    pub fn record_revenue(&self, record: &RevenueTransaction) -> Result<InsertOutcome, StoreError> {
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO revenue_transactions (
                tx_hash, amount, kind, actor, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.tx_hash,
                record.amount,
                record.kind.as_str(),
                normalize_address(&record.actor),
                record.recorded_at,
            ],
        )?;
        Ok(InsertOutcome::from_changes(changes))
    }

    /// Authoritative overwrite from the identity layer. The ledger never
    /// increments `shares` on its own.
    pub fn set_user_shares(
        &self,
        wallet_address: &str,
        shares: i64,
        farcaster_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let address = normalize_address(wallet_address);
        self.conn.execute(
            "INSERT INTO users (wallet_address, shares, farcaster_id, last_seen_at, active)
             VALUES (?1, ?2, ?3, 0, 1)
             ON CONFLICT(wallet_address) DO UPDATE SET
                shares = excluded.shares,
                farcaster_id = COALESCE(excluded.farcaster_id, users.farcaster_id)",
            params![address, shares, farcaster_id],
        )?;
        Ok(())
    }

    pub fn user(&self, wallet_address: &str) -> Result<Option<UserRecord>, StoreError> {
        let address = normalize_address(wallet_address);
        let row = self
            .conn
            .query_row(
                "SELECT wallet_address, shares, farcaster_id, last_seen_at, active
                 FROM users WHERE wallet_address = ?1",
                params![address],
                map_user,
            )
            .optional()?;
        Ok(row)
    }

    pub fn users_by_shares(&self, limit: usize) -> Result<Vec<UserRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, shares, farcaster_id, last_seen_at, active
             FROM users
             WHERE active = 1
             ORDER BY shares DESC, last_seen_at ASC, wallet_address ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], map_user)?;
        collect_rows(rows)
    }

    pub fn record_referral(
        &self,
        referee: &str,
        referrer: &str,
        joined_at: i64,
    ) -> Result<InsertOutcome, StoreError> {
        let referee = normalize_address(referee);
        let referrer = normalize_address(referrer);
        if referee == referrer {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO referrals (referee, referrer, joined_at)
             VALUES (?1, ?2, ?3)",
            params![referee, referrer, joined_at],
        )?;
        Ok(InsertOutcome::from_changes(changes))
    }

    pub fn referral_of(&self, referee: &str) -> Result<Option<ReferralRecord>, StoreError> {
        let referee = normalize_address(referee);
        let row = self
            .conn
            .query_row(
                "SELECT referee, referrer, joined_at, total_fees_paid, total_profit_share,
                        referral_points
                 FROM referrals WHERE referee = ?1",
                params![referee],
                map_referral,
            )
            .optional()?;
        Ok(row)
    }

    pub fn referrals_under(&self, referrer: &str) -> Result<Vec<ReferralRecord>, StoreError> {
        let referrer = normalize_address(referrer);
        let mut stmt = self.conn.prepare(
            "SELECT referee, referrer, joined_at, total_fees_paid, total_profit_share,
                    referral_points
             FROM referrals
             WHERE referrer = ?1
             ORDER BY joined_at ASC, referee ASC",
        )?;
        let rows = stmt.query_map(params![referrer], map_referral)?;
        collect_rows(rows)
    }

    pub fn cursor_position(&self, consumer: &str) -> Result<u64, StoreError> {
        let position: Option<i64> = self
            .conn
            .query_row(
                "SELECT position FROM consumer_cursors WHERE consumer = ?1",
                params![consumer],
                |row| row.get(0),
            )
            .optional()?;
        Ok(position.map(|value| value.max(0) as u64).unwrap_or(0))
    }

    pub fn advance_cursor(&self, consumer: &str, position: u64) -> Result<(), StoreError> {
        advance_cursor_tx(&self.conn, consumer, position)
    }

    pub fn latest_seq(&self) -> Result<u64, StoreError> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM chain_events", [], |row| row.get(0))?;
        Ok(seq.map(|value| value.max(0) as u64).unwrap_or(0))
    }

    pub fn events_after(
        &self,
        seq: u64,
        limit: usize,
    ) -> Result<Vec<(u64, ChainEvent)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, tx_hash, log_index, block_number, event_type, actor, target,
                    fee_paid, occurred_at
             FROM chain_events
             WHERE seq > ?1
             ORDER BY seq ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![seq as i64, limit as i64], |row| {
            let seq: i64 = row.get(0)?;
            Ok((seq.max(0) as u64, map_event_at(row, 1)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, raw) = row?;
            events.push((seq, finish_event(raw)?));
        }
        Ok(events)
    }

    pub fn events_in_window(&self, from: i64, to: i64) -> Result<Vec<ChainEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT tx_hash, log_index, block_number, event_type, actor, target,
                    fee_paid, occurred_at
             FROM chain_events
             WHERE occurred_at >= ?1 AND occurred_at < ?2
             ORDER BY occurred_at ASC, seq ASC",
        )?;
        let rows = stmt.query_map(params![from, to], |row| map_event_at(row, 0))?;
        collect_events(rows)
    }

    pub fn events_by_type_in_window(
        &self,
        event_types: &[ChainEventType],
        from: i64,
        to: i64,
    ) -> Result<Vec<ChainEvent>, StoreError> {
        let mut events = Vec::new();
        for event_type in event_types {
            let mut stmt = self.conn.prepare(
                "SELECT tx_hash, log_index, block_number, event_type, actor, target,
                        fee_paid, occurred_at
                 FROM chain_events
                 WHERE event_type = ?1 AND occurred_at >= ?2 AND occurred_at < ?3
                 ORDER BY occurred_at ASC, seq ASC",
            )?;
            let rows = stmt.query_map(params![event_type.as_str(), from, to], |row| {
                map_event_at(row, 0)
            })?;
            events.extend(collect_events(rows)?);
        }
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
                .then_with(|| a.log_index.cmp(&b.log_index))
        });
        Ok(events)
    }

    pub fn events_by_actor(
        &self,
        actor: &str,
        limit: usize,
    ) -> Result<Vec<ChainEvent>, StoreError> {
        let actor = normalize_address(actor);
        let mut stmt = self.conn.prepare(
            "SELECT tx_hash, log_index, block_number, event_type, actor, target,
                    fee_paid, occurred_at
             FROM chain_events
             WHERE actor = ?1
             ORDER BY occurred_at DESC, seq DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![actor, limit as i64], |row| map_event_at(row, 0))?;
        collect_events(rows)
    }

    pub fn count_events_by_actor(
        &self,
        actor: &str,
        event_type: ChainEventType,
    ) -> Result<u64, StoreError> {
        let actor = normalize_address(actor);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chain_events WHERE actor = ?1 AND event_type = ?2",
            params![actor, event_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn sum_fees_by_actor(&self, actor: &str) -> Result<f64, StoreError> {
        let actor = normalize_address(actor);
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(fee_paid) FROM chain_events WHERE actor = ?1",
            params![actor],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    pub fn revenue_in_window(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<RevenueTransaction>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT tx_hash, amount, kind, actor, recorded_at
             FROM revenue_transactions
             WHERE recorded_at >= ?1 AND recorded_at < ?2
             ORDER BY recorded_at ASC, tx_hash ASC",
        )?;
        let rows = stmt.query_map(params![from, to], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (tx_hash, amount, kind, actor, recorded_at) = row?;
            let kind = RevenueKind::parse(&kind)
                .ok_or_else(|| StoreError::Corrupt(format!("revenue kind {kind}")))?;
            records.push(RevenueTransaction {
                tx_hash,
                amount,
                kind,
                actor,
                recorded_at,
            });
        }
        Ok(records)
    }

    pub fn quest_progress_for(
        &self,
        wallet_address: &str,
    ) -> Result<Vec<QuestProgressRecord>, StoreError> {
        let address = normalize_address(wallet_address);
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, quest_id, state, progress, updated_seq
             FROM quest_progress
             WHERE wallet_address = ?1
             ORDER BY quest_id ASC",
        )?;
        let rows = stmt.query_map(params![address], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (wallet_address, quest_id, state, progress, updated_seq) = row?;
            let state = QuestState::parse(&state)
                .ok_or_else(|| StoreError::Corrupt(format!("quest state {state}")))?;
            records.push(QuestProgressRecord {
                wallet_address,
                quest_id,
                state,
                progress,
                updated_seq: updated_seq.max(0) as u64,
            });
        }
        Ok(records)
    }

    /// Overwrites progress from recomputed ledger aggregates. A COMPLETED row
    /// is terminal: neither state nor progress moves after that transition.
    pub fn upsert_quest_progress(&self, record: &QuestProgressRecord) -> Result<(), StoreError> {
        let address = normalize_address(&record.wallet_address);
        self.conn.execute(
            "INSERT INTO quest_progress (wallet_address, quest_id, state, progress, updated_seq)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(wallet_address, quest_id) DO UPDATE SET
                state = excluded.state,
                progress = excluded.progress,
                updated_seq = excluded.updated_seq
             WHERE quest_progress.state != 'COMPLETED'",
            params![
                address,
                record.quest_id,
                record.state.as_str(),
                record.progress,
                i64::try_from(record.updated_seq).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(())
    }

    /// The IN_PROGRESS -> COMPLETED transition. The returned bool is the
    /// transition witness: true exactly once per (user, quest) across any
    /// number of overlapping invocations.
    pub fn complete_quest(
        &self,
        wallet_address: &str,
        quest_id: &str,
        updated_seq: u64,
    ) -> Result<bool, StoreError> {
        let address = normalize_address(wallet_address);
        let changes = self.conn.execute(
            "UPDATE quest_progress
             SET state = 'COMPLETED', updated_seq = ?3
             WHERE wallet_address = ?1 AND quest_id = ?2 AND state != 'COMPLETED'",
            params![
                address,
                quest_id,
                i64::try_from(updated_seq).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(changes == 1)
    }

    pub fn issue_quest_reward(
        &self,
        wallet_address: &str,
        quest_id: &str,
        reward_points: i64,
        issued_at: i64,
    ) -> Result<InsertOutcome, StoreError> {
        let address = normalize_address(wallet_address);
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO quest_rewards (wallet_address, quest_id, reward_points, issued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![address, quest_id, reward_points, issued_at],
        )?;
        Ok(InsertOutcome::from_changes(changes))
    }

    pub fn reward_points_total(&self, wallet_address: &str) -> Result<i64, StoreError> {
        let address = normalize_address(wallet_address);
        let total: Option<i64> = self.conn.query_row(
            "SELECT SUM(reward_points) FROM quest_rewards WHERE wallet_address = ?1",
            params![address],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }

    /// Atomic insert-or-fail replay guard for paid routes. Never implemented
    /// as a read followed by a write: the unique constraint IS the check.
    pub fn claim_payment(
        &self,
        route: &str,
        tx_hash: &str,
        claimed_at: i64,
    ) -> Result<InsertOutcome, StoreError> {
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO payment_claims (route, tx_hash, claimed_at)
             VALUES (?1, ?2, ?3)",
            params![route, tx_hash, claimed_at],
        )?;
        Ok(InsertOutcome::from_changes(changes))
    }

    pub fn insert_news(&self, item: &NewsItem) -> Result<InsertOutcome, StoreError> {
        let changes = self.conn.execute(
            "INSERT OR IGNORE INTO news_items (
                source_tx_hash, source_log_index, category, headline, body, published_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.source_tx_hash,
                i64::try_from(item.source_log_index).unwrap_or(i64::MAX),
                item.category,
                item.headline,
                item.body,
                item.published_at,
            ],
        )?;
        Ok(InsertOutcome::from_changes(changes))
    }

    pub fn recent_news(&self, limit: usize) -> Result<Vec<NewsItem>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT source_tx_hash, source_log_index, category, headline, body, published_at
             FROM news_items
             ORDER BY published_at DESC, source_tx_hash DESC, source_log_index DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(NewsItem {
                source_tx_hash: row.get(0)?,
                source_log_index: row.get::<_, i64>(1)?.max(0) as u64,
                category: row.get(2)?,
                headline: row.get(3)?,
                body: row.get(4)?,
                published_at: row.get(5)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn touch_user(tx: &Transaction<'_>, address: &str, occurred_at: i64) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO users (wallet_address, shares, last_seen_at, active)
         VALUES (?1, 0, ?2, 1)
         ON CONFLICT(wallet_address) DO UPDATE SET
            last_seen_at = MAX(users.last_seen_at, excluded.last_seen_at),
            active = 1",
        params![address, occurred_at],
    )?;
    Ok(())
}

fn record_referral_tx(
    tx: &Transaction<'_>,
    referee: &str,
    referrer: &str,
    joined_at: i64,
) -> Result<InsertOutcome, StoreError> {
    let changes = tx.execute(
        "INSERT OR IGNORE INTO referrals (referee, referrer, joined_at)
         VALUES (?1, ?2, ?3)",
        params![referee, referrer, joined_at],
    )?;
    Ok(InsertOutcome::from_changes(changes))
}

fn accrue_referral_fee_tx(
    tx: &Transaction<'_>,
    referee: &str,
    fee_paid: f64,
) -> Result<(), StoreError> {
    // Referral points accrue one per fee-bearing action of the referee.
    tx.execute(
        "UPDATE referrals
         SET total_fees_paid = total_fees_paid + ?2,
             referral_points = referral_points + 1
         WHERE referee = ?1",
        params![referee, fee_paid],
    )?;
    Ok(())
}

fn advance_cursor_tx(
    conn: &Connection,
    consumer: &str,
    position: u64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO consumer_cursors (consumer, position) VALUES (?1, ?2)
         ON CONFLICT(consumer) DO UPDATE SET
            position = MAX(consumer_cursors.position, excluded.position)",
        params![consumer, i64::try_from(position).unwrap_or(i64::MAX)],
    )?;
    Ok(())
}

struct RawEvent {
    tx_hash: String,
    log_index: i64,
    block_number: i64,
    event_type: String,
    actor: String,
    target: Option<String>,
    fee_paid: f64,
    occurred_at: i64,
}

fn map_event_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        tx_hash: row.get(offset)?,
        log_index: row.get(offset + 1)?,
        block_number: row.get(offset + 2)?,
        event_type: row.get(offset + 3)?,
        actor: row.get(offset + 4)?,
        target: row.get(offset + 5)?,
        fee_paid: row.get(offset + 6)?,
        occurred_at: row.get(offset + 7)?,
    })
}

fn finish_event(raw: RawEvent) -> Result<ChainEvent, StoreError> {
    let event_type = ChainEventType::parse(&raw.event_type)
        .ok_or_else(|| StoreError::Corrupt(format!("event type {}", raw.event_type)))?;
    Ok(ChainEvent {
        tx_hash: raw.tx_hash,
        log_index: raw.log_index.max(0) as u64,
        block_number: raw.block_number.max(0) as u64,
        event_type,
        actor: raw.actor,
        target: raw.target,
        fee_paid: raw.fee_paid,
        occurred_at: raw.occurred_at,
    })
}

fn collect_events(
    rows: impl Iterator<Item = rusqlite::Result<RawEvent>>,
) -> Result<Vec<ChainEvent>, StoreError> {
    let mut events = Vec::new();
    for row in rows {
        events.push(finish_event(row?)?);
    }
    Ok(events)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        wallet_address: row.get(0)?,
        shares: row.get(1)?,
        farcaster_id: row.get(2)?,
        last_seen_at: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
    })
}

fn map_referral(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReferralRecord> {
    Ok(ReferralRecord {
        referee: row.get(0)?,
        referrer: row.get(1)?,
        joined_at: row.get(2)?,
        total_fees_paid: row.get(3)?,
        total_profit_share: row.get(4)?,
        referral_points: row.get(5)?,
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>, StoreError> {
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row?);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raid(tx_hash: &str, log_index: u64, actor: &str, fee: f64, at: i64) -> ChainEvent {
        ChainEvent {
            tx_hash: tx_hash.to_string(),
            log_index,
            block_number: 100,
            event_type: ChainEventType::Raid,
            actor: actor.to_string(),
            target: None,
            fee_paid: fee,
            occurred_at: at,
        }
    }

    fn join(tx_hash: &str, actor: &str, referrer: Option<&str>, at: i64) -> ChainEvent {
        ChainEvent {
            tx_hash: tx_hash.to_string(),
            log_index: 0,
            block_number: 99,
            event_type: ChainEventType::Join,
            actor: actor.to_string(),
            target: referrer.map(str::to_string),
            fee_paid: 0.001,
            occurred_at: at,
        }
    }

    #[test]
    fn reingesting_a_batch_appends_each_key_once() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        let batch = vec![
            raid("0xaa", 0, "0xA1", 0.002, 1_000),
            raid("0xaa", 1, "0xA1", 0.003, 1_000),
            raid("0xbb", 0, "0xB2", 0.004, 1_001),
        ];

        let first = store.ingest_batch(&batch, 100).expect("first ingest");
        assert_eq!(first.appended, 3);
        assert_eq!(first.duplicates, 0);

        let second = store.ingest_batch(&batch, 100).expect("second ingest");
        assert_eq!(second.appended, 0);
        assert_eq!(second.duplicates, 3);

        let events = store.events_after(0, 100).expect("read back");
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn revenue_is_recorded_once_per_tx_hash() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        let record = RevenueTransaction {
            tx_hash: "0xcc".to_string(),
            amount: 0.005,
            kind: RevenueKind::RaidFee,
            actor: "0xa1".to_string(),
            recorded_at: 2_000,
        };

        assert_eq!(
            store.record_revenue(&record).expect("first"),
            InsertOutcome::Created
        );
        assert_eq!(
            store.record_revenue(&record).expect("second"),
            InsertOutcome::AlreadyExists
        );

        let rows = store.revenue_in_window(0, 10_000).expect("window");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 0.005);
    }

    #[test]
    fn referral_fee_accrual_survives_replay_without_double_counting() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        let batch = vec![
            join("0x01", "0xRecruit", Some("0xCaptain"), 500),
            raid("0x02", 0, "0xRecruit", 0.01, 600),
        ];

        store.ingest_batch(&batch, 10).expect("first");
        store.ingest_batch(&batch, 10).expect("replay");

        let referral = store
            .referral_of("0xRECRUIT")
            .expect("query")
            .expect("referral exists");
        assert_eq!(referral.referrer, "0xcaptain");
        // join fee + raid fee, counted exactly once each
        assert!((referral.total_fees_paid - 0.011).abs() < 1e-12);
        assert_eq!(referral.referral_points, 2);
    }

    #[test]
    fn self_referral_is_refused() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        let outcome = store
            .record_referral("0xSame", "0xsame", 100)
            .expect("record");
        assert_eq!(outcome, InsertOutcome::AlreadyExists);
        assert!(store.referral_of("0xsame").expect("query").is_none());
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store.advance_cursor("quests", 40).expect("first");
        store.advance_cursor("quests", 25).expect("stale write");
        assert_eq!(store.cursor_position("quests").expect("read"), 40);
    }

    #[test]
    fn payment_claim_blocks_replay() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        assert_eq!(
            store
                .claim_payment("/api/v1/intel", "0xdd", 3_000)
                .expect("claim"),
            InsertOutcome::Created
        );
        assert_eq!(
            store
                .claim_payment("/api/v1/intel", "0xdd", 3_001)
                .expect("replay"),
            InsertOutcome::AlreadyExists
        );
        // Same proof on a different route is a fresh claim.
        assert_eq!(
            store
                .claim_payment("/api/v1/raids/suggest", "0xdd", 3_002)
                .expect("other route"),
            InsertOutcome::Created
        );
    }

    #[test]
    fn quest_completion_transition_fires_once() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .upsert_quest_progress(&QuestProgressRecord {
                wallet_address: "0xa1".to_string(),
                quest_id: "first_raid".to_string(),
                state: QuestState::InProgress,
                progress: 1.0,
                updated_seq: 5,
            })
            .expect("seed progress");

        assert!(store.complete_quest("0xa1", "first_raid", 6).expect("first"));
        assert!(!store.complete_quest("0xa1", "first_raid", 7).expect("second"));

        assert_eq!(
            store
                .issue_quest_reward("0xa1", "first_raid", 50, 4_000)
                .expect("issue"),
            InsertOutcome::Created
        );
        assert_eq!(
            store
                .issue_quest_reward("0xa1", "first_raid", 50, 4_001)
                .expect("reissue"),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.reward_points_total("0xa1").expect("total"), 50);
    }

    #[test]
    fn completed_progress_rows_are_terminal() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .upsert_quest_progress(&QuestProgressRecord {
                wallet_address: "0xa1".to_string(),
                quest_id: "turncoat".to_string(),
                state: QuestState::Completed,
                progress: 1.0,
                updated_seq: 3,
            })
            .expect("seed completed");

        store
            .upsert_quest_progress(&QuestProgressRecord {
                wallet_address: "0xa1".to_string(),
                quest_id: "turncoat".to_string(),
                state: QuestState::InProgress,
                progress: 0.0,
                updated_seq: 9,
            })
            .expect("attempt downgrade");

        let rows = store.quest_progress_for("0xa1").expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, QuestState::Completed);
        assert_eq!(rows[0].progress, 1.0);
    }

    #[test]
    fn addresses_are_case_insensitive() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .set_user_shares("0xABCDEF", 120, Some("fid:9"))
            .expect("upper");
        store.set_user_shares("0xabcdef", 150, None).expect("lower");

        let user = store.user("0xAbCdEf").expect("query").expect("exists");
        assert_eq!(user.wallet_address, "0xabcdef");
        assert_eq!(user.shares, 150);
        assert_eq!(user.farcaster_id.as_deref(), Some("fid:9"));
    }

    #[test]
    fn shares_are_overwritten_not_accumulated() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store.set_user_shares("0xa1", 10, None).expect("first");
        store.set_user_shares("0xa1", 10, None).expect("same again");
        let user = store.user("0xa1").expect("query").expect("exists");
        assert_eq!(user.shares, 10);
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        assert!(store.setting("news.min_fee").expect("missing").is_none());
        store.save_setting("news.min_fee", "0.01").expect("save");
        store.save_setting("news.min_fee", "0.02").expect("overwrite");
        assert_eq!(
            store.setting("news.min_fee").expect("read").as_deref(),
            Some("0.02")
        );
    }
}
