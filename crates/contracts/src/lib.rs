//! v1 cross-boundary contracts for the ledger engine, API, and storage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Consumer names for the shared append-only event log. Each consumer owns an
/// independently advancing cursor row; none of them may share a name.
pub const CURSOR_INDEXER: &str = "indexer";
pub const CURSOR_QUESTS: &str = "quests";
pub const CURSOR_NEWS: &str = "news";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainEventType {
    Join,
    Raid,
    HighStakesRaid,
    Betrayal,
    Claim,
}

impl ChainEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Raid => "RAID",
            Self::HighStakesRaid => "HIGH_STAKES_RAID",
            Self::Betrayal => "BETRAYAL",
            Self::Claim => "CLAIM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "JOIN" => Some(Self::Join),
            "RAID" => Some(Self::Raid),
            "HIGH_STAKES_RAID" => Some(Self::HighStakesRaid),
            "BETRAYAL" => Some(Self::Betrayal),
            "CLAIM" => Some(Self::Claim),
            _ => None,
        }
    }
}

/// A normalized on-chain event. `(tx_hash, log_index)` is the natural key that
/// makes re-ingestion idempotent; everything else is payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainEvent {
    pub tx_hash: String,
    pub log_index: u64,
    #[serde(with = "serde_u64_string")]
    pub block_number: u64,
    pub event_type: ChainEventType,
    pub actor: String,
    pub target: Option<String>,
    pub fee_paid: f64,
    pub occurred_at: i64,
}

impl ChainEvent {
    pub fn event_id(&self) -> String {
        format!("{}:{}", self.tx_hash, self.log_index)
    }
}

/// Raw entry as exported by the chain relay, before normalization. Kept loose
/// on purpose: decoding is where malformed entries are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawLogEntry {
    #[serde(with = "serde_u64_string")]
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub kind: String,
    pub actor: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub fee_paid: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RevenueKind {
    JoinFee,
    RaidFee,
    HighStakesRaidFee,
    BetrayalFee,
    ClaimFee,
}

impl RevenueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinFee => "join_fee",
            Self::RaidFee => "raid_fee",
            Self::HighStakesRaidFee => "high_stakes_raid_fee",
            Self::BetrayalFee => "betrayal_fee",
            Self::ClaimFee => "claim_fee",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "join_fee" => Some(Self::JoinFee),
            "raid_fee" => Some(Self::RaidFee),
            "high_stakes_raid_fee" => Some(Self::HighStakesRaidFee),
            "betrayal_fee" => Some(Self::BetrayalFee),
            "claim_fee" => Some(Self::ClaimFee),
            _ => None,
        }
    }

    pub fn for_event(event_type: ChainEventType) -> Self {
        match event_type {
            ChainEventType::Join => Self::JoinFee,
            ChainEventType::Raid => Self::RaidFee,
            ChainEventType::HighStakesRaid => Self::HighStakesRaidFee,
            ChainEventType::Betrayal => Self::BetrayalFee,
            ChainEventType::Claim => Self::ClaimFee,
        }
    }
}

/// Money-bearing record keyed on `tx_hash`; uniqueness makes recording
/// idempotent no matter how many times the same transaction is reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueTransaction {
    pub tx_hash: String,
    pub amount: f64,
    pub kind: RevenueKind,
    pub actor: String,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub wallet_address: String,
    pub shares: i64,
    pub farcaster_id: Option<String>,
    pub last_seen_at: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralRecord {
    pub referee: String,
    pub referrer: String,
    pub joined_at: i64,
    pub total_fees_paid: f64,
    pub total_profit_share: f64,
    pub referral_points: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestState {
    NotStarted,
    InProgress,
    Completed,
}

impl QuestState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "NOT_STARTED" => Some(Self::NotStarted),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for QuestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestProgressRecord {
    pub wallet_address: String,
    pub quest_id: String,
    pub state: QuestState,
    pub progress: f64,
    pub updated_seq: u64,
}

/// Per-quest status line as reported to the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestStatusEntry {
    pub quest_id: String,
    pub title: String,
    pub state: QuestState,
    pub progress: f64,
    pub target: f64,
    pub reward_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub source_tx_hash: String,
    pub source_log_index: u64,
    pub category: String,
    pub headline: String,
    pub body: String,
    pub published_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub wallet_address: String,
    pub shares: i64,
    pub farcaster_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MostWantedEntry {
    pub wallet_address: String,
    pub score: f64,
    pub raid_count: u64,
    pub high_stakes_count: u64,
    pub fees_in_window: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClanTreeNode {
    pub wallet_address: String,
    pub joined_at: i64,
    pub referral_points: i64,
    pub recruits: Vec<ClanTreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueSummary {
    pub window_hours: u64,
    pub revenue: f64,
    pub count: u64,
    pub by_kind: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaidPulse {
    pub window_hours: u64,
    pub raids: u64,
    pub high_stakes_raids: u64,
    pub unique_raiders: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaidSuggestion {
    pub target: String,
    pub confidence: f64,
    pub expected_gain: f64,
    pub rationale: String,
}

/// Quote for one payment-gated route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteQuote {
    pub path: String,
    pub price: f64,
    pub description: String,
}

/// 402 response body: everything a caller needs to pay for a gated route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRequirements {
    pub schema_version: String,
    pub receiver: String,
    pub network: String,
    pub routes: Vec<RouteQuote>,
}

/// Payment proof supplied by the caller in the `x-payment` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentProof {
    pub tx_hash: String,
    pub amount: f64,
    pub receiver: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    InvalidQuery,
    PaymentRequired,
    PaymentRejected,
    MalformedPayment,
    NotFound,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_storage_form() {
        for event_type in [
            ChainEventType::Join,
            ChainEventType::Raid,
            ChainEventType::HighStakesRaid,
            ChainEventType::Betrayal,
            ChainEventType::Claim,
        ] {
            assert_eq!(ChainEventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(ChainEventType::parse("AIRDROP"), None);
    }

    #[test]
    fn event_type_serializes_screaming() {
        let raw = serde_json::to_string(&ChainEventType::HighStakesRaid).expect("serialize");
        assert_eq!(raw, r#""HIGH_STAKES_RAID""#);
    }

    #[test]
    fn raw_log_entry_accepts_missing_optional_fields() {
        let entry: RawLogEntry = serde_json::from_str(
            r#"{"block_number":"100","tx_hash":"0xabc","log_index":0,"kind":"JOIN","actor":"0x1","timestamp":1700000000}"#,
        )
        .expect("minimal entry");
        assert_eq!(entry.target, None);
        assert_eq!(entry.fee_paid, 0.0);
    }

    #[test]
    fn event_id_combines_natural_key() {
        let event = ChainEvent {
            tx_hash: "0xfeed".to_string(),
            log_index: 3,
            block_number: 12,
            event_type: ChainEventType::Raid,
            actor: "0xaaaa".to_string(),
            target: None,
            fee_paid: 0.001,
            occurred_at: 1_700_000_000,
        };
        assert_eq!(event.event_id(), "0xfeed:3");
    }

    #[test]
    fn quest_state_parse_rejects_unknown() {
        assert_eq!(QuestState::parse("IN_PROGRESS"), Some(QuestState::InProgress));
        assert_eq!(QuestState::parse("DONE"), None);
    }
}
