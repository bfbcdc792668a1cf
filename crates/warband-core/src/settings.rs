//! Ledger-scoped settings behind an injected get/save repository, so no
//! component reaches for process-wide mutable state.

use crate::store::{SqliteLedgerStore, StoreError};

pub const SETTING_NEWS_MIN_FEE: &str = "news.min_fee";
pub const SETTING_INDEXER_START_BLOCK: &str = "indexer.start_block";

pub const DEFAULT_NEWS_MIN_FEE: f64 = 0.01;

pub trait SettingsRepository {
    fn setting(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl SettingsRepository for SqliteLedgerStore {
    fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        SqliteLedgerStore::setting(self, key)
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        SqliteLedgerStore::save_setting(self, key, value)
    }
}

/// Minimum fee for an event to make the news. Unparseable stored values fall
/// back to the default rather than poisoning every generator run.
pub fn news_min_fee(repo: &impl SettingsRepository) -> Result<f64, StoreError> {
    Ok(repo
        .setting(SETTING_NEWS_MIN_FEE)?
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(DEFAULT_NEWS_MIN_FEE))
}

pub fn set_news_min_fee(repo: &impl SettingsRepository, value: f64) -> Result<(), StoreError> {
    repo.save_setting(SETTING_NEWS_MIN_FEE, &value.to_string())
}

/// First block the indexer should scan when no cursor exists yet.
pub fn indexer_start_block(repo: &impl SettingsRepository) -> Result<u64, StoreError> {
    Ok(repo
        .setting(SETTING_INDEXER_START_BLOCK)?
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0))
}

pub fn set_indexer_start_block(
    repo: &impl SettingsRepository,
    block: u64,
) -> Result<(), StoreError> {
    repo.save_setting(SETTING_INDEXER_START_BLOCK, &block.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_min_fee_defaults_when_unset() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        assert_eq!(news_min_fee(&store).expect("read"), DEFAULT_NEWS_MIN_FEE);
    }

    #[test]
    fn news_min_fee_round_trips() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        set_news_min_fee(&store, 0.05).expect("save");
        assert_eq!(news_min_fee(&store).expect("read"), 0.05);
    }

    #[test]
    fn garbage_setting_falls_back_to_default() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .save_setting(SETTING_NEWS_MIN_FEE, "not-a-number")
            .expect("save garbage");
        assert_eq!(news_min_fee(&store).expect("read"), DEFAULT_NEWS_MIN_FEE);

        store
            .save_setting(SETTING_NEWS_MIN_FEE, "-4")
            .expect("save negative");
        assert_eq!(news_min_fee(&store).expect("read"), DEFAULT_NEWS_MIN_FEE);
    }

    #[test]
    fn start_block_round_trips() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        assert_eq!(indexer_start_block(&store).expect("default"), 0);
        set_indexer_start_block(&store, 18_000_000).expect("save");
        assert_eq!(indexer_start_block(&store).expect("read"), 18_000_000);
    }
}
