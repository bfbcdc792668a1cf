use chrono::{DateTime, SecondsFormat};
use contracts::{ChainEvent, ChainEventType, NewsItem, CURSOR_NEWS};
use tracing::info;

use crate::settings;
use crate::store::{SqliteLedgerStore, StoreError};

const EVENT_BATCH: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewsRunReport {
    pub consumed: u64,
    pub generated: u64,
}

pub struct NewsGenerator;

impl NewsGenerator {
    /// Samples high-salience ledger entries past the `news` cursor into
    /// narrative items. The cursor is the generator's own consumption pointer;
    /// it never touches the indexer's or the quest engine's.
    pub fn generate_from_events(store: &SqliteLedgerStore) -> Result<NewsRunReport, StoreError> {
        let min_fee = settings::news_min_fee(store)?;
        let mut cursor = store.cursor_position(CURSOR_NEWS)?;
        let mut report = NewsRunReport::default();

        loop {
            let batch = store.events_after(cursor, EVENT_BATCH)?;
            if batch.is_empty() {
                break;
            }

            for (seq, event) in batch {
                if is_salient(&event, min_fee) {
                    let item = render_news(&event);
                    if store.insert_news(&item)?.is_created() {
                        report.generated += 1;
                    }
                }
                cursor = seq;
                report.consumed += 1;
            }

            store.advance_cursor(CURSOR_NEWS, cursor)?;
        }

        if report.consumed > 0 {
            info!(
                consumed = report.consumed,
                generated = report.generated,
                "news run complete"
            );
        }
        Ok(report)
    }
}

fn is_salient(event: &ChainEvent, min_fee: f64) -> bool {
    matches!(
        event.event_type,
        ChainEventType::HighStakesRaid | ChainEventType::Betrayal
    ) || event.fee_paid >= min_fee
}

fn render_news(event: &ChainEvent) -> NewsItem {
    let actor = short_address(&event.actor);
    let target = event
        .target
        .as_deref()
        .map(short_address)
        .unwrap_or_else(|| "an unmarked camp".to_string());

    let (category, headline, body) = match event.event_type {
        ChainEventType::Join => (
            "arrivals",
            format!("New blood: {actor} joins the warband"),
            format!(
                "{actor} pledged to the banner, paying {:.4} in tribute on arrival.",
                event.fee_paid
            ),
        ),
        ChainEventType::Raid => (
            "raids",
            format!("{actor} rides against {target}"),
            format!(
                "A raiding party led by {actor} struck {target}, spending {:.4} on the assault.",
                event.fee_paid
            ),
        ),
        ChainEventType::HighStakesRaid => (
            "raids",
            format!("High-stakes raid: {actor} gambles it all"),
            format!(
                "{actor} mounted a high-stakes raid on {target} with {:.4} riding on the outcome.",
                event.fee_paid
            ),
        ),
        ChainEventType::Betrayal => (
            "treachery",
            format!("Betrayal in the ranks: {actor} turns cloak"),
            format!("{actor} turned on {target}. The clans will remember this."),
        ),
        ChainEventType::Claim => (
            "spoils",
            format!("{actor} collects the spoils"),
            format!("{actor} claimed their share of the war chest."),
        ),
    };

    NewsItem {
        source_tx_hash: event.tx_hash.clone(),
        source_log_index: event.log_index,
        category: category.to_string(),
        headline,
        body,
        published_at: iso_timestamp(event.occurred_at),
    }
}

fn short_address(address: &str) -> String {
    if address.len() > 12 {
        format!("{}..{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

fn iso_timestamp(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}
