//! Read-time aggregation over the ledger. Every function here is a pure
//! function of the ledger snapshot and its explicit arguments — no carry-over
//! state, so callers may cache results behind a short TTL or fan out
//! concurrent reads without any coordination.

use std::collections::{BTreeMap, HashSet};

use contracts::{
    ChainEventType, ClanTreeNode, LeaderboardEntry, MostWantedEntry, RaidPulse, RaidSuggestion,
    RevenueSummary,
};

use crate::store::{normalize_address, SqliteLedgerStore, StoreError};

pub const MIN_WINDOW_HOURS: u64 = 1;
pub const MAX_WINDOW_HOURS: u64 = 168;
pub const MAX_CLAN_DEPTH: u64 = 8;

pub fn clamp_window_hours(hours: u64) -> u64 {
    hours.clamp(MIN_WINDOW_HOURS, MAX_WINDOW_HOURS)
}

/// The actual threat formula is a game-balance rule owned elsewhere; this
/// seam keeps the view engine pure while the weights are decided.
pub trait ThreatScoring {
    fn score(&self, raid_count: u64, high_stakes_count: u64, fees_in_window: f64) -> f64;
}

/// Stand-in weighting: deterministic, monotonic in every input.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeWeightedScoring;

impl ThreatScoring for FeeWeightedScoring {
    fn score(&self, raid_count: u64, high_stakes_count: u64, fees_in_window: f64) -> f64 {
        raid_count as f64 + 3.0 * high_stakes_count as f64 + 40.0 * fees_in_window
    }
}

pub fn leaderboard(
    store: &SqliteLedgerStore,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let users = store.users_by_shares(limit)?;
    Ok(users
        .into_iter()
        .enumerate()
        .map(|(index, user)| LeaderboardEntry {
            rank: index as u32 + 1,
            wallet_address: user.wallet_address,
            shares: user.shares,
            farcaster_id: user.farcaster_id,
        })
        .collect())
}

pub fn most_wanted(
    store: &SqliteLedgerStore,
    limit: usize,
    window_hours: u64,
    now_unix: i64,
    scoring: &dyn ThreatScoring,
) -> Result<Vec<MostWantedEntry>, StoreError> {
    let hours = clamp_window_hours(window_hours);
    let from = now_unix - (hours as i64) * 3_600;
    let raids = store.events_by_type_in_window(
        &[ChainEventType::Raid, ChainEventType::HighStakesRaid],
        from,
        now_unix + 1,
    )?;

    let mut by_actor: BTreeMap<String, (u64, u64, f64)> = BTreeMap::new();
    for event in raids {
        let entry = by_actor.entry(event.actor).or_insert((0, 0, 0.0));
        match event.event_type {
            ChainEventType::HighStakesRaid => entry.1 += 1,
            _ => entry.0 += 1,
        }
        entry.2 += event.fee_paid;
    }

    let mut entries: Vec<MostWantedEntry> = by_actor
        .into_iter()
        .map(
            |(wallet_address, (raid_count, high_stakes_count, fees_in_window))| MostWantedEntry {
                score: scoring.score(raid_count, high_stakes_count, fees_in_window),
                wallet_address,
                raid_count,
                high_stakes_count,
                fees_in_window,
            },
        )
        .collect();

    // Score descending, wallet ascending: a stable total order on ties.
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.wallet_address.cmp(&b.wallet_address))
    });
    entries.truncate(limit);
    Ok(entries)
}

/// Walks the referral forest downward from `address`. The forest cannot
/// contain cycles by construction, but a data-integrity violation must not
/// hang a read path, so traversal tracks visited nodes and refuses repeats.
pub fn clan_tree(
    store: &SqliteLedgerStore,
    address: &str,
    depth: u64,
) -> Result<ClanTreeNode, StoreError> {
    let root = normalize_address(address);
    let depth = depth.min(MAX_CLAN_DEPTH);
    let mut visited = HashSet::new();
    build_clan_node(store, &root, depth, &mut visited)
}

fn build_clan_node(
    store: &SqliteLedgerStore,
    address: &str,
    depth_remaining: u64,
    visited: &mut HashSet<String>,
) -> Result<ClanTreeNode, StoreError> {
    visited.insert(address.to_string());

    let own_referral = store.referral_of(address)?;
    let joined_at = match &own_referral {
        Some(referral) => referral.joined_at,
        None => store
            .user(address)?
            .map(|user| user.last_seen_at)
            .unwrap_or(0),
    };
    let referral_points = own_referral
        .map(|referral| referral.referral_points)
        .unwrap_or(0);

    let mut recruits = Vec::new();
    if depth_remaining > 0 {
        for referral in store.referrals_under(address)? {
            if visited.contains(&referral.referee) {
                continue;
            }
            recruits.push(build_clan_node(
                store,
                &referral.referee,
                depth_remaining - 1,
                visited,
            )?);
        }
    }

    Ok(ClanTreeNode {
        wallet_address: address.to_string(),
        joined_at,
        referral_points,
        recruits,
    })
}

pub fn revenue_summary(
    store: &SqliteLedgerStore,
    window_hours: u64,
    now_unix: i64,
) -> Result<RevenueSummary, StoreError> {
    let hours = clamp_window_hours(window_hours);
    let from = now_unix - (hours as i64) * 3_600;
    let records = store.revenue_in_window(from, now_unix + 1)?;

    let mut by_kind: BTreeMap<String, f64> = BTreeMap::new();
    let mut revenue = 0.0;
    for record in &records {
        revenue += record.amount;
        *by_kind.entry(record.kind.as_str().to_string()).or_insert(0.0) += record.amount;
    }

    Ok(RevenueSummary {
        window_hours: hours,
        revenue,
        count: records.len() as u64,
        by_kind,
    })
}

pub fn raid_pulse(
    store: &SqliteLedgerStore,
    window_hours: u64,
    now_unix: i64,
) -> Result<RaidPulse, StoreError> {
    let hours = clamp_window_hours(window_hours);
    let from = now_unix - (hours as i64) * 3_600;
    let raids = store.events_by_type_in_window(
        &[ChainEventType::Raid, ChainEventType::HighStakesRaid],
        from,
        now_unix + 1,
    )?;

    let mut raid_count = 0;
    let mut high_stakes = 0;
    let mut raiders = HashSet::new();
    for event in &raids {
        match event.event_type {
            ChainEventType::HighStakesRaid => high_stakes += 1,
            _ => raid_count += 1,
        }
        raiders.insert(event.actor.clone());
    }

    Ok(RaidPulse {
        window_hours: hours,
        raids: raid_count,
        high_stakes_raids: high_stakes,
        unique_raiders: raiders.len() as u64,
    })
}

/// Picks a raid target for `for_address` from recent raid activity. The
/// confidence/gain numbers come from the same stand-in scoring seam as
/// `most_wanted`; the real selection rule is a game-balance decision owned
/// elsewhere.
pub fn suggest_raid_target(
    store: &SqliteLedgerStore,
    for_address: &str,
    window_hours: u64,
    now_unix: i64,
    scoring: &dyn ThreatScoring,
) -> Result<Option<RaidSuggestion>, StoreError> {
    let asker = normalize_address(for_address);
    let wanted = most_wanted(store, 16, window_hours, now_unix, scoring)?;

    let Some(pick) = wanted
        .into_iter()
        .find(|entry| entry.wallet_address != asker)
    else {
        return Ok(None);
    };

    let confidence = (pick.score / (pick.score + 25.0)).clamp(0.05, 0.95);
    let expected_gain = pick.fees_in_window * 0.5;
    let rationale = format!(
        "{} raided {} times in the last {}h",
        pick.wallet_address,
        pick.raid_count + pick.high_stakes_count,
        clamp_window_hours(window_hours)
    );

    Ok(Some(RaidSuggestion {
        target: pick.wallet_address,
        confidence,
        expected_gain,
        rationale,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ChainEvent;

    const NOW: i64 = 1_700_100_000;

    fn event(tag: u8, event_type: ChainEventType, actor: &str, fee: f64, at: i64) -> ChainEvent {
        ChainEvent {
            tx_hash: format!("0x{}", hex::encode([tag; 32])),
            log_index: 0,
            block_number: tag as u64,
            event_type,
            actor: actor.to_string(),
            target: None,
            fee_paid: fee,
            occurred_at: at,
        }
    }

    #[test]
    fn window_hours_clamp_to_defined_range() {
        assert_eq!(clamp_window_hours(0), 1);
        assert_eq!(clamp_window_hours(24), 24);
        assert_eq!(clamp_window_hours(4_000), 168);
    }

    #[test]
    fn leaderboard_is_a_stable_total_order() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store.set_user_shares("0xcc", 50, None).expect("user");
        store.set_user_shares("0xaa", 100, None).expect("user");
        store.set_user_shares("0xbb", 100, None).expect("user");

        let first = leaderboard(&store, 10).expect("first");
        let second = leaderboard(&store, 10).expect("second");
        assert_eq!(first, second);

        // Equal shares and equal last_seen fall back to address order.
        let order: Vec<&str> = first
            .iter()
            .map(|entry| entry.wallet_address.as_str())
            .collect();
        assert_eq!(order, vec!["0xaa", "0xbb", "0xcc"]);
        assert_eq!(first[0].rank, 1);
        assert_eq!(first[2].rank, 3);
    }

    #[test]
    fn most_wanted_scores_only_the_trailing_window() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .ingest_batch(
                &[
                    event(1, ChainEventType::Raid, "0xa1", 0.002, NOW - 600),
                    event(2, ChainEventType::HighStakesRaid, "0xa2", 0.02, NOW - 300),
                    // Ancient raid outside any clamped window.
                    event(3, ChainEventType::Raid, "0xa3", 0.9, NOW - 400 * 3_600),
                ],
                10,
            )
            .expect("seed");

        let entries =
            most_wanted(&store, 10, 24, NOW, &FeeWeightedScoring).expect("most wanted");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].wallet_address, "0xa2");
        assert_eq!(entries[0].high_stakes_count, 1);
        assert!(entries[0].score > entries[1].score);
    }

    #[test]
    fn clan_tree_survives_a_referral_cycle() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        // Artificial integrity violation: a <-> b refer each other.
        store.record_referral("0xbb", "0xaa", 100).expect("a->b");
        store.record_referral("0xaa", "0xbb", 101).expect("b->a");
        store.record_referral("0xcc", "0xbb", 102).expect("b->c");

        let tree = clan_tree(&store, "0xAA", 10).expect("tree");
        assert_eq!(tree.wallet_address, "0xaa");
        assert_eq!(tree.recruits.len(), 1);
        let recruit = &tree.recruits[0];
        assert_eq!(recruit.wallet_address, "0xbb");

        // b's walk must not revisit a, only descend to c.
        let names: Vec<&str> = recruit
            .recruits
            .iter()
            .map(|node| node.wallet_address.as_str())
            .collect();
        assert_eq!(names, vec!["0xcc"]);
    }

    #[test]
    fn clan_tree_depth_bound_is_respected() {
        let store = SqliteLedgerStore::open_in_memory().expect("open");
        store.record_referral("0xb1", "0xa1", 100).expect("edge");
        store.record_referral("0xc1", "0xb1", 101).expect("edge");

        let tree = clan_tree(&store, "0xa1", 1).expect("tree");
        assert_eq!(tree.recruits.len(), 1);
        assert!(tree.recruits[0].recruits.is_empty());
    }

    #[test]
    fn revenue_summary_counts_each_transaction_once() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        let raid = event(7, ChainEventType::Raid, "0xa1", 0.005, NOW - 3_600);

        store.ingest_batch(&[raid.clone()], 5).expect("ingest");
        let summary = revenue_summary(&store, 24, NOW).expect("summary");
        assert_eq!(summary.count, 1);
        assert!((summary.revenue - 0.005).abs() < 1e-12);
        assert_eq!(summary.by_kind.get("raid_fee"), Some(&0.005));

        // Re-ingesting the identical event must not move any aggregate.
        store.ingest_batch(&[raid], 5).expect("replay");
        let replayed = revenue_summary(&store, 24, NOW).expect("summary again");
        assert_eq!(replayed, summary);
    }

    #[test]
    fn raid_pulse_counts_unique_raiders() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .ingest_batch(
                &[
                    event(11, ChainEventType::Raid, "0xa1", 0.001, NOW - 100),
                    event(12, ChainEventType::Raid, "0xa1", 0.001, NOW - 90),
                    event(13, ChainEventType::HighStakesRaid, "0xa2", 0.01, NOW - 80),
                ],
                20,
            )
            .expect("seed");

        let pulse = raid_pulse(&store, 24, NOW).expect("pulse");
        assert_eq!(pulse.raids, 2);
        assert_eq!(pulse.high_stakes_raids, 1);
        assert_eq!(pulse.unique_raiders, 2);
    }

    #[test]
    fn raid_suggestion_skips_the_asker() {
        let mut store = SqliteLedgerStore::open_in_memory().expect("open");
        store
            .ingest_batch(
                &[
                    event(21, ChainEventType::HighStakesRaid, "0xa1", 0.05, NOW - 100),
                    event(22, ChainEventType::Raid, "0xa2", 0.001, NOW - 90),
                ],
                30,
            )
            .expect("seed");

        let suggestion = suggest_raid_target(&store, "0xA1", 24, NOW, &FeeWeightedScoring)
            .expect("suggest")
            .expect("someone to raid");
        assert_eq!(suggestion.target, "0xa2");
        assert!(suggestion.confidence > 0.0 && suggestion.confidence < 1.0);

        let nobody = suggest_raid_target(&store, "0xa2", 24, NOW, &FeeWeightedScoring)
            .expect("suggest")
            .expect("a1 is raidable");
        assert_eq!(nobody.target, "0xa1");
    }
}
