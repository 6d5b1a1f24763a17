//! Per-wallet aggregate features.
//!
//! Every feature is a pure function from the grouped records to one named
//! table keyed by wallet. A wallet missing from a table means "no matching
//! records"; the matrix assembler fills those gaps with 0. Divide-by-zero and
//! other non-finite outcomes collapse to 0 here and never surface as errors.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::types::{Action, WalletTransaction};

/// wallet → value. Ordered so every derived artifact is deterministic.
pub type FeatureTable = BTreeMap<String, f64>;

const MILLIS_PER_DAY: i64 = 86_400_000;
const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Canonical records grouped by wallet, in wallet-id order.
#[derive(Debug, Clone, Default)]
pub struct WalletGroups<'a> {
    groups: BTreeMap<&'a str, Vec<&'a WalletTransaction>>,
}

impl<'a> WalletGroups<'a> {
    pub fn group(records: &'a [WalletTransaction]) -> Self {
        let mut groups: BTreeMap<&'a str, Vec<&'a WalletTransaction>> = BTreeMap::new();
        for record in records {
            groups.entry(record.wallet_id.as_str()).or_default().push(record);
        }
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn wallets(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.groups.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &[&'a WalletTransaction])> + '_ {
        self.groups.iter().map(|(w, r)| (*w, r.as_slice()))
    }

    /// Build a table from a per-wallet aggregation, skipping wallets for which it yields `None`.
    fn table<F>(&self, mut aggregate: F) -> FeatureTable
    where
        F: FnMut(&[&'a WalletTransaction]) -> Option<f64>,
    {
        self.iter()
            .filter_map(|(wallet, records)| {
                aggregate(records).map(|v| (wallet.to_string(), finite_or_zero(v)))
            })
            .collect()
    }
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `numerator / denominator` when the denominator is positive, else 0.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        finite_or_zero(numerator / denominator)
    } else {
        0.0
    }
}

/// Whole days, floored like a calendar-less timedelta.
fn whole_days(delta: Duration) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos.div_euclid(NANOS_PER_DAY) as f64,
        None => delta.num_milliseconds().div_euclid(MILLIS_PER_DAY) as f64,
    }
}

/// Exact seconds including the sub-second part. Falls back to millisecond
/// precision for spans too wide for an `i64` of nanoseconds (~292 years).
fn total_seconds(delta: Duration) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

fn sum_for(records: &[&WalletTransaction], action: &Action) -> Option<f64> {
    let mut matched = records.iter().filter(|r| &r.action == action).peekable();
    matched.peek()?;
    Some(matched.map(|r| r.amount).sum())
}

fn amounts<'a>(records: &'a [&'a WalletTransaction]) -> impl Iterator<Item = f64> + 'a {
    records.iter().map(|r| r.amount)
}

fn lookup(table: &FeatureTable, wallet: &str) -> f64 {
    table.get(wallet).copied().unwrap_or(0.0)
}

// ============================================================
// Activity breadth
// ============================================================

/// Number of events. Defines the wallet universe of the matrix.
pub fn tx_count(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| Some(records.len() as f64))
}

pub fn unique_asset_count(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        let distinct: BTreeSet<&str> = records
            .iter()
            .filter_map(|r| r.asset_symbol.as_deref())
            .collect();
        Some(distinct.len() as f64)
    })
}

pub fn unique_pool_count(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        let distinct: BTreeSet<&str> = records.iter().filter_map(|r| r.pool_id.as_deref()).collect();
        Some(distinct.len() as f64)
    })
}

// ============================================================
// Lending flows
// ============================================================

pub fn total_deposit(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| sum_for(records, &Action::Deposit))
}

pub fn total_borrow(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| sum_for(records, &Action::Borrow))
}

pub fn total_repay(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| sum_for(records, &Action::Repay))
}

/// Liquidation events per wallet. Intermediate for `liquidation_rate`.
pub fn liquidation_count(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        let count = records
            .iter()
            .filter(|r| r.action == Action::LiquidationCall)
            .count();
        (count > 0).then_some(count as f64)
    })
}

/// Deposits over borrows. 0 without borrowing history, never infinite.
pub fn deposit_to_borrow_ratio(groups: &WalletGroups) -> FeatureTable {
    let deposits = total_deposit(groups);
    let borrows = total_borrow(groups);
    groups
        .wallets()
        .map(|w| (w.to_string(), safe_ratio(lookup(&deposits, w), lookup(&borrows, w))))
        .collect()
}

/// Borrowed minus repaid. Negative when a wallet repaid more than it borrowed.
pub fn net_borrow(groups: &WalletGroups) -> FeatureTable {
    let borrows = total_borrow(groups);
    let repays = total_repay(groups);
    groups
        .wallets()
        .map(|w| (w.to_string(), finite_or_zero(lookup(&borrows, w) - lookup(&repays, w))))
        .collect()
}

pub fn repayment_ratio(groups: &WalletGroups) -> FeatureTable {
    let repays = total_repay(groups);
    let borrows = total_borrow(groups);
    groups
        .wallets()
        .map(|w| (w.to_string(), safe_ratio(lookup(&repays, w), lookup(&borrows, w))))
        .collect()
}

/// Liquidation *count* over borrowed *amount*.
///
/// The numerator is an event count and the denominator a token sum, so the
/// result is not a rate in either unit. Kept this way until the intended
/// definition (per-event or per-amount) is decided.
pub fn liquidation_rate(groups: &WalletGroups) -> FeatureTable {
    let liquidations = liquidation_count(groups);
    let borrows = total_borrow(groups);
    groups
        .wallets()
        .map(|w| {
            (
                w.to_string(),
                safe_ratio(lookup(&liquidations, w), lookup(&borrows, w)),
            )
        })
        .collect()
}

// ============================================================
// Amount distribution (all actions)
// ============================================================

pub fn avg_tx_amount(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| Some(amounts(records).sum::<f64>() / records.len() as f64))
}

/// Sample standard deviation (n - 1). 0 for a single event.
pub fn tx_amount_std(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        let n = records.len();
        if n < 2 {
            return Some(0.0);
        }
        let mean = amounts(records).sum::<f64>() / n as f64;
        let squared: f64 = amounts(records).map(|a| (a - mean).powi(2)).sum();
        Some((squared / (n - 1) as f64).sqrt())
    })
}

pub fn tx_amount_max(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| amounts(records).reduce(f64::max))
}

pub fn tx_amount_min(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| amounts(records).reduce(f64::min))
}

// ============================================================
// Timing
// ============================================================

/// Span between first and last event in whole days.
pub fn user_active_days(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        let first = records.iter().map(|r| r.timestamp).min()?;
        let last = records.iter().map(|r| r.timestamp).max()?;
        Some(whole_days(last - first))
    })
}

/// Mean delta between consecutive events, in seconds. 0 below two events.
pub fn avg_time_gap_seconds(groups: &WalletGroups) -> FeatureTable {
    groups.table(|records| {
        if records.len() < 2 {
            return Some(0.0);
        }
        let mut times: Vec<DateTime<Utc>> = records.iter().map(|r| r.timestamp).collect();
        times.sort();
        let gaps: Vec<f64> = times
            .windows(2)
            .map(|pair| total_seconds(pair[1] - pair[0]))
            .collect();
        Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
    })
}

/// Whole days from the last event to `evaluated_at`. The clock is an input so
/// the result is reproducible.
pub fn days_since_last_tx(groups: &WalletGroups, evaluated_at: DateTime<Utc>) -> FeatureTable {
    groups.table(|records| {
        let last = records.iter().map(|r| r.timestamp).max()?;
        Some(whole_days(evaluated_at - last))
    })
}

/// All feature tables, keyed and ordered by column name as in `FEATURE_COLUMNS`.
pub fn feature_tables(
    groups: &WalletGroups,
    evaluated_at: DateTime<Utc>,
) -> Vec<(&'static str, FeatureTable)> {
    vec![
        ("tx_count", tx_count(groups)),
        ("unique_asset_count", unique_asset_count(groups)),
        ("unique_pool_count", unique_pool_count(groups)),
        ("total_deposit", total_deposit(groups)),
        ("total_borrow", total_borrow(groups)),
        ("deposit_to_borrow_ratio", deposit_to_borrow_ratio(groups)),
        ("total_repay", total_repay(groups)),
        ("net_borrow", net_borrow(groups)),
        ("repayment_ratio", repayment_ratio(groups)),
        ("liquidation_rate", liquidation_rate(groups)),
        ("avg_tx_amount", avg_tx_amount(groups)),
        ("tx_amount_std", tx_amount_std(groups)),
        ("tx_amount_max", tx_amount_max(groups)),
        ("tx_amount_min", tx_amount_min(groups)),
        ("user_active_days", user_active_days(groups)),
        ("avg_time_gap_seconds", avg_time_gap_seconds(groups)),
        ("days_since_last_tx", days_since_last_tx(groups, evaluated_at)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn tx(wallet: &str, action: Action, amount: f64, ts: i64) -> WalletTransaction {
        WalletTransaction {
            wallet_id: wallet.to_string(),
            tx_hash: Some(format!("0x{}{}", wallet, ts)),
            action,
            asset_symbol: Some("USDC".to_string()),
            pool_id: Some("0xpool".to_string()),
            amount,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_two_wallet_example() {
        let records = vec![
            tx("A", Action::Deposit, 100.0, 0),
            tx("A", Action::Borrow, 50.0, 10),
            tx("A", Action::Repay, 50.0, 20),
            tx("B", Action::Deposit, 10.0, 0),
            tx("B", Action::Borrow, 100.0, 10),
            tx("B", Action::LiquidationCall, 1.0, 20),
        ];
        let groups = WalletGroups::group(&records);

        let d2b = deposit_to_borrow_ratio(&groups);
        assert_eq!(d2b["A"], 2.0);
        assert_eq!(d2b["B"], 0.1);

        let repay = repayment_ratio(&groups);
        assert_eq!(repay["A"], 1.0);
        assert_eq!(repay["B"], 0.0);

        let liq = liquidation_rate(&groups);
        assert_eq!(liq["A"], 0.0);
        assert_eq!(liq["B"], 0.01);
    }

    #[test]
    fn test_liquidation_rate_divides_count_by_amount() {
        // Two liquidations against 400 units borrowed: 2 / 400, not 2 / 1 event.
        let records = vec![
            tx("w", Action::Borrow, 400.0, 0),
            tx("w", Action::LiquidationCall, 999.0, 1),
            tx("w", Action::LiquidationCall, 999.0, 2),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(liquidation_rate(&groups)["w"], 0.005);
    }

    #[test]
    fn test_action_sums_absent_without_matching_records() {
        let records = vec![tx("w", Action::Deposit, 5.0, 0)];
        let groups = WalletGroups::group(&records);
        assert_eq!(total_deposit(&groups)["w"], 5.0);
        assert!(total_borrow(&groups).get("w").is_none());
        assert!(total_repay(&groups).get("w").is_none());
    }

    #[test]
    fn test_net_borrow_can_be_negative() {
        let records = vec![
            tx("w", Action::Borrow, 10.0, 0),
            tx("w", Action::Repay, 12.5, 1),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(net_borrow(&groups)["w"], -2.5);
        assert_eq!(repayment_ratio(&groups)["w"], 1.25);
    }

    #[test]
    fn test_unknown_actions_count_but_match_nothing() {
        let records = vec![
            tx("w", Action::Other("flashloan".to_string()), 7.0, 0),
            tx("w", Action::RedeemUnderlying, 3.0, 1),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(tx_count(&groups)["w"], 2.0);
        assert_eq!(avg_tx_amount(&groups)["w"], 5.0);
        assert!(total_deposit(&groups).is_empty());
        assert_eq!(deposit_to_borrow_ratio(&groups)["w"], 0.0);
    }

    #[test]
    fn test_distinct_counts_skip_missing_values() {
        let mut a = tx("w", Action::Deposit, 1.0, 0);
        a.asset_symbol = Some("DAI".to_string());
        let mut b = tx("w", Action::Deposit, 1.0, 1);
        b.asset_symbol = None;
        b.pool_id = None;
        let c = tx("w", Action::Borrow, 1.0, 2);
        let records = vec![a, b, c];
        let groups = WalletGroups::group(&records);
        assert_eq!(unique_asset_count(&groups)["w"], 2.0);
        assert_eq!(unique_pool_count(&groups)["w"], 1.0);
    }

    #[test]
    fn test_amount_statistics() {
        let records = vec![
            tx("w", Action::Deposit, 2.0, 0),
            tx("w", Action::Borrow, 4.0, 1),
            tx("w", Action::Repay, 6.0, 2),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(avg_tx_amount(&groups)["w"], 4.0);
        // sample std of [2, 4, 6] is 2
        assert!((tx_amount_std(&groups)["w"] - 2.0).abs() < 1e-12);
        assert_eq!(tx_amount_max(&groups)["w"], 6.0);
        assert_eq!(tx_amount_min(&groups)["w"], 2.0);
    }

    #[test]
    fn test_timing_features() {
        let day = 86_400;
        let base = now().timestamp() - 10 * day;
        // Out of order on purpose: gaps are taken after sorting.
        let records = vec![
            tx("w", Action::Deposit, 1.0, base + 3 * day),
            tx("w", Action::Deposit, 1.0, base),
            tx("w", Action::Deposit, 1.0, base + day + 3_600),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(user_active_days(&groups)["w"], 3.0);
        assert_eq!(avg_time_gap_seconds(&groups)["w"], (3 * day) as f64 / 2.0);
        // last event 7 days before the clock
        assert_eq!(days_since_last_tx(&groups, now())["w"], 7.0);
    }

    #[test]
    fn test_partial_days_are_floored() {
        let records = vec![
            tx("w", Action::Deposit, 1.0, 0),
            tx("w", Action::Deposit, 1.0, 86_400 * 2 - 1),
        ];
        let groups = WalletGroups::group(&records);
        assert_eq!(user_active_days(&groups)["w"], 1.0);

        // A last event in the future floors to -1 day.
        let future = vec![tx("f", Action::Deposit, 1.0, now().timestamp() + 60)];
        let groups = WalletGroups::group(&future);
        assert_eq!(days_since_last_tx(&groups, now())["f"], -1.0);
    }

    #[test]
    fn test_gaps_keep_sub_millisecond_precision() {
        let mut a = tx("w", Action::Deposit, 1.0, 0);
        let mut b = tx("w", Action::Deposit, 1.0, 0);
        a.timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        b.timestamp = Utc.timestamp_opt(1_700_000_000, 250_000).unwrap();
        let records = vec![a, b];
        let groups = WalletGroups::group(&records);
        assert_eq!(avg_time_gap_seconds(&groups)["w"], 0.00025);
    }

    #[test]
    fn test_total_seconds() {
        assert_eq!(total_seconds(Duration::milliseconds(1_500)), 1.5);
        assert_eq!(total_seconds(Duration::microseconds(-3)), -0.000003);
        // beyond the nanosecond range, milliseconds still count
        let wide = Duration::days(200_000);
        assert_eq!(total_seconds(wide), 200_000.0 * 86_400.0);
        assert_eq!(whole_days(wide), 200_000.0);
    }

    #[test]
    fn test_single_record_wallet() {
        let records = vec![tx("solo", Action::Borrow, 42.0, 1_000)];
        let groups = WalletGroups::group(&records);
        assert_eq!(tx_amount_std(&groups)["solo"], 0.0);
        assert_eq!(user_active_days(&groups)["solo"], 0.0);
        assert_eq!(avg_time_gap_seconds(&groups)["solo"], 0.0);
        assert_eq!(tx_amount_max(&groups)["solo"], 42.0);
        assert_eq!(tx_amount_min(&groups)["solo"], 42.0);
    }

    #[test]
    fn test_feature_tables_follow_column_order() {
        let records = vec![tx("w", Action::Deposit, 1.0, 0)];
        let groups = WalletGroups::group(&records);
        let names: Vec<&str> = feature_tables(&groups, now()).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, crate::features::types::FEATURE_COLUMNS.to_vec());
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(5.0, 0.0), 0.0);
        assert_eq!(safe_ratio(0.0, 0.0), 0.0);
        assert_eq!(safe_ratio(f64::MAX, f64::MIN_POSITIVE), 0.0);
        assert_eq!(safe_ratio(1.0, 4.0), 0.25);
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Deposit),
            Just(Action::Borrow),
            Just(Action::Repay),
            Just(Action::LiquidationCall),
            Just(Action::Other("swap".to_string())),
        ]
    }

    fn records_strategy() -> impl Strategy<Value = Vec<WalletTransaction>> {
        prop::collection::vec(
            (0usize..4, action_strategy(), 0.0f64..1e12, 0i64..2_000_000_000),
            1..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(w, action, amount, ts)| tx(&format!("w{}", w), action, amount, ts))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn zero_borrow_means_zero_ratios(records in records_strategy()) {
            let groups = WalletGroups::group(&records);
            let borrows = total_borrow(&groups);
            let d2b = deposit_to_borrow_ratio(&groups);
            let repay = repayment_ratio(&groups);
            let liq = liquidation_rate(&groups);
            for wallet in groups.wallets() {
                if lookup(&borrows, wallet) == 0.0 {
                    prop_assert_eq!(d2b[wallet], 0.0);
                    prop_assert_eq!(repay[wallet], 0.0);
                    prop_assert_eq!(liq[wallet], 0.0);
                }
            }
        }

        #[test]
        fn net_borrow_is_borrow_minus_repay(records in records_strategy()) {
            let groups = WalletGroups::group(&records);
            let borrows = total_borrow(&groups);
            let repays = total_repay(&groups);
            let net = net_borrow(&groups);
            for wallet in groups.wallets() {
                prop_assert_eq!(net[wallet], lookup(&borrows, wallet) - lookup(&repays, wallet));
            }
        }

        #[test]
        fn every_feature_is_finite(records in records_strategy()) {
            let groups = WalletGroups::group(&records);
            for (name, table) in feature_tables(&groups, now()) {
                for (wallet, value) in table {
                    prop_assert!(value.is_finite(), "{} for {} is {}", name, wallet, value);
                }
            }
        }

        #[test]
        fn tx_counts_cover_every_record(records in records_strategy()) {
            let groups = WalletGroups::group(&records);
            let counts = tx_count(&groups);
            prop_assert_eq!(counts.values().sum::<f64>() as usize, records.len());
            prop_assert!(counts.values().all(|c| *c >= 1.0));
        }
    }
}
