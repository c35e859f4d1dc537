//! Per-group purchase aggregation.
//!
//! Both levels find the earliest positive trigger purchase of a group and sum
//! amounts dated strictly after it:
//! - product level (fine key): first trigger amount, later trigger total and
//!   later follow-on total
//! - customer/partner level (coarse key): later follow-on total measured from
//!   the earliest trigger across all of the group's products
//!
//! Groups are independent of each other.

use crate::config::LabelConfig;
use crate::schemas::{CoarseAggregate, FineAggregate, GroupKey, LongRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Partition records by a key, preserving record order inside each group.
/// Records without a key belong to no group.
fn group_by<'a, F>(records: &'a [LongRecord], key: F) -> BTreeMap<&'a GroupKey, Vec<&'a LongRecord>>
where
    F: Fn(&'a LongRecord) -> Option<&'a GroupKey>,
{
    let mut groups: BTreeMap<&GroupKey, Vec<&LongRecord>> = BTreeMap::new();
    for record in records {
        if let Some(k) = key(record) {
            groups.entry(k).or_default().push(record);
        }
    }
    groups
}

/// Earliest positive trigger purchase of a group.
///
/// Ties on the date go to the lowest source row.
fn first_trigger<'a>(group: &[&'a LongRecord], labels: &LabelConfig) -> Option<&'a LongRecord> {
    group
        .iter()
        .copied()
        .filter(|r| labels.is_trigger(&r.program) && r.amount > 0.0)
        .min_by_key(|r| (r.period, r.row))
}

/// Sum of amounts dated strictly after `cutover` whose program matches.
fn sum_after<P>(group: &[&LongRecord], cutover: NaiveDate, matches: P) -> f64
where
    P: Fn(&str) -> bool,
{
    group
        .iter()
        .filter(|r| r.period > cutover && matches(&r.program))
        .fold(0.0, |total, r| total + r.amount)
}

/// Product-level aggregation over records keyed by `fine_key`.
pub fn aggregate_fine(
    records: &[LongRecord],
    labels: &LabelConfig,
) -> BTreeMap<GroupKey, FineAggregate> {
    let groups = group_by(records, |r| r.fine_key.as_ref());

    let mut results = BTreeMap::new();
    for (key, group) in groups {
        let aggregate = match first_trigger(&group, labels) {
            Some(first) => FineAggregate {
                first_trigger_amount: first.amount,
                first_trigger_date: Some(first.period),
                total_trigger_after: sum_after(&group, first.period, |p| labels.is_trigger(p)),
                total_followup_after: sum_after(&group, first.period, |p| labels.is_followup(p)),
            },
            None => FineAggregate::default(),
        };
        debug!("Product group {}: {:?}", key, aggregate);
        results.insert(key.clone(), aggregate);
    }

    info!(
        "Aggregated {} product groups ({} with a trigger purchase)",
        results.len(),
        results.values().filter(|a| a.first_trigger_date.is_some()).count()
    );
    results
}

/// Customer/partner-level aggregation over records keyed by `coarse_key`.
pub fn aggregate_coarse(
    records: &[LongRecord],
    labels: &LabelConfig,
) -> BTreeMap<GroupKey, CoarseAggregate> {
    let groups = group_by(records, |r| r.coarse_key.as_ref());

    let mut results = BTreeMap::new();
    for (key, group) in groups {
        let first_trigger_date = first_trigger(&group, labels).map(|r| r.period);
        let total_followup_after = first_trigger_date
            .map(|date| sum_after(&group, date, |p| labels.is_followup(p)))
            .unwrap_or(0.0);

        let aggregate = CoarseAggregate {
            first_trigger_date,
            total_followup_after,
        };
        debug!("Customer/partner group {}: {:?}", key, aggregate);
        results.insert(key.clone(), aggregate);
    }

    info!("Aggregated {} customer/partner groups", results.len());
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const EA: &str = "EA 3.0";
    const UNKNOWN: &str = "UNKNOWN";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn key(parts: &[&str]) -> GroupKey {
        GroupKey(parts.iter().map(|p| p.to_string()).collect())
    }

    fn record(row: usize, sku: &str, program: &str, d: u32, amount: f64) -> LongRecord {
        LongRecord {
            row,
            fine_key: Some(key(&["Acme", "P1", sku])),
            coarse_key: Some(key(&["Acme", "P1"])),
            program: program.to_string(),
            period: day(d),
            amount,
        }
    }

    #[test]
    fn test_fine_first_trigger_and_totals() {
        let records = vec![
            record(0, "S1", EA, 1, 100.0),
            record(0, "S1", EA, 5, 30.0),
            record(1, "S1", UNKNOWN, 10, 50.0),
        ];
        let results = aggregate_fine(&records, &LabelConfig::default());
        let agg = results[&key(&["Acme", "P1", "S1"])];
        assert_eq!(agg.first_trigger_amount, 100.0);
        assert_eq!(agg.first_trigger_date, Some(day(1)));
        assert_eq!(agg.total_trigger_after, 30.0);
        assert_eq!(agg.total_followup_after, 50.0);
    }

    #[test]
    fn test_fine_without_trigger_is_zero() {
        let records = vec![
            record(1, "S1", UNKNOWN, 2, 40.0),
            record(1, "S1", UNKNOWN, 3, 60.0),
        ];
        let results = aggregate_fine(&records, &LabelConfig::default());
        assert_eq!(results[&key(&["Acme", "P1", "S1"])], FineAggregate::default());
    }

    #[test]
    fn test_fine_ignores_non_positive_triggers() {
        let records = vec![
            record(0, "S1", EA, 1, 0.0),
            record(0, "S1", EA, 2, -5.0),
            record(0, "S1", EA, 3, 20.0),
            record(1, "S1", UNKNOWN, 2, 99.0),
            record(1, "S1", UNKNOWN, 4, 7.0),
        ];
        let agg = aggregate_fine(&records, &LabelConfig::default())[&key(&["Acme", "P1", "S1"])];
        assert_eq!(agg.first_trigger_date, Some(day(3)));
        assert_eq!(agg.first_trigger_amount, 20.0);
        assert_eq!(agg.total_trigger_after, 0.0);
        assert_eq!(agg.total_followup_after, 7.0);
    }

    #[test]
    fn test_fine_boundary_is_strict() {
        // Same-day amounts are neither the first trigger's "after" nor double counted.
        let records = vec![
            record(0, "S1", EA, 4, 10.0),
            record(1, "S1", EA, 4, 15.0),
            record(2, "S1", UNKNOWN, 4, 8.0),
            record(0, "S1", EA, 5, 1.0),
        ];
        let agg = aggregate_fine(&records, &LabelConfig::default())[&key(&["Acme", "P1", "S1"])];
        assert_eq!(agg.first_trigger_amount, 10.0);
        assert_eq!(agg.total_trigger_after, 1.0);
        assert_eq!(agg.total_followup_after, 0.0);
    }

    #[test]
    fn test_empty_sums_are_positive_zero() {
        let records = vec![record(0, "S1", EA, 9, 12.0), record(1, "S1", UNKNOWN, 2, 3.0)];
        let fine = aggregate_fine(&records, &LabelConfig::default())[&key(&["Acme", "P1", "S1"])];
        assert!(fine.total_trigger_after.is_sign_positive());
        assert!(fine.total_followup_after.is_sign_positive());

        let coarse = aggregate_coarse(&records, &LabelConfig::default())[&key(&["Acme", "P1"])];
        assert!(coarse.total_followup_after.is_sign_positive());
    }

    #[test]
    fn test_fine_groups_are_independent() {
        let records = vec![
            record(0, "S1", EA, 5, 10.0),
            record(1, "S2", UNKNOWN, 6, 10.0),
        ];
        let results = aggregate_fine(&records, &LabelConfig::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[&key(&["Acme", "P1", "S2"])].total_followup_after, 0.0);
    }

    #[test]
    fn test_coarse_uses_earliest_trigger_across_products() {
        let records = vec![
            record(0, "S1", EA, 10, 100.0),
            record(1, "S2", EA, 3, 5.0),
            record(2, "S3", UNKNOWN, 3, 1000.0),
            record(2, "S3", UNKNOWN, 4, 40.0),
            record(2, "S3", UNKNOWN, 11, 60.0),
        ];
        let results = aggregate_coarse(&records, &LabelConfig::default());
        let agg = results[&key(&["Acme", "P1"])];
        assert_eq!(agg.first_trigger_date, Some(day(3)));
        assert_eq!(agg.total_followup_after, 100.0);

        // Product level measures S3 against its own (absent) trigger.
        let fine = aggregate_fine(&records, &LabelConfig::default());
        assert_eq!(fine[&key(&["Acme", "P1", "S3"])].total_followup_after, 0.0);
    }

    #[test]
    fn test_coarse_without_trigger() {
        let records = vec![record(2, "S3", UNKNOWN, 4, 40.0)];
        let agg = aggregate_coarse(&records, &LabelConfig::default())[&key(&["Acme", "P1"])];
        assert_eq!(agg, CoarseAggregate::default());
    }

    #[test]
    fn test_unkeyed_records_are_skipped() {
        let mut orphan = record(3, "S1", EA, 1, 10.0);
        orphan.fine_key = None;
        orphan.coarse_key = None;
        assert!(aggregate_fine(&[orphan.clone()], &LabelConfig::default()).is_empty());
        assert!(aggregate_coarse(&[orphan], &LabelConfig::default()).is_empty());
    }
}
