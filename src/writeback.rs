//! Joining aggregates back onto the ledger rows.
//!
//! Product-level figures go onto every trigger row of the product. The
//! customer/partner figure goes onto exactly one row per group: the trigger
//! row with the lowest source row index. Every other cell stays zero.

use crate::config::{LabelConfig, OutputColumns};
use crate::schemas::{CoarseAggregate, FineAggregate, GroupKey, NumericColumn, RowMetrics, WideTable};
use crate::validate::ResolvedColumns;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Per-row output figures, indexed like the table rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Writeback {
    pub metrics: Vec<RowMetrics>,
    pub trigger_rows: usize,
    pub coarse_rows_stamped: usize,
}

impl Writeback {
    /// The four output columns in append order.
    pub fn into_columns(self, names: &OutputColumns) -> Vec<NumericColumn> {
        let pick = |f: fn(&RowMetrics) -> f64| self.metrics.iter().map(f).collect::<Vec<f64>>();
        vec![
            NumericColumn {
                name: names.first_trigger_amount.clone(),
                values: pick(|m| m.first_trigger_amount),
            },
            NumericColumn {
                name: names.total_trigger_after.clone(),
                values: pick(|m| m.total_trigger_after),
            },
            NumericColumn {
                name: names.total_followup_after.clone(),
                values: pick(|m| m.total_followup_after),
            },
            NumericColumn {
                name: names.coarse_followup_after.clone(),
                values: pick(|m| m.coarse_followup_after),
            },
        ]
    }
}

/// Compute the output figures for every row of `table`.
pub fn apply_writeback(
    table: &WideTable,
    columns: &ResolvedColumns,
    labels: &LabelConfig,
    fine: &BTreeMap<GroupKey, FineAggregate>,
    coarse: &BTreeMap<GroupKey, CoarseAggregate>,
) -> Writeback {
    let mut metrics = vec![RowMetrics::default(); table.height()];

    let trigger_rows: Vec<usize> = (0..table.height())
        .filter(|&i| {
            table
                .cell(i, columns.program)
                .is_some_and(|p| labels.is_trigger(p))
        })
        .collect();

    for &i in &trigger_rows {
        let row = &table.rows[i];
        if let Some(agg) = GroupKey::from_row(row, &columns.fine_key).and_then(|k| fine.get(&k)) {
            metrics[i].first_trigger_amount = agg.first_trigger_amount;
            metrics[i].total_trigger_after = agg.total_trigger_after;
            metrics[i].total_followup_after = agg.total_followup_after;
        }
    }

    // trigger_rows is in ascending row order, so the first insert per key wins.
    let mut stamped: HashSet<GroupKey> = HashSet::new();
    for &i in &trigger_rows {
        let Some(key) = GroupKey::from_row(&table.rows[i], &columns.coarse_key) else {
            continue;
        };
        if stamped.contains(&key) {
            continue;
        }
        if let Some(agg) = coarse.get(&key) {
            metrics[i].coarse_followup_after = agg.total_followup_after;
        }
        stamped.insert(key);
    }

    info!(
        "Applied product metrics to {} trigger rows and customer/partner metrics to {} rows",
        trigger_rows.len(),
        stamped.len()
    );

    Writeback {
        metrics,
        trigger_rows: trigger_rows.len(),
        coarse_rows_stamped: stamped.len(),
    }
}
