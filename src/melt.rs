//! Wide-to-long transformation.
//!
//! Unpivots each ledger row into one record per resolved period column and
//! orders the result by product key and date, which the aggregators rely on
//! for "first purchase" semantics.

use crate::periods::PeriodColumn;
use crate::schemas::{GroupKey, LongRecord, WideTable};
use crate::validate::ResolvedColumns;
use tracing::info;

/// Numeric value of an amount cell. Blank, non-numeric and non-finite cells count as zero.
pub fn coerce_amount(cell: Option<&str>) -> f64 {
    cell.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Unpivot `table` into long records sorted by (product key, period, source row).
pub fn melt(table: &WideTable, columns: &ResolvedColumns, periods: &[PeriodColumn]) -> Vec<LongRecord> {
    let mut records = Vec::with_capacity(table.height() * periods.len());

    for (row_index, row) in table.rows.iter().enumerate() {
        let fine_key = GroupKey::from_row(row, &columns.fine_key);
        let coarse_key = GroupKey::from_row(row, &columns.coarse_key);
        let program = table.cell(row_index, columns.program).unwrap_or_default();

        for period in periods {
            records.push(LongRecord {
                row: row_index,
                fine_key: fine_key.clone(),
                coarse_key: coarse_key.clone(),
                program: program.to_string(),
                period: period.date,
                amount: coerce_amount(table.cell(row_index, period.index)),
            });
        }
    }

    records.sort_by(|a, b| {
        (&a.fine_key, a.period, a.row).cmp(&(&b.fine_key, b.period, b.row))
    });

    info!(
        "Melted {} rows x {} periods into {} records",
        table.height(),
        periods.len(),
        records.len()
    );
    records
}
