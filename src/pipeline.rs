//! End-to-end pipeline: validate, resolve periods, melt, aggregate, write back.

use crate::aggregate::{aggregate_coarse, aggregate_fine};
use crate::config::{ConfigError, PipelineConfig};
use crate::melt::melt;
use crate::periods::{resolve_period_columns, PeriodResolution, ResolveError};
use crate::schemas::{NumericColumn, RecordCounts, RunMetadata, WideTable};
use crate::table_io::{read_table, write_table, LoadError, WriteError};
use crate::validate::{validate_schema, ResolvedColumns, SchemaError};
use crate::writeback::apply_writeback;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load input: {0}")]
    Load(#[from] LoadError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Period column error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to write output: {0}")]
    Write(#[from] WriteError),
}

/// Ledger with its computed output columns.
#[derive(Debug, Clone)]
pub struct ProcessedTable {
    /// Original columns (minus any stale output columns from an earlier run)
    pub table: WideTable,

    /// The four output columns, one value per row
    pub outputs: Vec<NumericColumn>,

    pub counts: RecordCounts,
    pub unparsed_headers: Vec<String>,
}

/// Schema and period layout of a ledger, without aggregating it.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub columns: ResolvedColumns,
    pub periods: PeriodResolution,
}

/// Remove output columns left over from a previous run so re-processing a
/// processed file yields the same result.
fn drop_stale_outputs(table: &mut WideTable, config: &PipelineConfig) {
    let removed = table.drop_columns(&config.output.names());
    if !removed.is_empty() {
        info!("Ignoring existing output columns {:?}", removed);
    }
}

/// Validate the schema and resolve period columns.
pub fn inspect(table: &WideTable, config: &PipelineConfig) -> Result<Inspection, PipelineError> {
    config.validate()?;
    let columns = validate_schema(table, &config.columns)?;
    info!("Required columns found");

    let periods = resolve_period_columns(&table.columns, &columns, &config.dates)?;
    info!(
        "Identified {} period columns ({} unparsed)",
        periods.columns.len(),
        periods.warnings.len()
    );
    Ok(Inspection { columns, periods })
}

/// Run the pipeline over an in-memory table.
pub fn run(mut table: WideTable, config: &PipelineConfig) -> Result<ProcessedTable, PipelineError> {
    drop_stale_outputs(&mut table, config);
    let Inspection { columns, periods } = inspect(&table, config)?;

    let records = melt(&table, &columns, &periods.columns);
    let fine = aggregate_fine(&records, &config.labels);
    let coarse = aggregate_coarse(&records, &config.labels);
    let writeback = apply_writeback(&table, &columns, &config.labels, &fine, &coarse);

    let counts = RecordCounts {
        wide_rows: table.height(),
        period_columns: periods.columns.len(),
        long_records: records.len(),
        fine_groups: fine.len(),
        fine_groups_triggered: fine.values().filter(|a| a.first_trigger_date.is_some()).count(),
        coarse_groups: coarse.len(),
        trigger_rows: writeback.trigger_rows,
        coarse_rows_stamped: writeback.coarse_rows_stamped,
    };

    Ok(ProcessedTable {
        outputs: writeback.into_columns(&config.output),
        table,
        counts,
        unparsed_headers: periods.warnings.into_iter().map(|w| w.header).collect(),
    })
}

/// Load `input`, run the pipeline and write `output`.
pub fn process_file(
    input: &Path,
    output: &Path,
    sheet: Option<&str>,
    config: &PipelineConfig,
) -> Result<RunMetadata, PipelineError> {
    info!("Loading data from {:?}", input);
    let table = read_table(input, sheet)?;

    let processed = run(table, config)?;
    if !processed.unparsed_headers.is_empty() {
        warn!(
            "{} period headers were not dates and were skipped",
            processed.unparsed_headers.len()
        );
    }

    write_table(output, &processed.table, &processed.outputs)?;

    let mut metadata = RunMetadata::new(
        input,
        output,
        &config.labels.trigger_label,
        &config.labels.followup_label,
    );
    metadata.record_counts = processed.counts;
    metadata.unparsed_headers = processed.unparsed_headers;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &[
        "SalesLevel1",
        "SalesLevel2",
        "CustomerName",
        "PartnerName",
        "Program",
        "InternalBusinessEntityName",
        "InternalSubBusinessEntityName",
        "SKU",
        "2024-01-10",
        "2024-01-01",
        "2024-01-05",
    ];

    fn ledger_row(customer: &str, partner: &str, program: &str, sku: &str, amounts: [&str; 3]) -> Vec<Option<String>> {
        let mut row = vec!["Americas", "West", customer, partner, program, "Networking", "Switching", sku];
        row.extend(amounts);
        row.into_iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect()
    }

    fn ledger(rows: Vec<Vec<Option<String>>>) -> WideTable {
        WideTable::new(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
    }

    fn output(processed: &ProcessedTable, column: usize) -> Vec<f64> {
        processed.outputs[column].values.clone()
    }

    #[test]
    fn test_documented_example() {
        // Columns are 01-10, 01-01, 01-05.
        let table = ledger(vec![
            ledger_row("Acme", "P1", "EA 3.0", "S1", ["", "100", "30"]),
            ledger_row("Acme", "P1", "UNKNOWN", "S1", ["50", "", ""]),
        ]);
        let processed = run(table, &PipelineConfig::default()).unwrap();

        assert_eq!(output(&processed, 0), vec![100.0, 0.0]);
        assert_eq!(output(&processed, 1), vec![30.0, 0.0]);
        assert_eq!(output(&processed, 2), vec![50.0, 0.0]);
        assert_eq!(output(&processed, 3), vec![50.0, 0.0]);
        assert_eq!(processed.counts.long_records, 6);
        assert_eq!(processed.counts.fine_groups_triggered, 1);
    }

    #[test]
    fn test_followup_only_group_is_zero() {
        let table = ledger(vec![ledger_row("Acme", "P1", "UNKNOWN", "S1", ["5", "6", "7"])]);
        let processed = run(table, &PipelineConfig::default()).unwrap();
        for column in 0..4 {
            assert_eq!(output(&processed, column), vec![0.0]);
        }
    }

    #[test]
    fn test_coarse_figure_on_first_trigger_row() {
        let table = ledger(vec![
            ledger_row("Acme", "P1", "UNKNOWN", "S3", ["80", "1", ""]),
            ledger_row("Acme", "P1", "EA 3.0", "S2", ["", "", "10"]),
            ledger_row("Acme", "P1", "EA 3.0", "S1", ["", "20", ""]),
        ]);
        let processed = run(table, &PipelineConfig::default()).unwrap();

        // Earliest trigger is S1 on 01-01; follow-on after it is 80.
        assert_eq!(output(&processed, 3), vec![0.0, 80.0, 0.0]);
        assert_eq!(processed.counts.coarse_rows_stamped, 1);
        assert_eq!(output(&processed, 0), vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_rerun_on_own_output_is_identical() {
        let table = ledger(vec![
            ledger_row("Acme", "P1", "EA 3.0", "S1", ["4", "100", "30"]),
            ledger_row("Acme", "P1", "UNKNOWN", "S1", ["50", "2", "x"]),
            ledger_row("Beta", "P2", "EA 3.0", "S9", ["", "", "12"]),
        ]);
        let config = PipelineConfig::default();
        let first = run(table, &config).unwrap();

        let mut again = first.table.clone();
        for column in &first.outputs {
            again.columns.push(column.name.clone());
            for (row, value) in again.rows.iter_mut().zip(&column.values) {
                row.push(Some(value.to_string()));
            }
        }
        let second = run(again, &config).unwrap();

        assert_eq!(second.table, first.table);
        assert_eq!(second.outputs, first.outputs);
        assert!(second.unparsed_headers.is_empty());
    }

    #[test]
    fn test_month_headers_order_the_windows() {
        let mut headers: Vec<String> = HEADERS[..8].iter().map(|h| h.to_string()).collect();
        headers.extend(["Jan 2024".to_string(), "2023-12-01".to_string(), "Nov-23".to_string()]);
        let table = WideTable::new(
            headers,
            vec![
                ledger_row("Acme", "P1", "EA 3.0", "S1", ["", "100", ""]),
                ledger_row("Acme", "P1", "UNKNOWN", "S1", ["50", "", "9"]),
            ],
        );
        let processed = run(table, &PipelineConfig::default()).unwrap();

        assert!(processed.unparsed_headers.is_empty());
        assert_eq!(output(&processed, 0), vec![100.0, 0.0]);
        assert_eq!(output(&processed, 2), vec![50.0, 0.0]);
        assert_eq!(output(&processed, 3), vec![50.0, 0.0]);
    }

    #[test]
    fn test_empty_windows_are_positive_zero() {
        let table = ledger(vec![ledger_row("Acme", "P1", "EA 3.0", "S1", ["", "", "25"])]);
        let processed = run(table, &PipelineConfig::default()).unwrap();
        for column in 1..4 {
            let value = output(&processed, column)[0];
            assert_eq!(value, 0.0);
            assert!(value.is_sign_positive(), "column {} holds {}", column, value);
        }
    }

    #[test]
    fn test_missing_columns_fail() {
        let table = WideTable::new(vec!["CustomerName".into(), "2024-01-01".into()], vec![]);
        let err = run(table, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(SchemaError::MissingColumns(_))));
    }

    #[test]
    fn test_only_identifier_columns_fail() {
        let table = WideTable::new(HEADERS[..8].iter().map(|h| h.to_string()).collect(), vec![]);
        let err = run(table, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Resolve(ResolveError::NoDateColumns { .. })));
    }

    #[test]
    fn test_inspect_reports_periods_in_date_order() {
        let table = ledger(vec![]);
        let inspection = inspect(&table, &PipelineConfig::default()).unwrap();
        let headers: Vec<&str> = inspection
            .periods
            .columns
            .iter()
            .map(|c| c.header.as_str())
            .collect();
        assert_eq!(headers, vec!["2024-01-01", "2024-01-05", "2024-01-10"]);
        assert_eq!(inspection.columns.program, 4);
    }
}
