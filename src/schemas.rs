//! Data schemas for the sales insights pipeline.
//!
//! This module serves as the canonical definition of every table shape the
//! pipeline passes between stages: the wide ledger as loaded, the long-form
//! records derived from it, the per-group aggregates, and the run metadata.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema version for tracking changes
pub const SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// PART A: Wide Table
// ============================================================================

/// The ledger as loaded: one row per customer/partner/product combination,
/// one column per identifier field or calendar period.
///
/// Cells are kept as text; `None` marks a blank cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl WideTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Strip surrounding whitespace from every header.
    /// Trim header whitespace and name blank headers by position (`Unnamed: 3`).
    pub fn normalize_headers(&mut self) {
        for (index, column) in self.columns.iter_mut().enumerate() {
            let trimmed = column.trim();
            if trimmed.is_empty() {
                *column = format!("Unnamed: {index}");
            } else if trimmed.len() != column.len() {
                *column = trimmed.to_string();
            }
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    /// Remove the named columns (matched case-insensitively), returning the
    /// headers that were removed.
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        let drop: Vec<bool> = self
            .columns
            .iter()
            .map(|c| names.iter().any(|n| crate::config::same_column(c, n)))
            .collect();
        if !drop.contains(&true) {
            return Vec::new();
        }

        let removed = self
            .columns
            .iter()
            .zip(&drop)
            .filter(|(_, d)| **d)
            .map(|(c, _)| c.clone())
            .collect();

        self.columns = retain_flagged(std::mem::take(&mut self.columns), &drop);
        for row in &mut self.rows {
            *row = retain_flagged(std::mem::take(row), &drop);
        }
        removed
    }
}

fn retain_flagged<T>(values: Vec<T>, drop: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop.get(*i).copied().unwrap_or(false))
        .map(|(_, v)| v)
        .collect()
}

/// Values of the key columns of one row, in key-column order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    /// Build the key of `row` from the given column indices.
    ///
    /// Returns `None` when any key component is blank; such rows belong to no group.
    pub fn from_row(row: &[Option<String>], indices: &[usize]) -> Option<Self> {
        indices
            .iter()
            .map(|&i| row.get(i).cloned().flatten())
            .collect::<Option<Vec<_>>>()
            .map(GroupKey)
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

// ============================================================================
// PART B: Long-Form Records
// ============================================================================

/// One (row, period, amount) observation unpivoted from the wide table.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    /// Index of the source row in the wide table
    pub row: usize,

    /// Product-level key, absent when a key cell is blank
    pub fine_key: Option<GroupKey>,

    /// Customer/partner-level key, absent when a key cell is blank
    pub coarse_key: Option<GroupKey>,

    /// Program label of the source row (empty when blank)
    pub program: String,

    /// Date parsed from the period header
    pub period: NaiveDate,

    /// Coerced amount, always finite
    pub amount: f64,
}

// ============================================================================
// PART C: Aggregates
// ============================================================================

/// Per product-level group results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FineAggregate {
    /// Amount of the earliest positive trigger purchase (0 if none)
    pub first_trigger_amount: f64,

    /// Date of the earliest positive trigger purchase
    pub first_trigger_date: Option<NaiveDate>,

    /// Trigger amounts on dates strictly after the first trigger date
    pub total_trigger_after: f64,

    /// Follow-on amounts on dates strictly after the first trigger date
    pub total_followup_after: f64,
}

/// Per customer/partner group results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoarseAggregate {
    /// Earliest positive trigger purchase across all products of the group
    pub first_trigger_date: Option<NaiveDate>,

    /// Follow-on amounts on dates strictly after that date
    pub total_followup_after: f64,
}

/// The four figures appended to each output row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMetrics {
    pub first_trigger_amount: f64,
    pub total_trigger_after: f64,
    pub total_followup_after: f64,
    pub coarse_followup_after: f64,
}

/// A named Float64 column appended to the wide table on write.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<f64>,
}

// ============================================================================
// Metadata Schema
// ============================================================================

/// Run metadata for reproducibility and auditing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Schema version used
    pub schema_version: String,

    /// Pipeline run timestamp
    pub run_timestamp: DateTime<Utc>,

    /// Source ledger
    pub input_path: String,

    /// Written output table
    pub output_path: String,

    pub trigger_label: String,
    pub followup_label: String,

    /// Record counts by stage
    pub record_counts: RecordCounts,

    /// Period headers that could not be parsed as dates
    pub unparsed_headers: Vec<String>,

    /// Git commit hash (if available)
    pub git_commit: Option<String>,

    /// Pipeline version
    pub pipeline_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub wide_rows: usize,
    pub period_columns: usize,
    pub long_records: usize,
    pub fine_groups: usize,
    pub fine_groups_triggered: usize,
    pub coarse_groups: usize,
    pub trigger_rows: usize,
    pub coarse_rows_stamped: usize,
}

impl RunMetadata {
    pub fn new(input_path: &Path, output_path: &Path, trigger: &str, followup: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_timestamp: Utc::now(),
            input_path: input_path.display().to_string(),
            output_path: output_path.display().to_string(),
            trigger_label: trigger.to_string(),
            followup_label: followup.to_string(),
            record_counts: RecordCounts::default(),
            unparsed_headers: Vec::new(),
            git_commit: get_git_commit(),
            pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn get_git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
