//! Schema validation for loaded ledgers.
//!
//! Resolves every configured column name against the table headers once,
//! producing column indices for the later stages or a structured list of
//! what is missing.

use crate::config::{same_column, ColumnConfig};
use crate::schemas::WideTable;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required columns missing: {}", describe_violations(.0))]
    MissingColumns(Vec<SchemaViolation>),

    #[error("duplicate column headers after trimming: {0:?}")]
    DuplicateColumns(Vec<String>),
}

/// Which configured column list a violation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnList {
    Identifiers,
    FineKey,
    CoarseKey,
}

impl fmt::Display for ColumnList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnList::Identifiers => write!(f, "identifier columns"),
            ColumnList::FineKey => write!(f, "product grouping columns"),
            ColumnList::CoarseKey => write!(f, "customer/partner grouping columns"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub list: ColumnList,
    pub missing: Vec<String>,
}

fn describe_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} {:?}", v.list, v.missing))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Column indices resolved against a specific table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub identifiers: Vec<usize>,
    pub fine_key: Vec<usize>,
    pub coarse_key: Vec<usize>,
    pub program: usize,
}

impl ResolvedColumns {
    pub fn is_identifier(&self, index: usize) -> bool {
        self.identifiers.contains(&index)
    }
}

/// Index of the header matching `name` (trimmed, case-insensitive).
pub fn find_column(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| same_column(c, name))
}

/// Validate `table` against the configured column lists.
///
/// All three lists are checked before failing so the error names every
/// missing column at once.
pub fn validate_schema(
    table: &WideTable,
    columns: &ColumnConfig,
) -> Result<ResolvedColumns, SchemaError> {
    let duplicates = duplicate_headers(&table.columns);
    if !duplicates.is_empty() {
        return Err(SchemaError::DuplicateColumns(duplicates));
    }

    let mut violations = Vec::new();
    let mut resolve = |list: ColumnList, names: &[String]| -> Vec<usize> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match find_column(&table.columns, name) {
                Some(i) => indices.push(i),
                None => missing.push(name.trim().to_string()),
            }
        }
        if !missing.is_empty() {
            violations.push(SchemaViolation { list, missing });
        }
        indices
    };

    let identifiers = resolve(ColumnList::Identifiers, columns.identifiers.as_slice());
    let fine_key = resolve(ColumnList::FineKey, columns.fine_key.as_slice());
    let coarse_key = resolve(ColumnList::CoarseKey, columns.coarse_key.as_slice());

    if !violations.is_empty() {
        return Err(SchemaError::MissingColumns(violations));
    }

    // The program column is an identifier, so a missing one was reported above.
    let program = find_column(&table.columns, &columns.program).ok_or_else(|| {
        SchemaError::MissingColumns(vec![SchemaViolation {
            list: ColumnList::Identifiers,
            missing: vec![columns.program.clone()],
        }])
    })?;

    Ok(ResolvedColumns {
        identifiers,
        fine_key,
        coarse_key,
        program,
    })
}

fn duplicate_headers(columns: &[String]) -> Vec<String> {
    let mut duplicates: Vec<String> = Vec::new();
    for (i, column) in columns.iter().enumerate() {
        let seen_before = columns[..i].iter().any(|c| same_column(c, column));
        if seen_before && !duplicates.iter().any(|d| same_column(d, column)) {
            duplicates.push(column.trim().to_string());
        }
    }
    duplicates
}
