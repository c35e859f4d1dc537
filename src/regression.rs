//! Per-group linear fit over a processed ledger.
//!
//! Fits `target = coefficient * feature + intercept` by ordinary least squares
//! for every group of rows sharing the grouping columns. Typically the feature
//! is the customer/partner follow-on total produced by the pipeline.

use crate::melt::coerce_amount;
use crate::schemas::{GroupKey, WideTable};
use crate::validate::find_column;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegressionError {
    #[error("column '{0}' not found in table")]
    MissingColumn(String),

    #[error("at least one grouping column is required")]
    NoGroupColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupFit {
    pub key: GroupKey,
    pub samples: usize,

    /// Slope; `None` when every feature value in the group is identical
    pub coefficient: Option<f64>,

    /// Intercept; the target mean for degenerate groups
    pub intercept: f64,
}

/// Least-squares slope and intercept of `points`.
///
/// Requires at least one point. Returns no slope when the feature has no variance.
pub fn fit_line(points: &[(f64, f64)]) -> (Option<f64>, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

    if sxx.abs() < f64::EPSILON {
        return (None, mean_y);
    }
    let slope = sxy / sxx;
    (Some(slope), mean_y - slope * mean_x)
}

/// Fit one line per group. Groups with fewer than two rows are skipped.
pub fn fit_per_group(
    table: &WideTable,
    group_columns: &[String],
    feature: &str,
    target: &str,
) -> Result<Vec<GroupFit>, RegressionError> {
    if group_columns.is_empty() {
        return Err(RegressionError::NoGroupColumns);
    }
    let locate = |name: &str| {
        find_column(&table.columns, name).ok_or_else(|| RegressionError::MissingColumn(name.to_string()))
    };
    let group_indices = group_columns
        .iter()
        .map(|c| locate(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let feature_index = locate(feature)?;
    let target_index = locate(target)?;

    let mut groups: BTreeMap<GroupKey, Vec<(f64, f64)>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(key) = GroupKey::from_row(row, &group_indices) {
            let x = coerce_amount(table.cell(i, feature_index));
            let y = coerce_amount(table.cell(i, target_index));
            groups.entry(key).or_default().push((x, y));
        }
    }

    let mut fits = Vec::new();
    for (key, points) in groups {
        if points.len() < 2 {
            warn!("Not enough data for group {}", key);
            continue;
        }
        let (coefficient, intercept) = fit_line(&points);
        match coefficient {
            Some(c) => info!(
                "Regression for group {}: coefficient = {:.6}, intercept = {:.6}",
                key, c, intercept
            ),
            None => warn!("Group {} has constant feature values; no slope", key),
        }
        fits.push(GroupFit {
            key,
            samples: points.len(),
            coefficient,
            intercept,
        });
    }

    info!("Fitted {} groups", fits.len());
    Ok(fits)
}
