//! Period column resolution.
//!
//! Every column that is not an identifier is a period column whose header
//! names a calendar date. Parsed columns are ordered chronologically; headers
//! that do not parse are reported as warnings and excluded from melting.

use crate::config::DateConfig;
use crate::validate::ResolvedColumns;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no period columns found; every column is listed as an identifier: {columns:?}")]
    NoDateColumns { columns: Vec<String> },

    #[error("period headers could not be parsed as dates: {0:?}")]
    UnparsedHeaders(Vec<String>),
}

/// A period header that failed to parse. Non-fatal unless strict headers are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParseWarning {
    pub index: usize,
    pub header: String,
}

impl fmt::Display for DateParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column {} header '{}' is not a recognised date",
            self.index, self.header
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodColumn {
    pub index: usize,
    pub header: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodResolution {
    /// Parsed period columns in ascending date order
    pub columns: Vec<PeriodColumn>,

    /// Headers that did not parse, in lexical order
    pub warnings: Vec<DateParseWarning>,
}

// Full date-time renderings, as produced by spreadsheet exports of date headers.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

// Month-first for slash dates, matching the usual US ledger exports.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%Y%m%d",
];

// Month-only headers resolve to the first of the month.
// Tried after full dates: "Mar 2024" is rejected by "%b %d %Y" via the year range.
const MONTH_FORMATS: &[&str] = &[
    "%Y-%m", "%Y/%m", "%m/%Y", "%b %Y", "%B %Y", "%b-%Y", "%b-%y", "%B-%Y",
];

// chrono's %Y takes one to four digits, so "03/15/24" matches "%m/%d/%Y" as
// year 24. Rejecting such years lets the %y formats further down apply.
const YEAR_RANGE: RangeInclusive<i32> = 1000..=9999;

/// Parse a period header as a calendar date.
///
/// `extra_formats` are tried first, as full dates and then as month-only formats.
/// Parses landing outside years 1000 to 9999 are discarded.
pub fn parse_period_header(header: &str, extra_formats: &[String]) -> Option<NaiveDate> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }

    for format in extra_formats {
        if let Some(date) = parse_date(header, format).or_else(|| parse_month(header, format)) {
            return Some(date);
        }
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| {
            NaiveDateTime::parse_from_str(header, f)
                .ok()
                .and_then(|dt| in_range(dt.date()))
        })
        .or_else(|| DATE_FORMATS.iter().find_map(|f| parse_date(header, f)))
        .or_else(|| MONTH_FORMATS.iter().find_map(|f| parse_month(header, f)))
}

fn in_range(date: NaiveDate) -> Option<NaiveDate> {
    YEAR_RANGE.contains(&date.year()).then_some(date)
}

fn parse_date(header: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(header, format).ok().and_then(in_range)
}

fn parse_month(header: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("01 {header}"), &format!("%d {format}"))
        .ok()
        .and_then(in_range)
}

/// Split the table's columns into identifiers and periods and order the periods by date.
pub fn resolve_period_columns(
    columns: &[String],
    resolved: &ResolvedColumns,
    dates: &DateConfig,
) -> Result<PeriodResolution, ResolveError> {
    let candidates: Vec<(usize, &String)> = columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !resolved.is_identifier(*i))
        .collect();

    if candidates.is_empty() {
        return Err(ResolveError::NoDateColumns {
            columns: columns.to_vec(),
        });
    }

    let mut resolution = PeriodResolution::default();
    for (index, header) in candidates {
        match parse_period_header(header, &dates.formats) {
            Some(date) => resolution.columns.push(PeriodColumn {
                index,
                header: header.clone(),
                date,
            }),
            None => resolution.warnings.push(DateParseWarning {
                index,
                header: header.clone(),
            }),
        }
    }

    // Stable: columns with the same date keep their table order.
    resolution.columns.sort_by_key(|c| c.date);
    resolution.warnings.sort_by(|a, b| a.header.cmp(&b.header));

    if !resolution.warnings.is_empty() {
        let headers: Vec<String> = resolution.warnings.iter().map(|w| w.header.clone()).collect();
        if dates.strict_headers {
            return Err(ResolveError::UnparsedHeaders(headers));
        }
        for warning in &resolution.warnings {
            warn!("Skipping period column: {}", warning);
        }
    }

    if let (Some(first), Some(last)) = (resolution.columns.first(), resolution.columns.last()) {
        debug!(
            "Resolved {} period columns from {} to {}",
            resolution.columns.len(),
            first.date,
            last.date
        );
    }

    Ok(resolution)
}
