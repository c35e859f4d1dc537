//! Reading and writing ledger tables.
//!
//! CSV and Parquet go through Polars; spreadsheet workbooks are read with
//! calamine and written with rust_xlsxwriter. Every cell is carried as text
//! so the original columns are written back exactly as they were read.

use crate::schemas::{NumericColumn, WideTable};
use calamine::{open_workbook_auto, Data, DataType as _, Reader};
use polars::prelude::*;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("input file not found: {0}")]
    NotFound(String),

    #[error("unsupported input format '{0}' (expected csv, parquet, xlsx, xlsm, xls or ods)")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("workbook has no worksheets")]
    EmptyWorkbook,

    #[error("input has no header row")]
    MissingHeader,
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("unsupported output format '{0}' (expected csv, parquet or xlsx)")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Workbook error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("table does not fit in a worksheet")]
    TooLarge,

    #[error("column '{name}' has {actual} values, table has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
    Workbook,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Load a ledger table, choosing the reader from the file extension.
///
/// `sheet` selects a worksheet by name for workbooks; the first sheet is used otherwise.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<WideTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.display().to_string()));
    }

    let mut table = match TableFormat::from_path(path) {
        Some(TableFormat::Csv) => read_csv(path)?,
        Some(TableFormat::Parquet) => read_parquet(path)?,
        Some(TableFormat::Workbook) => read_workbook(path, sheet)?,
        None => return Err(LoadError::UnsupportedFormat(extension_of(path))),
    };
    table.normalize_headers();

    info!(
        "Loaded {} rows x {} columns from {:?}",
        table.height(),
        table.width(),
        path
    );
    Ok(table)
}

fn read_csv(path: &Path) -> Result<WideTable, LoadError> {
    let file = File::open(path)?;
    // A zero-row inference window reads every column as text.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(file)
        .finish()?;
    frame_to_table(&df)
}

fn read_parquet(path: &Path) -> Result<WideTable, LoadError> {
    let file = File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    frame_to_table(&df)
}

/// Convert a DataFrame into a text table, casting every column to String.
pub fn frame_to_table(df: &DataFrame) -> Result<WideTable, LoadError> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = vec![Vec::with_capacity(columns.len()); df.height()];
    for column in df.get_columns() {
        let text = column.cast(&DataType::String)?;
        let values = text.str()?;
        for (row, value) in rows.iter_mut().zip(values.into_iter()) {
            row.push(normalize_cell(value));
        }
    }

    Ok(WideTable::new(columns, rows))
}

fn normalize_cell(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<WideTable, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name)?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or(LoadError::EmptyWorkbook)??,
    };

    let mut rows = range.rows();
    let header = rows.next().ok_or(LoadError::MissingHeader)?;
    let columns: Vec<String> = header
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();

    let rows = rows
        .map(|row| {
            let mut cells: Vec<Option<String>> = row.iter().map(cell_text).collect();
            cells.resize(columns.len(), None);
            cells
        })
        .collect();

    Ok(WideTable::new(columns, rows))
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => normalize_cell(Some(s)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => other
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .or_else(|| normalize_cell(Some(&other.to_string()))),
    }
}

/// Write `table` plus the appended numeric columns, choosing the writer from the extension.
///
/// Output goes to a staging file next to `path` that is renamed into place
/// once complete, so a failed write leaves any existing `path` untouched.
/// Returns the number of rows written.
pub fn write_table(
    path: &Path,
    table: &WideTable,
    extra: &[NumericColumn],
) -> Result<usize, WriteError> {
    let format = match TableFormat::from_path(path) {
        Some(TableFormat::Workbook) if !extension_of(path).eq_ignore_ascii_case("xlsx") => None,
        other => other,
    };
    let Some(format) = format else {
        return Err(WriteError::UnsupportedFormat(extension_of(path)));
    };
    check_lengths(table, extra)?;

    let staging = staging_path(path);
    let written = match format {
        TableFormat::Workbook => write_xlsx(&staging, table, extra),
        _ => table_to_frame(table, extra).and_then(|mut df| write_frame(&staging, format, &mut df)),
    };
    if let Err(e) = written.and_then(|()| std::fs::rename(&staging, path).map_err(WriteError::from)) {
        std::fs::remove_file(&staging).ok();
        return Err(e);
    }

    info!("Wrote {} rows to {:?}", table.height(), path);
    Ok(table.height())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

fn write_frame(path: &Path, format: TableFormat, df: &mut DataFrame) -> Result<(), WriteError> {
    let mut file = File::create(path)?;
    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(&mut file)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(df)?;
        }
        _ => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
    }
    Ok(())
}

/// Write a single-sheet workbook. Text cells that are plain numbers become numeric cells.
fn write_xlsx(path: &Path, table: &WideTable, extra: &[NumericColumn]) -> Result<(), WriteError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let headers = table
        .columns
        .iter()
        .chain(extra.iter().map(|c| &c.name));
    for (col, name) in headers.enumerate() {
        sheet.write_string(0, column_number(col)?, name.as_str())?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let r = row_number(i + 1)?;
        for (col, cell) in row.iter().take(table.width()).enumerate() {
            if let Some(text) = cell {
                write_text_cell(sheet, r, column_number(col)?, text)?;
            }
        }
        for (j, column) in extra.iter().enumerate() {
            sheet.write_number(r, column_number(table.width() + j)?, column.values[i])?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_text_cell(sheet: &mut Worksheet, row: u32, col: u16, text: &str) -> Result<(), XlsxError> {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() && n.to_string() == text => sheet.write_number(row, col, n)?,
        _ => sheet.write_string(row, col, text)?,
    };
    Ok(())
}

fn row_number(index: usize) -> Result<u32, WriteError> {
    u32::try_from(index).map_err(|_| WriteError::TooLarge)
}

fn column_number(index: usize) -> Result<u16, WriteError> {
    u16::try_from(index).map_err(|_| WriteError::TooLarge)
}

fn check_lengths(table: &WideTable, extra: &[NumericColumn]) -> Result<(), WriteError> {
    match extra.iter().find(|c| c.values.len() != table.height()) {
        Some(column) => Err(WriteError::LengthMismatch {
            name: column.name.clone(),
            expected: table.height(),
            actual: column.values.len(),
        }),
        None => Ok(()),
    }
}

/// Build a DataFrame with the text columns of `table` followed by `extra`.
pub fn table_to_frame(table: &WideTable, extra: &[NumericColumn]) -> Result<DataFrame, WriteError> {
    check_lengths(table, extra)?;

    let mut columns = Vec::with_capacity(table.width() + extra.len());
    for (index, name) in table.columns.iter().enumerate() {
        let values: Vec<Option<&str>> = table
            .rows
            .iter()
            .map(|row| row.get(index).and_then(|c| c.as_deref()))
            .collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    for column in extra {
        columns.push(Column::new(column.name.as_str().into(), column.values.as_slice()));
    }

    Ok(DataFrame::new(columns)?)
}
