//! Customer Sales Insights Pipeline Library
//!
//! Computes purchase-behaviour metrics from a wide customer/partner sales
//! ledger: one row per customer, partner, program and product, one column per
//! calendar period.
//!
//! # Pipeline Stages
//!
//! 1. **Schema Validation** ([`validate`]): Resolves identifier and grouping columns
//! 2. **Period Resolution** ([`periods`]): Parses period headers as dates and orders them
//! 3. **Melt** ([`melt`]): Unpivots the ledger into one record per row and period
//! 4. **Aggregation** ([`aggregate`]): First trigger purchase and later totals per product
//!    and per customer/partner
//! 5. **Writeback** ([`writeback`]): Stamps the figures back onto the ledger rows
//!
//! A per-group linear fit over processed output lives in [`regression`].
//!
//! # Output Columns
//!
//! - `Calculated First EA Amount (SKU)`
//! - `Calculated Total EA After First (SKU)`
//! - `Calculated Total UNKNOWN After First EA (SKU)`
//! - `Calculated Total UNKNOWN After First EA (Cust/Partner)`
//!
//! # Example
//!
//! ```no_run
//! use sales_insights::config::PipelineConfig;
//! use sales_insights::pipeline::process_file;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let metadata = process_file(
//!         Path::new("ledger.xlsx"),
//!         Path::new("processed_sales_data.xlsx"),
//!         None,
//!         &config,
//!     )?;
//!     println!("Processed {} rows", metadata.record_counts.wide_rows);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod melt;
pub mod periods;
pub mod pipeline;
pub mod regression;
pub mod schemas;
pub mod table_io;
pub mod validate;
pub mod writeback;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::{process_file, run, PipelineError, ProcessedTable};
pub use schemas::{CoarseAggregate, FineAggregate, GroupKey, LongRecord, RunMetadata, WideTable};
