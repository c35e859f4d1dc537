//! Customer Sales Insights CLI
//!
//! Computes first trigger purchases and follow-on totals from a wide
//! customer/partner sales ledger and writes the enriched table back out.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sales_insights::config::PipelineConfig;
use sales_insights::pipeline::{inspect, process_file};
use sales_insights::regression::fit_per_group;
use sales_insights::table_io::read_table;

#[derive(Parser)]
#[command(name = "sales-insights")]
#[command(version)]
#[command(about = "Customer/partner purchase insights from a wide sales ledger", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses defaults and env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the insight columns and write the enriched ledger
    Process {
        /// Input ledger (csv, parquet, xlsx, xlsm, xls or ods)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (csv, parquet or xlsx)
        #[arg(short, long, default_value = "processed_sales_data.xlsx")]
        output: PathBuf,

        /// Worksheet name for workbook inputs (first sheet if omitted)
        #[arg(long)]
        sheet: Option<String>,

        /// Write run metadata JSON to this path
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Override the trigger program label
        #[arg(long)]
        trigger: Option<String>,

        /// Override the follow-on program label
        #[arg(long)]
        followup: Option<String>,
    },

    /// Validate columns and list resolved period columns without processing
    Inspect {
        /// Input ledger
        #[arg(short, long)]
        input: PathBuf,

        /// Worksheet name for workbook inputs
        #[arg(long)]
        sheet: Option<String>,
    },

    /// Fit a per-group linear relationship over a processed ledger
    Regress {
        /// Processed ledger
        #[arg(short, long)]
        input: PathBuf,

        /// Grouping columns
        #[arg(short, long, num_args = 1.., required = true)]
        group: Vec<String>,

        /// Feature column (defaults to the customer/partner output column)
        #[arg(long)]
        feature: Option<String>,

        /// Target column
        #[arg(long)]
        target: String,

        /// Worksheet name for workbook inputs
        #[arg(long)]
        sheet: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::load().context("Failed to load default configuration")?,
    };

    match cli.command {
        Commands::Process {
            input,
            output,
            sheet,
            metadata,
            trigger,
            followup,
        } => {
            if let Some(label) = trigger {
                config.labels.trigger_label = label;
            }
            if let Some(label) = followup {
                config.labels.followup_label = label;
            }
            cmd_process(&config, &input, &output, sheet.as_deref(), metadata.as_deref())?;
        }
        Commands::Inspect { input, sheet } => {
            cmd_inspect(&config, &input, sheet.as_deref())?;
        }
        Commands::Regress {
            input,
            group,
            feature,
            target,
            sheet,
        } => {
            let feature = feature.unwrap_or_else(|| config.output.coarse_followup_after.clone());
            cmd_regress(&input, sheet.as_deref(), &group, &feature, &target)?;
        }
    }

    Ok(())
}

fn cmd_process(
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    sheet: Option<&str>,
    metadata_path: Option<&Path>,
) -> Result<()> {
    info!("=== Processing Sales Ledger ===");
    info!(
        "Trigger program '{}', follow-on program '{}'",
        config.labels.trigger_label, config.labels.followup_label
    );

    let metadata = process_file(input, output, sheet, config)
        .with_context(|| format!("Failed to process {:?}", input))?;

    let counts = &metadata.record_counts;
    info!(
        "Processed {} rows over {} periods: {} product groups ({} with a trigger), {} customer/partner groups",
        counts.wide_rows,
        counts.period_columns,
        counts.fine_groups,
        counts.fine_groups_triggered,
        counts.coarse_groups
    );

    if let Some(path) = metadata_path {
        metadata.save(path)?;
        info!("Metadata saved to {:?}", path);
    }

    info!("Results saved to {:?}", output);
    Ok(())
}

fn cmd_inspect(config: &PipelineConfig, input: &Path, sheet: Option<&str>) -> Result<()> {
    info!("=== Inspecting Sales Ledger ===");

    let table = read_table(input, sheet).with_context(|| format!("Failed to load {:?}", input))?;
    info!("Columns: {:?}", table.columns);

    let inspection = inspect(&table, config).context("Ledger does not match configuration")?;

    info!("Period columns in date order:");
    for period in &inspection.periods.columns {
        info!("  {} {} ({})", "✓", period.header, period.date);
    }
    for warning in &inspection.periods.warnings {
        warn!("  {} {}", "✗", warning);
    }

    Ok(())
}

fn cmd_regress(
    input: &Path,
    sheet: Option<&str>,
    group: &[String],
    feature: &str,
    target: &str,
) -> Result<()> {
    info!("=== Per-Group Linear Fit ===");

    let table = read_table(input, sheet).with_context(|| format!("Failed to load {:?}", input))?;
    let fits = fit_per_group(&table, group, feature, target).context("Regression failed")?;

    println!("{}", serde_json::to_string_pretty(&fits)?);
    Ok(())
}
