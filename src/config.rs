//! Configuration management for the sales insights pipeline.
//!
//! Supports defaults matching the standard ledger export, TOML config files,
//! and environment variable overrides for the category labels.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding [`LabelConfig::trigger_label`]
pub const ENV_TRIGGER_LABEL: &str = "SALES_TRIGGER_LABEL";

/// Environment variable overriding [`LabelConfig::followup_label`]
pub const ENV_FOLLOWUP_LABEL: &str = "SALES_FOLLOWUP_LABEL";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("column list '{0}' must not be empty")]
    EmptyColumnList(&'static str),

    #[error("program column '{0}' must also be listed as an identifier column")]
    ProgramNotIdentifier(String),

    #[error("{list} column '{column}' must also be listed as an identifier column")]
    KeyNotIdentifier { list: &'static str, column: String },

    #[error("trigger and follow-on labels must differ (both are '{0}')")]
    SameLabels(String),

    #[error("category labels must not be blank")]
    BlankLabel,

    #[error("output column '{0}' is used more than once or collides with an identifier column")]
    OutputCollision(String),
}

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Identifier and grouping columns
    #[serde(default)]
    pub columns: ColumnConfig,

    /// Program category labels
    #[serde(default)]
    pub labels: LabelConfig,

    /// Names of the four appended output columns
    #[serde(default)]
    pub output: OutputColumns,

    /// Period header parsing
    #[serde(default)]
    pub dates: DateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Columns that are not periods. Everything else is treated as a period column.
    #[serde(default = "default_identifiers")]
    pub identifiers: Vec<String>,

    /// Product-level grouping key
    #[serde(default = "default_fine_key")]
    pub fine_key: Vec<String>,

    /// Customer/partner-level grouping key
    #[serde(default = "default_coarse_key")]
    pub coarse_key: Vec<String>,

    /// Column holding the program (category) of each row
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            identifiers: default_identifiers(),
            fine_key: default_fine_key(),
            coarse_key: default_coarse_key(),
            program: default_program(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Program whose earliest positive purchase defines the cutover date
    #[serde(default = "default_trigger_label")]
    pub trigger_label: String,

    /// Program whose amounts are summed after the cutover
    #[serde(default = "default_followup_label")]
    pub followup_label: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            trigger_label: default_trigger_label(),
            followup_label: default_followup_label(),
        }
    }
}

impl LabelConfig {
    pub fn is_trigger(&self, program: &str) -> bool {
        program.trim() == self.trigger_label.trim()
    }

    pub fn is_followup(&self, program: &str) -> bool {
        program.trim() == self.followup_label.trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumns {
    #[serde(default = "default_first_trigger_amount")]
    pub first_trigger_amount: String,

    #[serde(default = "default_total_trigger_after")]
    pub total_trigger_after: String,

    #[serde(default = "default_total_followup_after")]
    pub total_followup_after: String,

    #[serde(default = "default_coarse_followup_after")]
    pub coarse_followup_after: String,
}

impl Default for OutputColumns {
    fn default() -> Self {
        Self {
            first_trigger_amount: default_first_trigger_amount(),
            total_trigger_after: default_total_trigger_after(),
            total_followup_after: default_total_followup_after(),
            coarse_followup_after: default_coarse_followup_after(),
        }
    }
}

impl OutputColumns {
    /// Output column names in the order they are appended
    pub fn names(&self) -> [&str; 4] {
        [
            &self.first_trigger_amount,
            &self.total_trigger_after,
            &self.total_followup_after,
            &self.coarse_followup_after,
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateConfig {
    /// Fail the run when a period header cannot be parsed as a date
    #[serde(default)]
    pub strict_headers: bool,

    /// Extra chrono formats tried before the built-in ones
    #[serde(default)]
    pub formats: Vec<String>,
}

// Default value functions
fn default_identifiers() -> Vec<String> {
    [
        "SalesLevel1",
        "SalesLevel2",
        "CustomerName",
        "PartnerName",
        "Program",
        "InternalBusinessEntityName",
        "InternalSubBusinessEntityName",
        "SKU",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fine_key() -> Vec<String> {
    vec![
        "CustomerName".to_string(),
        "PartnerName".to_string(),
        "SKU".to_string(),
    ]
}

fn default_coarse_key() -> Vec<String> {
    vec!["CustomerName".to_string(), "PartnerName".to_string()]
}

fn default_program() -> String {
    "Program".to_string()
}

fn default_trigger_label() -> String {
    "EA 3.0".to_string()
}

fn default_followup_label() -> String {
    "UNKNOWN".to_string()
}

fn default_first_trigger_amount() -> String {
    "Calculated First EA Amount (SKU)".to_string()
}

fn default_total_trigger_after() -> String {
    "Calculated Total EA After First (SKU)".to_string()
}

fn default_total_followup_after() -> String {
    "Calculated Total UNKNOWN After First EA (SKU)".to_string()
}

fn default_coarse_followup_after() -> String {
    "Calculated Total UNKNOWN After First EA (Cust/Partner)".to_string()
}

impl PipelineConfig {
    /// Load the default configuration with environment overrides
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        // Environment variables override file settings
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(label) = std::env::var(ENV_TRIGGER_LABEL) {
            self.labels.trigger_label = label;
        }
        if let Ok(label) = std::env::var(ENV_FOLLOWUP_LABEL) {
            self.labels.followup_label = label;
        }
    }

    /// Check internal consistency of column lists, labels and output names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let columns = &self.columns;
        if columns.identifiers.is_empty() {
            return Err(ConfigError::EmptyColumnList("identifiers"));
        }
        if columns.fine_key.is_empty() {
            return Err(ConfigError::EmptyColumnList("fine_key"));
        }
        if columns.coarse_key.is_empty() {
            return Err(ConfigError::EmptyColumnList("coarse_key"));
        }

        let is_identifier =
            |name: &str| columns.identifiers.iter().any(|id| same_column(id, name));

        if !is_identifier(columns.program.as_str()) {
            return Err(ConfigError::ProgramNotIdentifier(columns.program.clone()));
        }
        for (list, keys) in [("fine_key", &columns.fine_key), ("coarse_key", &columns.coarse_key)] {
            if let Some(column) = keys.iter().find(|k| !is_identifier(k.as_str())) {
                return Err(ConfigError::KeyNotIdentifier {
                    list,
                    column: column.clone(),
                });
            }
        }

        let trigger = self.labels.trigger_label.trim();
        let followup = self.labels.followup_label.trim();
        if trigger.is_empty() || followup.is_empty() {
            return Err(ConfigError::BlankLabel);
        }
        if trigger == followup {
            return Err(ConfigError::SameLabels(trigger.to_string()));
        }

        let names = self.output.names();
        for (i, name) in names.iter().enumerate() {
            let repeated = names[..i].iter().any(|prev| same_column(prev, name));
            if repeated || is_identifier(*name) {
                return Err(ConfigError::OutputCollision(name.to_string()));
            }
        }

        Ok(())
    }
}

/// Header comparison used everywhere: whitespace-trimmed, case-insensitive.
pub fn same_column(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
