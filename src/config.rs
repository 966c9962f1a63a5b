use crate::exclusion::{ExclusionRule, Exclusions};
use crate::migration::GeneratingOptions;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Failed to read config file: {}", source))]
    FileRead { source: std::io::Error },

    #[snafu(display("Failed to parse YAML config: {}", source))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Threshold {} must not be negative, got {}", name, value))]
    NegativeThreshold { name: &'static str, value: f64 },

    #[snafu(display("Threshold {} must not exceed {}, got {}", name, max, value))]
    ThresholdOutOfRange {
        name: &'static str,
        value: f64,
        max: f64,
    },

    #[snafu(display("Invalid exclusion pattern '{}': {}", pattern, source))]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[snafu(display("Generator indentation must not exceed {}, got {}", max, value))]
    IndentationOutOfRange { value: u8, max: u8 },

    #[snafu(display("Unknown check id: {}", id))]
    UnknownCheck { id: String },
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Numeric policy knobs used by the checks.
///
/// The defaults are policy choices, not facts about PostgreSQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Bloat share, in percent, at which tables and indexes are reported
    pub bloat_percentage: f64,
    /// Objects smaller than this are never reported as bloated
    pub bloat_min_size_bytes: i64,
    /// Indexes scanned at most this many times count as unused
    pub unused_scan_threshold: i64,
    /// Unused indexes are only reported on tables at least this large
    pub unused_min_table_size_bytes: i64,
    /// Sequential-scan heavy tables are only reported above this row estimate
    pub missing_index_min_rows: i64,
    /// Sequences with less headroom than this, in percent, are reported
    pub sequence_remaining_percentage: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            bloat_percentage: 50.0,
            bloat_min_size_bytes: 0,
            unused_scan_threshold: 0,
            unused_min_table_size_bytes: 1024 * 1024,
            missing_index_min_rows: 10_000,
            sequence_remaining_percentage: 10.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        non_negative("bloat_percentage", self.bloat_percentage)?;
        at_most("bloat_percentage", self.bloat_percentage, 100.0)?;
        non_negative("bloat_min_size_bytes", self.bloat_min_size_bytes as f64)?;
        non_negative("unused_scan_threshold", self.unused_scan_threshold as f64)?;
        non_negative(
            "unused_min_table_size_bytes",
            self.unused_min_table_size_bytes as f64,
        )?;
        non_negative("missing_index_min_rows", self.missing_index_min_rows as f64)?;
        non_negative(
            "sequence_remaining_percentage",
            self.sequence_remaining_percentage,
        )?;
        at_most(
            "sequence_remaining_percentage",
            self.sequence_remaining_percentage,
            100.0,
        )?;
        Ok(())
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    // NaN fails this comparison too
    if value >= 0.0 {
        Ok(())
    } else {
        NegativeThresholdSnafu { name, value }.fail()
    }
}

fn at_most(name: &'static str, value: f64, max: f64) -> Result<()> {
    if value <= max {
        Ok(())
    } else {
        ThresholdOutOfRangeSnafu { name, value, max }.fail()
    }
}

/// Everything the core accepts as configuration, usually loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub disabled_checks: Vec<String>,
    pub thresholds: Thresholds,
    pub exclusions: Vec<ExclusionRule>,
    pub generator: GeneratingOptions,
    /// Upper bound on a single evaluation, in milliseconds
    pub deadline_ms: Option<u64>,
}

impl HealthConfig {
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path).context(FileReadSnafu)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: HealthConfig = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without a registry.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.generator.validate()?;
        Exclusions::compile(&self.exclusions)?;
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Check ids this configuration refers to, for validation against a registry.
    pub fn referenced_checks(&self) -> impl Iterator<Item = &str> {
        self.disabled_checks
            .iter()
            .map(String::as_str)
            .chain(self.exclusions.iter().filter_map(|r| r.check.as_deref()))
    }
}
