//! Diagnostic rules.
//!
//! Every rule implements [`Check`]: a pure function from a filtered snapshot
//! view to findings. Checks hold no state between runs and must be
//! `Send + Sync` so the engine can run them in parallel.

pub mod constraints;
pub mod sequences;
pub mod table_index;

use crate::config::Thresholds;
use crate::models::{Finding, Index, QualifiedName, Severity, Subject};
use crate::snapshot::{Snapshot, SnapshotView};
use snafu::Snafu;
use std::sync::Arc;

/// Identifiers of the built-in checks
pub mod ids {
    pub const DUPLICATED_INDEXES: &str = "duplicated_indexes";
    pub const INVALID_INDEXES: &str = "invalid_indexes";
    pub const UNUSED_INDEXES: &str = "unused_indexes";
    pub const INDEXES_WITH_NULL_VALUES: &str = "indexes_with_null_values";
    pub const TABLES_WITHOUT_PRIMARY_KEY: &str = "tables_without_primary_key";
    pub const FOREIGN_KEYS_WITHOUT_INDEX: &str = "foreign_keys_without_index";
    pub const FOREIGN_KEYS_WITH_UNMATCHED_COLUMN_TYPE: &str =
        "foreign_keys_with_unmatched_column_type";
    pub const BLOATED_TABLES: &str = "bloated_tables";
    pub const BLOATED_INDEXES: &str = "bloated_indexes";
    pub const TABLES_WITH_MISSING_INDEXES: &str = "tables_with_missing_indexes";
    pub const SEQUENCE_OVERFLOW: &str = "sequence_overflow";
}

#[derive(Debug, Snafu)]
pub enum CheckError {
    #[snafu(display("Check {} failed: {}", check, message))]
    Internal { check: String, message: String },
}

/// Everything a check is given for one evaluation
#[derive(Debug, Clone)]
pub struct CheckContext<'a> {
    pub view: SnapshotView<'a>,
    pub thresholds: &'a Thresholds,
}

impl<'a> CheckContext<'a> {
    pub fn new(view: SnapshotView<'a>, thresholds: &'a Thresholds) -> Self {
        Self { view, thresholds }
    }

    /// Unfiltered snapshot, for context lookups only.
    pub fn snapshot(&self) -> &'a Snapshot {
        self.view.snapshot()
    }
}

/// A single diagnostic rule.
pub trait Check: Send + Sync {
    /// Unique snake_case identifier, used in configuration and findings.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Explicit ordering hint; prioritized checks run before the rest.
    fn priority(&self) -> Option<u32> {
        None
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError>;
}

/// The full built-in rule set, in registration order.
pub fn default_checks() -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(table_index::indexes::InvalidIndexes),
        Arc::new(table_index::indexes::DuplicatedIndexes),
        Arc::new(table_index::indexes::UnusedIndexes),
        Arc::new(table_index::indexes::IndexesWithNullValues),
        Arc::new(constraints::TablesWithoutPrimaryKey),
        Arc::new(constraints::ForeignKeysWithoutIndex),
        Arc::new(constraints::ForeignKeysWithUnmatchedColumnType),
        Arc::new(table_index::bloat::BloatedTables),
        Arc::new(table_index::bloat::BloatedIndexes),
        Arc::new(table_index::bloat::TablesWithMissingIndexes),
        Arc::new(sequences::SequenceOverflow),
    ]
}

pub(crate) fn index_finding(
    check: &str,
    severity: Severity,
    index: &Index,
    description: String,
) -> Finding {
    Finding::new(
        check,
        severity,
        vec![index.name.clone()],
        description,
        Subject::Index {
            index: index.name.clone(),
            table: index.table.clone(),
        },
    )
}

pub(crate) fn table_finding(
    check: &str,
    severity: Severity,
    table: &QualifiedName,
    description: String,
) -> Finding {
    Finding::new(
        check,
        severity,
        vec![table.clone()],
        description,
        Subject::Table {
            table: table.clone(),
        },
    )
}

/// Informational finding for an object a rule could not judge.
pub(crate) fn unevaluable(check: &str, object: &QualifiedName, reason: String) -> Finding {
    Finding::new(
        check,
        Severity::Info,
        vec![object.clone()],
        format!("{} could not be evaluated: {}", object, reason),
        Subject::Unevaluable { reason },
    )
}

/// Renders a byte count the way `pg_size_pretty` does.
pub(crate) fn size_pretty(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["bytes", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 10.0 * 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.0} {}", value, UNITS[unit])
}
