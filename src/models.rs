use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema-qualified identifier of a database object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Renders the name as a fully quoted SQL identifier, e.g. `"public"."orders"`.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Double-quotes a single identifier, doubling any embedded quote.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A table column as seen in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Represents a table with its columns and observed statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: QualifiedName,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Planner estimate of live rows
    #[serde(default)]
    pub row_estimate: i64,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub seq_scans: i64,
    #[serde(default)]
    pub index_scans: i64,
    /// Estimated share of wasted space, in percent
    #[serde(default)]
    pub bloat_percentage: Option<f64>,
    /// Indexes defined on this table; filled in by [`crate::snapshot::Snapshot::new`]
    #[serde(default)]
    pub indexes: Vec<QualifiedName>,
    /// Constraints defined on this table; filled in by [`crate::snapshot::Snapshot::new`]
    #[serde(default)]
    pub constraints: Vec<QualifiedName>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One element of an index definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexKey {
    Column {
        name: String,
        #[serde(default)]
        order: SortOrder,
        #[serde(default)]
        opclass: Option<String>,
        #[serde(default)]
        collation: Option<String>,
    },
    Expression {
        text: String,
    },
}

impl IndexKey {
    pub fn column(name: impl Into<String>) -> Self {
        IndexKey::Column {
            name: name.into(),
            order: SortOrder::Asc,
            opclass: None,
            collation: None,
        }
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            IndexKey::Column { name, .. } => Some(name),
            IndexKey::Expression { .. } => None,
        }
    }
}

fn default_method() -> String {
    "btree".to_string()
}

fn default_true() -> bool {
    true
}

/// Represents an index with its definition and usage statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: QualifiedName,
    pub table: QualifiedName,
    #[serde(default)]
    pub keys: Vec<IndexKey>,
    /// Access method (`btree`, `hash`, `gin`, ...)
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub valid: bool,
    /// WHERE clause of a partial index
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub scans: i64,
    #[serde(default)]
    pub bloat_percentage: Option<f64>,
}

impl Index {
    pub fn is_partial(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn is_btree(&self) -> bool {
        self.method.eq_ignore_ascii_case("btree")
    }

    /// Column names of the leading plain-column keys, stopping at the first expression.
    pub fn leading_columns(&self) -> Vec<&str> {
        self.keys.iter().map_while(IndexKey::column_name).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    NotNull,
    Exclusion,
}

/// Target side of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignReference {
    pub table: QualifiedName,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: QualifiedName,
    pub table: QualifiedName,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub references: Option<ForeignReference>,
    /// Index enforcing the constraint, if any
    #[serde(default)]
    pub index: Option<QualifiedName>,
}

fn default_sequence_type() -> String {
    "bigint".to_string()
}

fn default_one() -> i64 {
    1
}

fn default_max_value() -> i64 {
    i64::MAX
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: QualifiedName,
    #[serde(default = "default_sequence_type")]
    pub data_type: String,
    #[serde(default = "default_one")]
    pub start: i64,
    #[serde(default = "default_one")]
    pub increment: i64,
    #[serde(default = "default_one")]
    pub min_value: i64,
    #[serde(default = "default_max_value")]
    pub max_value: i64,
    /// `None` until the first `nextval`
    #[serde(default)]
    pub last_value: Option<i64>,
    #[serde(default)]
    pub cycle: bool,
}

impl Sequence {
    /// Share of values still available in the direction of `increment`, in percent.
    ///
    /// Returns `None` when the bounds are inconsistent or the last value lies
    /// outside of them.
    pub fn remaining_percentage(&self) -> Option<f64> {
        if self.increment == 0 || self.max_value <= self.min_value {
            return None;
        }
        let Some(current) = self.last_value else {
            return Some(100.0);
        };
        if current < self.min_value || current > self.max_value {
            return None;
        }

        let span = self.max_value as i128 - self.min_value as i128;
        let left = if self.increment > 0 {
            self.max_value as i128 - current as i128
        } else {
            current as i128 - self.min_value as i128
        };
        Some(left as f64 * 100.0 / span as f64)
    }
}

/// Represents how urgent a finding is
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no action strictly required
    Info,
    /// Should be looked at
    Warning,
    /// Needs immediate attention
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::High => "HIGH",
        }
    }
}

/// Structured payload of a finding, used by the migration generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Index {
        index: QualifiedName,
        table: QualifiedName,
    },
    DuplicateIndexes {
        table: QualifiedName,
        first: QualifiedName,
        second: QualifiedName,
        /// The index that can be dropped safely, if either can
        drop_candidate: Option<QualifiedName>,
    },
    Table {
        table: QualifiedName,
    },
    ForeignKey {
        constraint: QualifiedName,
        table: QualifiedName,
        columns: Vec<Column>,
    },
    Sequence {
        sequence: QualifiedName,
    },
    Unevaluable {
        reason: String,
    },
    CheckFailure {
        message: String,
    },
}

/// A single reported health issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub severity: Severity,
    /// Affected objects in canonical (ascending) order
    pub objects: Vec<QualifiedName>,
    pub description: String,
    pub subject: Subject,
}

impl Finding {
    pub fn new(
        check: &str,
        severity: Severity,
        mut objects: Vec<QualifiedName>,
        description: impl Into<String>,
        subject: Subject,
    ) -> Self {
        objects.sort();
        objects.dedup();
        Self {
            check: check.to_string(),
            severity,
            objects,
            description: description.into(),
            subject,
        }
    }

    pub fn key(&self) -> FindingKey {
        FindingKey {
            check: self.check.clone(),
            objects: self.objects.clone(),
        }
    }
}

/// Stable deduplication key of a finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingKey {
    pub check: String,
    pub objects: Vec<QualifiedName>,
}

impl fmt::Display for FindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.check)?;
        for (i, object) in self.objects.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{object}")?;
        }
        Ok(())
    }
}

/// A corrective SQL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub finding: FindingKey,
    pub sql: String,
    /// `false` for statements that must not run inside a transaction block
    pub transaction_safe: bool,
}
