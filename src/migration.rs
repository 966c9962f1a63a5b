//! Corrective SQL for findings.
//!
//! Only a few findings have a mechanical fix: dropping a redundant or unused
//! index, rebuilding an invalid or bloated one, and (when asked) indexing an
//! uncovered foreign key. Everything else is advisory and produces nothing.

use crate::analysis::ids;
use crate::config::{ConfigError, IndentationOutOfRangeSnafu};
use crate::models::{quote_ident, Column, Finding, QualifiedName, SqlStatement, Subject};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ensure;
use std::collections::HashSet;
use tracing::{debug, info};

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1)
const MAX_IDENTIFIER_LENGTH: usize = 63;
const HASH_LENGTH: usize = 8;
const INDEX_SUFFIX: &str = "_idx";
const WITHOUT_NULLS_SUFFIX: &str = "_without_nulls";
pub const MAX_INDENTATION: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratingOptions {
    /// Use `CONCURRENTLY`; such statements cannot run inside a transaction.
    pub concurrently: bool,
    /// Emit `CREATE INDEX` for foreign keys without a covering index.
    pub index_foreign_keys: bool,
    /// Build foreign key indexes as partial indexes skipping NULL keys.
    pub exclude_nulls: bool,
    /// Put the `ON` clause (and a hashed name's comment) on lines of their own.
    pub break_lines: bool,
    /// Spaces before a broken `ON` clause, at most [`MAX_INDENTATION`]
    pub indentation: u8,
    pub uppercase_keywords: bool,
    /// Mark partial indexes with `_without_nulls` in the generated name.
    pub name_without_nulls: bool,
}

impl Default for GeneratingOptions {
    fn default() -> Self {
        Self {
            concurrently: true,
            index_foreign_keys: false,
            exclude_nulls: true,
            break_lines: true,
            indentation: 4,
            uppercase_keywords: false,
            name_without_nulls: true,
        }
    }
}

impl GeneratingOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.indentation <= MAX_INDENTATION,
            IndentationOutOfRangeSnafu {
                value: self.indentation,
                max: MAX_INDENTATION,
            }
        );
        Ok(())
    }
}

pub struct MigrationGenerator {
    options: GeneratingOptions,
}

impl MigrationGenerator {
    pub fn new(options: GeneratingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratingOptions {
        &self.options
    }

    /// Statements for `findings`, in finding order, without repeated SQL.
    ///
    /// An index dropped anywhere in the batch is never rebuilt, whichever
    /// finding comes first.
    pub fn generate(&self, findings: &[Finding]) -> Vec<SqlStatement> {
        let dropped: HashSet<&QualifiedName> = findings.iter().filter_map(drop_target).collect();
        let mut seen = HashSet::new();
        let mut statements = Vec::new();

        for finding in findings {
            let Some(sql) = self.statement_for(finding, &dropped) else {
                continue;
            };
            if !seen.insert(sql.clone()) {
                debug!("Skipping repeated statement for {}", finding.key());
                continue;
            }
            statements.push(SqlStatement {
                finding: finding.key(),
                sql,
                transaction_safe: !self.options.concurrently,
            });
        }

        info!(
            "Generated {} statements from {} findings",
            statements.len(),
            findings.len()
        );
        statements
    }

    fn statement_for(&self, finding: &Finding, dropped: &HashSet<&QualifiedName>) -> Option<String> {
        if let Some(index) = drop_target(finding) {
            return Some(self.drop_index(index));
        }
        match (finding.check.as_str(), &finding.subject) {
            (ids::INVALID_INDEXES | ids::BLOATED_INDEXES, Subject::Index { index, .. }) => {
                if dropped.contains(index) {
                    debug!("Not rebuilding {}, it is dropped by the same migration", index);
                    return None;
                }
                Some(self.reindex(index))
            }
            (ids::FOREIGN_KEYS_WITHOUT_INDEX, Subject::ForeignKey { table, columns, .. })
                if self.options.index_foreign_keys && !columns.is_empty() =>
            {
                Some(self.create_index(table, columns))
            }
            _ => None,
        }
    }

    fn keyword(&self, keyword: &str) -> String {
        if self.options.uppercase_keywords {
            keyword.to_uppercase()
        } else {
            keyword.to_string()
        }
    }

    fn concurrently(&self) -> String {
        if self.options.concurrently {
            format!(" {}", self.keyword("concurrently"))
        } else {
            String::new()
        }
    }

    fn drop_index(&self, index: &QualifiedName) -> String {
        format!(
            "{}{} {} {};",
            self.keyword("drop index"),
            self.concurrently(),
            self.keyword("if exists"),
            index.quoted()
        )
    }

    fn reindex(&self, index: &QualifiedName) -> String {
        format!(
            "{}{} {};",
            self.keyword("reindex index"),
            self.concurrently(),
            index.quoted()
        )
    }

    fn create_index(&self, table: &QualifiedName, columns: &[Column]) -> String {
        let nullable: Vec<&Column> = if self.options.exclude_nulls {
            columns.iter().filter(|c| c.nullable).collect()
        } else {
            Vec::new()
        };
        let name = index_name(
            &table.name,
            columns,
            self.options.name_without_nulls && !nullable.is_empty(),
        );
        let column_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let (line_break, on_break) = if self.options.break_lines {
            (
                "\n".to_string(),
                format!("\n{}", " ".repeat(usize::from(self.options.indentation))),
            )
        } else {
            (" ".to_string(), " ".to_string())
        };

        let mut sql = String::new();
        if name.is_hashed() {
            sql.push_str(&format!("/* {} */{}", name.full.replace("*/", "* /"), line_break));
        }
        sql.push_str(&format!(
            "{}{} {} {}{}{} {} ({})",
            self.keyword("create index"),
            self.concurrently(),
            self.keyword("if not exists"),
            quote_ident(&name.name),
            on_break,
            self.keyword("on"),
            table.quoted(),
            column_list
        ));
        if !nullable.is_empty() {
            let conditions = nullable
                .iter()
                .map(|c| format!("{} {}", quote_ident(&c.name), self.keyword("is not null")))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", self.keyword("and")));
            sql.push_str(&format!(" {} {}", self.keyword("where"), conditions));
        }
        sql.push(';');
        sql
    }

    /// Renders a migration file: transaction-safe statements inside one
    /// transaction, the rest after it.
    pub fn render_script(&self, statements: &[SqlStatement]) -> String {
        let mut script = format!("-- pghealth migration: {} statement(s)\n", statements.len());
        if statements.is_empty() {
            script.push_str("-- nothing to apply\n");
            return script;
        }

        let (transactional, standalone): (Vec<&SqlStatement>, Vec<&SqlStatement>) =
            statements.iter().partition(|s| s.transaction_safe);

        if !transactional.is_empty() {
            script.push_str(&format!("\n{};\n", self.keyword("begin")));
            push_statements(&mut script, &transactional);
            script.push_str(&format!("{};\n", self.keyword("commit")));
        }

        if !standalone.is_empty() {
            script.push_str("\n-- outside a transaction block\n");
            push_statements(&mut script, &standalone);
        }
        script
    }
}

fn push_statements(script: &mut String, statements: &[&SqlStatement]) {
    for statement in statements {
        script.push_str(&format!("-- {}\n{}\n", statement.finding, statement.sql));
    }
}

/// The index a finding asks to drop, if any.
fn drop_target(finding: &Finding) -> Option<&QualifiedName> {
    match (finding.check.as_str(), &finding.subject) {
        (
            ids::DUPLICATED_INDEXES,
            Subject::DuplicateIndexes {
                drop_candidate: Some(index),
                ..
            },
        ) => Some(index),
        (ids::UNUSED_INDEXES, Subject::Index { index, .. }) => Some(index),
        _ => None,
    }
}

/// A generated index name and the untruncated name it was derived from.
#[derive(Debug)]
struct IndexName {
    name: String,
    full: String,
}

impl IndexName {
    fn is_hashed(&self) -> bool {
        self.name != self.full
    }
}

/// `<table>_<columns>[_without_nulls]_idx`; names over the identifier limit
/// replace the column part with a hash of the full name.
fn index_name(table: &str, columns: &[Column], without_nulls: bool) -> IndexName {
    let suffix = if without_nulls {
        format!("{WITHOUT_NULLS_SUFFIX}{INDEX_SUFFIX}")
    } else {
        INDEX_SUFFIX.to_string()
    };
    let columns = columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join("_");
    let full = format!("{table}_{columns}{suffix}");
    if full.len() <= MAX_IDENTIFIER_LENGTH {
        return IndexName {
            name: full.clone(),
            full,
        };
    }

    let digest = format!("{:x}", Sha256::digest(full.as_bytes()));
    let hash = &digest[..HASH_LENGTH];
    let room = MAX_IDENTIFIER_LENGTH - suffix.len() - HASH_LENGTH - 1;
    IndexName {
        name: format!("{}_{hash}{suffix}", truncate_to_boundary(table, room)),
        full,
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
