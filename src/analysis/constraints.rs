//! Rules about primary and foreign keys.

use crate::analysis::{ids, table_finding, unevaluable, Check, CheckContext, CheckError};
use crate::models::{Column, Constraint, ConstraintKind, Finding, Index, Severity, Subject};
use crate::snapshot::Snapshot;
use itertools::Itertools;
use std::collections::HashSet;

pub struct TablesWithoutPrimaryKey;

impl Check for TablesWithoutPrimaryKey {
    fn id(&self) -> &'static str {
        ids::TABLES_WITHOUT_PRIMARY_KEY
    }

    fn description(&self) -> &'static str {
        "Tables without a primary key"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        Ok(ctx
            .view
            .tables()
            .iter()
            .filter(|table| {
                !snapshot
                    .constraints_on(&table.name)
                    .any(|c| c.kind == ConstraintKind::PrimaryKey)
            })
            .map(|table| {
                table_finding(
                    ids::TABLES_WITHOUT_PRIMARY_KEY,
                    Severity::Warning,
                    &table.name,
                    format!(
                        "Table {} has no primary key. Rows cannot be addressed reliably and logical replication of updates is impossible; choose a key",
                        table.name
                    ),
                )
            })
            .collect())
    }
}

fn foreign_keys<'a>(ctx: &CheckContext<'a>) -> impl Iterator<Item = &'a Constraint> + 'a {
    ctx.view
        .constraints()
        .to_vec()
        .into_iter()
        .filter(|c| c.kind == ConstraintKind::ForeignKey && !c.columns.is_empty())
}

/// An index covers a foreign key when the key columns, in any order, are
/// its leading columns.
fn covers(index: &Index, columns: &[String]) -> bool {
    if !index.valid || index.is_partial() {
        return false;
    }
    let leading = index.leading_columns();
    if leading.len() < columns.len() {
        return false;
    }
    let wanted: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let head: HashSet<&str> = leading[..columns.len()].iter().copied().collect();
    wanted == head
}

/// Column metadata of `names` on `constraint.table`; unknown columns are
/// assumed nullable.
fn referencing_columns(snapshot: &Snapshot, constraint: &Constraint) -> Vec<Column> {
    let table = snapshot.table(&constraint.table);
    constraint
        .columns
        .iter()
        .map(|name| {
            table
                .and_then(|t| t.column(name))
                .cloned()
                .unwrap_or_else(|| Column {
                    name: name.clone(),
                    data_type: String::new(),
                    nullable: true,
                })
        })
        .collect()
}

pub struct ForeignKeysWithoutIndex;

impl Check for ForeignKeysWithoutIndex {
    fn id(&self) -> &'static str {
        ids::FOREIGN_KEYS_WITHOUT_INDEX
    }

    fn description(&self) -> &'static str {
        "Foreign keys whose columns are not the leading columns of any index"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        let mut findings = Vec::new();

        for fk in foreign_keys(ctx) {
            if snapshot
                .indexes_on(&fk.table)
                .any(|index| covers(index, &fk.columns))
            {
                continue;
            }

            let referenced = fk
                .references
                .as_ref()
                .map(|r| r.table.to_string())
                .unwrap_or_else(|| "the referenced table".to_string());
            findings.push(Finding::new(
                ids::FOREIGN_KEYS_WITHOUT_INDEX,
                Severity::Warning,
                vec![fk.name.clone()],
                format!(
                    "Foreign key {} on {} ({}) is not covered by an index; every delete or key update on {} scans {}",
                    fk.name,
                    fk.table,
                    fk.columns.join(", "),
                    referenced,
                    fk.table
                ),
                Subject::ForeignKey {
                    constraint: fk.name.clone(),
                    table: fk.table.clone(),
                    columns: referencing_columns(snapshot, fk),
                },
            ));
        }

        Ok(findings)
    }
}

/// Foreign keys whose referencing and referenced column types differ.
pub struct ForeignKeysWithUnmatchedColumnType;

impl Check for ForeignKeysWithUnmatchedColumnType {
    fn id(&self) -> &'static str {
        ids::FOREIGN_KEYS_WITH_UNMATCHED_COLUMN_TYPE
    }

    fn description(&self) -> &'static str {
        "Foreign keys whose column types differ from the referenced columns"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        let check = ids::FOREIGN_KEYS_WITH_UNMATCHED_COLUMN_TYPE;
        let mut findings = Vec::new();

        for fk in foreign_keys(ctx) {
            let Some(reference) = &fk.references else {
                findings.push(unevaluable(check, &fk.name, "no referenced table recorded".into()));
                continue;
            };
            if reference.columns.len() != fk.columns.len() {
                findings.push(unevaluable(
                    check,
                    &fk.name,
                    "referencing and referenced column counts differ".into(),
                ));
                continue;
            }
            let (Some(table), Some(target)) =
                (snapshot.table(&fk.table), snapshot.table(&reference.table))
            else {
                findings.push(unevaluable(
                    check,
                    &fk.name,
                    format!("{} or {} is missing from the snapshot", fk.table, reference.table),
                ));
                continue;
            };

            let pairs = fk
                .columns
                .iter()
                .zip(&reference.columns)
                .map(|(from, to)| (table.column(from), target.column(to)))
                .collect::<Vec<_>>();
            if pairs.iter().any(|(from, to)| from.is_none() || to.is_none()) {
                findings.push(unevaluable(
                    check,
                    &fk.name,
                    "a key column is missing from its table".into(),
                ));
                continue;
            }

            let mismatched = pairs
                .iter()
                .filter_map(|&(from, to)| Some((from?, to?)))
                .filter(|(from, to)| !same_type(&from.data_type, &to.data_type))
                .map(|(from, to)| {
                    format!(
                        "{} {} -> {}.{} {}",
                        from.name, from.data_type, reference.table, to.name, to.data_type
                    )
                })
                .collect::<Vec<_>>();
            if mismatched.is_empty() {
                continue;
            }

            findings.push(Finding::new(
                check,
                Severity::Warning,
                vec![fk.name.clone()],
                format!(
                    "Foreign key {} on {} joins columns of different types ({}); comparisons need casts and the referenced index may not be usable",
                    fk.name,
                    fk.table,
                    mismatched.iter().join("; ")
                ),
                Subject::ForeignKey {
                    constraint: fk.name.clone(),
                    table: fk.table.clone(),
                    columns: referencing_columns(snapshot, fk),
                },
            ));
        }

        Ok(findings)
    }
}

fn same_type(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
