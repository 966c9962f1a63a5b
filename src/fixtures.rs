//! Builders shared by unit tests.

use crate::analysis::{Check, CheckContext};
use crate::config::Thresholds;
use crate::models::{
    Column, Constraint, ConstraintKind, ForeignReference, Index, IndexKey, QualifiedName,
    Sequence, Table,
};
use crate::snapshot::{Snapshot, SnapshotView};

/// `"schema.name"` or a bare name in `public`.
pub(crate) fn qn(name: &str) -> QualifiedName {
    match name.split_once('.') {
        Some((schema, object)) => QualifiedName::new(schema, object),
        None => QualifiedName::new("public", name),
    }
}

pub(crate) fn column(name: &str, data_type: &str, nullable: bool) -> Column {
    Column {
        name: name.into(),
        data_type: data_type.into(),
        nullable,
    }
}

/// A 100 MB table with 100k rows and no recorded scans.
pub(crate) fn table(name: &str) -> Table {
    Table {
        name: qn(name),
        columns: Vec::new(),
        row_estimate: 100_000,
        size_bytes: 100 * 1024 * 1024,
        seq_scans: 0,
        index_scans: 0,
        bloat_percentage: None,
        indexes: Vec::new(),
        constraints: Vec::new(),
    }
}

/// A valid, non-unique btree index that has been scanned 100 times.
pub(crate) fn btree(name: &str, table: &str, columns: &[&str]) -> Index {
    Index {
        name: qn(name),
        table: qn(table),
        keys: columns.iter().map(|c| IndexKey::column(*c)).collect(),
        method: "btree".into(),
        unique: false,
        valid: true,
        predicate: None,
        size_bytes: 1024 * 1024,
        scans: 100,
        bloat_percentage: None,
    }
}

pub(crate) fn primary_key(
    name: &str,
    table: &str,
    columns: &[&str],
    index: Option<&str>,
) -> Constraint {
    Constraint {
        name: qn(name),
        table: qn(table),
        kind: ConstraintKind::PrimaryKey,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        references: None,
        index: index.map(qn),
    }
}

pub(crate) fn foreign_key(
    name: &str,
    table: &str,
    columns: &[&str],
    referenced_table: &str,
    referenced_columns: &[&str],
) -> Constraint {
    Constraint {
        name: qn(name),
        table: qn(table),
        kind: ConstraintKind::ForeignKey,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        references: Some(ForeignReference {
            table: qn(referenced_table),
            columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        }),
        index: None,
    }
}

/// An ascending integer sequence starting at 1 that has never been used.
pub(crate) fn sequence(name: &str, max_value: i64) -> Sequence {
    Sequence {
        name: qn(name),
        data_type: "integer".into(),
        start: 1,
        increment: 1,
        min_value: 1,
        max_value,
        last_value: None,
        cycle: false,
    }
}

pub(crate) fn snapshot(
    tables: Vec<Table>,
    indexes: Vec<Index>,
    constraints: Vec<Constraint>,
) -> Snapshot {
    Snapshot::new(tables, indexes, constraints, Vec::new()).expect("valid test snapshot")
}

pub(crate) fn snapshot_with_sequences(sequences: Vec<Sequence>) -> Snapshot {
    Snapshot::new(Vec::new(), Vec::new(), Vec::new(), sequences).expect("valid test snapshot")
}

pub(crate) fn evaluate_check(check: &dyn Check, snapshot: &Snapshot) -> Vec<crate::models::Finding> {
    evaluate_check_with(check, snapshot, &Thresholds::default())
}

pub(crate) fn evaluate_check_with(
    check: &dyn Check,
    snapshot: &Snapshot,
    thresholds: &Thresholds,
) -> Vec<crate::models::Finding> {
    let ctx = CheckContext::new(SnapshotView::full(snapshot), thresholds);
    let mut findings = check.evaluate(&ctx).expect("check should not fail");
    findings.sort_by(|a, b| a.objects.cmp(&b.objects));
    findings
}
