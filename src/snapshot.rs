//! Immutable metadata snapshot and the filtered views checks evaluate against.

use crate::models::{Constraint, Index, QualifiedName, Sequence, Table};
use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Snafu)]
pub enum SnapshotError {
    #[snafu(display("Duplicate {} identifier in snapshot: {}", kind, name))]
    DuplicateIdentifier {
        kind: &'static str,
        name: QualifiedName,
    },
}

type Result<T, E = SnapshotError> = std::result::Result<T, E>;

/// Plain serialized form of a [`Snapshot`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotParts {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

/// Metadata of one database at one instant.
///
/// Every entity set is sorted by name and keyed by a unique qualified name.
/// Once built, a snapshot is never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "SnapshotParts", into = "SnapshotParts")]
pub struct Snapshot {
    tables: Vec<Table>,
    indexes: Vec<Index>,
    constraints: Vec<Constraint>,
    sequences: Vec<Sequence>,
    table_pos: HashMap<QualifiedName, usize>,
    index_pos: HashMap<QualifiedName, usize>,
    indexes_by_table: HashMap<QualifiedName, Vec<usize>>,
    constraints_by_table: HashMap<QualifiedName, Vec<usize>>,
    backing: HashMap<QualifiedName, usize>,
}

impl Snapshot {
    pub fn new(
        mut tables: Vec<Table>,
        mut indexes: Vec<Index>,
        mut constraints: Vec<Constraint>,
        mut sequences: Vec<Sequence>,
    ) -> Result<Self> {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        constraints.sort_by(|a, b| a.name.cmp(&b.name));
        sequences.sort_by(|a, b| a.name.cmp(&b.name));

        ensure_unique("table", tables.iter().map(|t| &t.name))?;
        ensure_unique("index", indexes.iter().map(|i| &i.name))?;
        ensure_unique("constraint", constraints.iter().map(|c| &c.name))?;
        ensure_unique("sequence", sequences.iter().map(|s| &s.name))?;

        let mut indexes_by_table: HashMap<QualifiedName, Vec<usize>> = HashMap::new();
        for (pos, index) in indexes.iter().enumerate() {
            indexes_by_table
                .entry(index.table.clone())
                .or_default()
                .push(pos);
        }

        let mut constraints_by_table: HashMap<QualifiedName, Vec<usize>> = HashMap::new();
        let mut backing = HashMap::new();
        for (pos, constraint) in constraints.iter().enumerate() {
            constraints_by_table
                .entry(constraint.table.clone())
                .or_default()
                .push(pos);
            if let Some(index) = &constraint.index {
                backing.entry(index.clone()).or_insert(pos);
            }
        }

        for table in &mut tables {
            table.indexes = indexes_by_table
                .get(&table.name)
                .map(|positions| positions.iter().map(|&p| indexes[p].name.clone()).collect())
                .unwrap_or_default();
            table.constraints = constraints_by_table
                .get(&table.name)
                .map(|positions| {
                    positions
                        .iter()
                        .map(|&p| constraints[p].name.clone())
                        .collect()
                })
                .unwrap_or_default();
        }

        let table_pos = tables
            .iter()
            .enumerate()
            .map(|(pos, t)| (t.name.clone(), pos))
            .collect();
        let index_pos = indexes
            .iter()
            .enumerate()
            .map(|(pos, i)| (i.name.clone(), pos))
            .collect();

        Ok(Self {
            tables,
            indexes,
            constraints,
            sequences,
            table_pos,
            index_pos,
            indexes_by_table,
            constraints_by_table,
            backing,
        })
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn table(&self, name: &QualifiedName) -> Option<&Table> {
        self.table_pos.get(name).map(|&pos| &self.tables[pos])
    }

    pub fn index(&self, name: &QualifiedName) -> Option<&Index> {
        self.index_pos.get(name).map(|&pos| &self.indexes[pos])
    }

    /// All indexes defined on `table`, in name order.
    pub fn indexes_on<'a>(&'a self, table: &QualifiedName) -> impl Iterator<Item = &'a Index> {
        self.indexes_by_table
            .get(table)
            .into_iter()
            .flatten()
            .map(|&pos| &self.indexes[pos])
    }

    /// All constraints defined on `table`, in name order.
    pub fn constraints_on<'a>(
        &'a self,
        table: &QualifiedName,
    ) -> impl Iterator<Item = &'a Constraint> {
        self.constraints_by_table
            .get(table)
            .into_iter()
            .flatten()
            .map(|&pos| &self.constraints[pos])
    }

    /// The constraint enforced through `index`, if any.
    pub fn backing_constraint(&self, index: &QualifiedName) -> Option<&Constraint> {
        self.backing.get(index).map(|&pos| &self.constraints[pos])
    }
}

fn ensure_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a QualifiedName>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        ensure!(
            seen.insert(name),
            DuplicateIdentifierSnafu {
                kind,
                name: name.clone(),
            }
        );
    }
    Ok(())
}

impl TryFrom<SnapshotParts> for Snapshot {
    type Error = SnapshotError;

    fn try_from(parts: SnapshotParts) -> Result<Self> {
        Snapshot::new(parts.tables, parts.indexes, parts.constraints, parts.sequences)
    }
}

impl From<Snapshot> for SnapshotParts {
    fn from(snapshot: Snapshot) -> Self {
        SnapshotParts {
            tables: snapshot.tables,
            indexes: snapshot.indexes,
            constraints: snapshot.constraints,
            sequences: snapshot.sequences,
        }
    }
}

/// The subset of a snapshot a single check is allowed to report on.
///
/// Lookups that only provide context (owning table, covering indexes,
/// referenced columns) go through [`SnapshotView::snapshot`] and see every
/// object.
#[derive(Debug, Clone)]
pub struct SnapshotView<'a> {
    snapshot: &'a Snapshot,
    tables: Vec<&'a Table>,
    indexes: Vec<&'a Index>,
    constraints: Vec<&'a Constraint>,
    sequences: Vec<&'a Sequence>,
}

impl<'a> SnapshotView<'a> {
    pub fn full(snapshot: &'a Snapshot) -> Self {
        Self::filtered(snapshot, |_| true)
    }

    /// Keeps objects for which `considered` holds. Indexes and constraints
    /// are dropped together with their owning table.
    pub fn filtered(snapshot: &'a Snapshot, considered: impl Fn(&QualifiedName) -> bool) -> Self {
        Self {
            snapshot,
            tables: snapshot
                .tables
                .iter()
                .filter(|t| considered(&t.name))
                .collect(),
            indexes: snapshot
                .indexes
                .iter()
                .filter(|i| considered(&i.table) && considered(&i.name))
                .collect(),
            constraints: snapshot
                .constraints
                .iter()
                .filter(|c| considered(&c.table) && considered(&c.name))
                .collect(),
            sequences: snapshot
                .sequences
                .iter()
                .filter(|s| considered(&s.name))
                .collect(),
        }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn tables(&self) -> &[&'a Table] {
        &self.tables
    }

    pub fn indexes(&self) -> &[&'a Index] {
        &self.indexes
    }

    pub fn constraints(&self) -> &[&'a Constraint] {
        &self.constraints
    }

    pub fn sequences(&self) -> &[&'a Sequence] {
        &self.sequences
    }
}
