use super::{comparable, enforces_constraint, has_keys, is_strict_prefix};
use crate::analysis::{ids, index_finding, size_pretty, Check, CheckContext, CheckError};
use crate::models::{Finding, Index, QualifiedName, Severity, Subject};
use crate::snapshot::Snapshot;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Indexes whose definition is identical to, or a redundant prefix of,
/// another index on the same table.
pub struct DuplicatedIndexes;

impl Check for DuplicatedIndexes {
    fn id(&self) -> &'static str {
        ids::DUPLICATED_INDEXES
    }

    fn description(&self) -> &'static str {
        "Indexes duplicated by, or a redundant prefix of, another index on the same table"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        let mut by_table: BTreeMap<&QualifiedName, Vec<&Index>> = BTreeMap::new();
        for index in ctx.view.indexes().iter().copied().filter(|i| has_keys(i)) {
            by_table.entry(&index.table).or_default().push(index);
        }

        let findings = by_table
            .values()
            .flat_map(|group| group.iter().tuple_combinations())
            .filter_map(|(a, b)| compare_pair(snapshot, a, b))
            .collect();
        Ok(findings)
    }
}

fn compare_pair(snapshot: &Snapshot, a: &Index, b: &Index) -> Option<Finding> {
    if !comparable(a, b) {
        return None;
    }

    let (description, drop_candidate) = if a.keys == b.keys {
        let candidate = redundant_of_identical(snapshot, a, b);
        let verdict = match candidate {
            Some(index) => format!("{} is redundant", index.name),
            None => "both enforce constraints, so neither can be dropped safely".to_string(),
        };
        (
            format!(
                "Indexes {} and {} on {} have identical definitions; {}",
                a.name, b.name, a.table, verdict
            ),
            candidate.map(|i| i.name.clone()),
        )
    } else {
        let (shorter, longer) = if is_strict_prefix(&a.keys, &b.keys) {
            (a, b)
        } else if is_strict_prefix(&b.keys, &a.keys) {
            (b, a)
        } else {
            return None;
        };
        // a unique index constrains data; only plain btree prefixes are redundant
        if shorter.unique || longer.unique || !shorter.is_btree() {
            return None;
        }
        let candidate = (!enforces_constraint(snapshot, shorter)).then(|| shorter.name.clone());
        (
            format!(
                "{} is redundant: its columns are a prefix of {} on {}",
                shorter.name, longer.name, shorter.table
            ),
            candidate,
        )
    };

    let (first, second) = if a.name <= b.name { (a, b) } else { (b, a) };
    Some(Finding::new(
        ids::DUPLICATED_INDEXES,
        Severity::Warning,
        vec![first.name.clone(), second.name.clone()],
        description,
        Subject::DuplicateIndexes {
            table: a.table.clone(),
            first: first.name.clone(),
            second: second.name.clone(),
            drop_candidate,
        },
    ))
}

/// Picks which of two identical indexes can go: constraint-enforcing and
/// unique indexes are kept, ties drop the lexically greater name.
fn redundant_of_identical<'a>(snapshot: &Snapshot, a: &'a Index, b: &'a Index) -> Option<&'a Index> {
    let rank = |index: &Index| (enforces_constraint(snapshot, index), index.unique);
    let (a_rank, b_rank) = (rank(a), rank(b));
    if a_rank.0 && b_rank.0 {
        return None;
    }
    let (lower, higher) = if a.name <= b.name { (a, b) } else { (b, a) };
    if rank(lower) < rank(higher) {
        Some(lower)
    } else {
        Some(higher)
    }
}

/// Indexes left invalid, typically by a failed `CREATE INDEX CONCURRENTLY`.
pub struct InvalidIndexes;

impl Check for InvalidIndexes {
    fn id(&self) -> &'static str {
        ids::INVALID_INDEXES
    }

    fn description(&self) -> &'static str {
        "Indexes marked invalid in the catalog"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        Ok(ctx
            .view
            .indexes()
            .iter()
            .filter(|index| !index.valid)
            .map(|index| {
                index_finding(
                    ids::INVALID_INDEXES,
                    Severity::High,
                    index,
                    format!(
                        "Index {} on {} is invalid. It is maintained on every write but never used by the planner; rebuild it",
                        index.name, index.table
                    ),
                )
            })
            .collect())
    }
}

pub struct UnusedIndexes;

impl Check for UnusedIndexes {
    fn id(&self) -> &'static str {
        ids::UNUSED_INDEXES
    }

    fn description(&self) -> &'static str {
        "Non-unique indexes that are (almost) never scanned on tables of meaningful size"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        let thresholds = ctx.thresholds;
        let mut findings = Vec::new();

        for index in ctx.view.indexes().iter().copied() {
            if index.unique || !index.valid || enforces_constraint(snapshot, index) {
                continue;
            }
            if index.scans < 0 || index.scans > thresholds.unused_scan_threshold {
                continue;
            }
            // small tables are read sequentially anyway
            let Some(table) = snapshot.table(&index.table) else {
                continue;
            };
            if table.size_bytes < thresholds.unused_min_table_size_bytes {
                continue;
            }

            findings.push(index_finding(
                ids::UNUSED_INDEXES,
                Severity::Warning,
                index,
                format!(
                    "Index {} has been scanned {} times and does not enforce a constraint. Dropping it reclaims {} and removes write overhead on {}",
                    index.name,
                    index.scans,
                    size_pretty(index.size_bytes),
                    index.table
                ),
            ));
        }

        Ok(findings)
    }
}

/// Non-unique, non-partial indexes over nullable columns.
pub struct IndexesWithNullValues;

impl Check for IndexesWithNullValues {
    fn id(&self) -> &'static str {
        ids::INDEXES_WITH_NULL_VALUES
    }

    fn description(&self) -> &'static str {
        "Indexes storing NULL entries that a partial index could leave out"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let snapshot = ctx.snapshot();
        let mut findings = Vec::new();

        for index in ctx.view.indexes().iter().copied() {
            if index.unique || index.is_partial() || !index.valid || !has_keys(index) {
                continue;
            }
            let Some(table) = snapshot.table(&index.table) else {
                continue;
            };
            let nullable = index
                .keys
                .iter()
                .filter_map(|key| key.column_name())
                .filter(|name| table.column(name).is_some_and(|c| c.nullable))
                .collect::<Vec<_>>();
            if nullable.is_empty() {
                continue;
            }

            findings.push(index_finding(
                ids::INDEXES_WITH_NULL_VALUES,
                Severity::Info,
                index,
                format!(
                    "Index {} covers nullable column(s) {}. If queries never look up NULLs, a partial index with WHERE ... IS NOT NULL is smaller",
                    index.name,
                    nullable.join(", ")
                ),
            ));
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ids;
    use crate::fixtures::{btree, column, evaluate_check, primary_key, qn, snapshot, table};
    use rstest::rstest;

    fn orders() -> crate::models::Table {
        let mut orders = table("orders");
        orders.columns = vec![
            column("id", "bigint", false),
            column("customer_id", "bigint", false),
            column("created_at", "timestamptz", false),
            column("note", "text", true),
        ];
        orders
    }

    #[test]
    fn prefix_index_is_redundant() {
        let snapshot = snapshot(
            vec![orders()],
            vec![
                btree("idx_a", "orders", &["customer_id"]),
                btree("idx_b", "orders", &["customer_id", "created_at"]),
            ],
            vec![],
        );

        let findings = evaluate_check(&DuplicatedIndexes, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].objects, vec![qn("idx_a"), qn("idx_b")]);
        assert!(matches!(
            &findings[0].subject,
            Subject::DuplicateIndexes { drop_candidate: Some(name), .. } if name == &qn("idx_a")
        ));
    }

    #[test]
    fn valid_index_is_never_redundant_to_an_invalid_one() {
        let mut superset = btree("idx_b", "orders", &["customer_id", "created_at"]);
        superset.valid = false;
        let mut twin = btree("idx_c", "orders", &["customer_id"]);
        twin.valid = false;
        let snapshot = snapshot(
            vec![orders()],
            vec![btree("idx_a", "orders", &["customer_id"]), superset, twin],
            vec![],
        );

        assert!(evaluate_check(&DuplicatedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn identical_pair_yields_one_finding_regardless_of_order() {
        let forward = snapshot(
            vec![orders()],
            vec![
                btree("idx_x", "orders", &["customer_id"]),
                btree("idx_y", "orders", &["customer_id"]),
            ],
            vec![],
        );
        let reversed = snapshot(
            vec![orders()],
            vec![
                btree("idx_y", "orders", &["customer_id"]),
                btree("idx_x", "orders", &["customer_id"]),
            ],
            vec![],
        );

        let a = evaluate_check(&DuplicatedIndexes, &forward);
        let b = evaluate_check(&DuplicatedIndexes, &reversed);
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert!(matches!(
            &a[0].subject,
            Subject::DuplicateIndexes { drop_candidate: Some(name), .. } if name == &qn("idx_y")
        ));
    }

    #[test]
    fn identical_unique_index_is_kept_over_plain_one() {
        let mut key = btree("orders_customer_key", "orders", &["customer_id"]);
        key.unique = true;
        let snapshot = snapshot(
            vec![orders()],
            vec![key, btree("a_plain_idx", "orders", &["customer_id"])],
            vec![],
        );

        let findings = evaluate_check(&DuplicatedIndexes, &snapshot);
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            &findings[0].subject,
            Subject::DuplicateIndexes { drop_candidate: Some(name), .. } if name == &qn("a_plain_idx")
        ));
    }

    #[test]
    fn identical_constraint_indexes_have_no_drop_candidate() {
        let mut pkey = btree("orders_pkey", "orders", &["id"]);
        pkey.unique = true;
        let mut key = btree("orders_id_key", "orders", &["id"]);
        key.unique = true;
        let mut unique = primary_key("orders_id_key", "orders", &["id"], Some("orders_id_key"));
        unique.kind = crate::models::ConstraintKind::Unique;
        let snapshot = snapshot(
            vec![orders()],
            vec![pkey, key],
            vec![
                primary_key("orders_pkey", "orders", &["id"], Some("orders_pkey")),
                unique,
            ],
        );

        let findings = evaluate_check(&DuplicatedIndexes, &snapshot);
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            &findings[0].subject,
            Subject::DuplicateIndexes {
                drop_candidate: None,
                ..
            }
        ));
    }

    #[test]
    fn unique_prefix_is_never_redundant() {
        let mut short = btree("idx_a", "orders", &["customer_id"]);
        short.unique = true;
        let snapshot = snapshot(
            vec![orders()],
            vec![short, btree("idx_b", "orders", &["customer_id", "created_at"])],
            vec![],
        );
        assert!(evaluate_check(&DuplicatedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn different_opclass_or_method_is_not_duplicate() {
        let mut pattern = btree("idx_pattern", "orders", &["note"]);
        pattern.keys = vec![crate::models::IndexKey::Column {
            name: "note".into(),
            order: Default::default(),
            opclass: Some("text_pattern_ops".into()),
            collation: None,
        }];
        let mut hash = btree("idx_hash", "orders", &["note"]);
        hash.method = "hash".into();
        let snapshot = snapshot(
            vec![orders()],
            vec![pattern, hash, btree("idx_plain", "orders", &["note"])],
            vec![],
        );
        assert!(evaluate_check(&DuplicatedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn indexes_on_different_tables_are_never_compared() {
        let snapshot = snapshot(
            vec![orders(), table("users")],
            vec![
                btree("orders_idx", "orders", &["id"]),
                btree("users_idx", "users", &["id"]),
            ],
            vec![],
        );
        assert!(evaluate_check(&DuplicatedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn keyless_and_expression_indexes_do_not_break_comparison() {
        let mut empty = btree("idx_empty", "orders", &[]);
        empty.keys.clear();
        let mut expr = btree("idx_expr", "orders", &[]);
        expr.keys = vec![crate::models::IndexKey::Expression {
            text: "lower(note)".into(),
        }];
        let mut expr_copy = expr.clone();
        expr_copy.name = qn("idx_expr_copy");
        let snapshot = snapshot(vec![orders()], vec![empty, expr, expr_copy], vec![]);

        let findings = evaluate_check(&DuplicatedIndexes, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].objects, vec![qn("idx_expr"), qn("idx_expr_copy")]);
    }

    #[test]
    fn invalid_index_is_high_severity() {
        let mut broken = btree("idx_broken", "orders", &["customer_id"]);
        broken.valid = false;
        let snapshot = snapshot(vec![orders()], vec![broken], vec![]);

        let findings = evaluate_check(&InvalidIndexes, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].check, ids::INVALID_INDEXES);
    }

    #[rstest]
    #[case(4, true)]
    #[case(5, true)]
    #[case(6, false)]
    fn unused_threshold_is_inclusive(#[case] scans: i64, #[case] flagged: bool) {
        let mut index = btree("idx_rarely", "orders", &["customer_id"]);
        index.scans = scans;
        let snapshot = snapshot(vec![orders()], vec![index], vec![]);
        let thresholds = crate::config::Thresholds {
            unused_scan_threshold: 5,
            ..Default::default()
        };

        let findings =
            crate::fixtures::evaluate_check_with(&UnusedIndexes, &snapshot, &thresholds);
        assert_eq!(findings.len(), usize::from(flagged));
    }

    #[test]
    fn unused_index_on_small_table_is_ignored() {
        let mut small = orders();
        small.size_bytes = 8192;
        let mut index = btree("idx_unused", "orders", &["customer_id"]);
        index.scans = 0;
        let snapshot = snapshot(vec![small], vec![index], vec![]);
        assert!(evaluate_check(&UnusedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn unused_constraint_index_is_ignored() {
        let mut index = btree("orders_pkey", "orders", &["id"]);
        index.scans = 0;
        let snapshot = snapshot(
            vec![orders()],
            vec![index],
            vec![primary_key("orders_pkey", "orders", &["id"], Some("orders_pkey"))],
        );
        assert!(evaluate_check(&UnusedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn unused_index_without_owning_table_is_skipped() {
        let mut orphan = btree("idx_orphan", "missing", &["id"]);
        orphan.scans = 0;
        let snapshot = snapshot(vec![orders()], vec![orphan], vec![]);
        assert!(evaluate_check(&UnusedIndexes, &snapshot).is_empty());
    }

    #[test]
    fn reports_nullable_columns_in_plain_index() {
        let mut partial = btree("idx_note_partial", "orders", &["note"]);
        partial.predicate = Some("note IS NOT NULL".into());
        let snapshot = snapshot(
            vec![orders()],
            vec![
                btree("idx_note", "orders", &["customer_id", "note"]),
                partial,
                btree("idx_customer", "orders", &["customer_id"]),
            ],
            vec![],
        );

        let findings = evaluate_check(&IndexesWithNullValues, &snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].objects, vec![qn("idx_note")]);
        assert!(findings[0].description.contains("note"));
    }
}
