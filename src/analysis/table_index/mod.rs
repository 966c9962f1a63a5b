//! Index and table health rules.

pub mod bloat;
pub mod indexes;

use crate::models::{Index, IndexKey};
use crate::snapshot::Snapshot;

/// Indexes with no keys cannot be compared or judged by any rule.
fn has_keys(index: &Index) -> bool {
    !index.keys.is_empty()
}

fn enforces_constraint(snapshot: &Snapshot, index: &Index) -> bool {
    snapshot.backing_constraint(&index.name).is_some()
}

/// Two indexes are comparable when both are valid and live on the same table
/// with the same access method and the same partial predicate. An invalid
/// index serves no reads, so it never makes another index redundant.
fn comparable(a: &Index, b: &Index) -> bool {
    a.valid
        && b.valid
        && a.table == b.table
        && a.method.eq_ignore_ascii_case(&b.method)
        && a.predicate == b.predicate
}

fn is_strict_prefix(shorter: &[IndexKey], longer: &[IndexKey]) -> bool {
    shorter.len() < longer.len() && longer.starts_with(shorter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::btree;
    use crate::models::SortOrder;

    #[test]
    fn prefix_comparison_respects_sort_order() {
        let short = btree("a_idx", "orders", &["customer_id"]);
        let long = btree("ab_idx", "orders", &["customer_id", "created_at"]);
        assert!(is_strict_prefix(&short.keys, &long.keys));
        assert!(!is_strict_prefix(&long.keys, &short.keys));
        assert!(!is_strict_prefix(&short.keys, &short.keys));

        let mut descending = short.clone();
        descending.keys = vec![IndexKey::Column {
            name: "customer_id".into(),
            order: SortOrder::Desc,
            opclass: None,
            collation: None,
        }];
        assert!(!is_strict_prefix(&descending.keys, &long.keys));
    }

    #[test]
    fn different_predicates_are_not_comparable() {
        let full = btree("a_idx", "orders", &["customer_id"]);
        let mut partial = btree("b_idx", "orders", &["customer_id"]);
        partial.predicate = Some("deleted_at IS NULL".into());
        assert!(!comparable(&full, &partial));
        assert!(comparable(&full, &full.clone()));
    }

    #[test]
    fn invalid_indexes_are_not_comparable() {
        let valid = btree("a_idx", "orders", &["customer_id"]);
        let mut broken = btree("b_idx", "orders", &["customer_id", "created_at"]);
        broken.valid = false;
        assert!(!comparable(&valid, &broken));
        assert!(!comparable(&broken, &valid));
    }
}
