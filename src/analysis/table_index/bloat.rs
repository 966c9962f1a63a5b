use crate::analysis::{
    ids, index_finding, size_pretty, table_finding, Check, CheckContext, CheckError,
};
use crate::config::Thresholds;
use crate::models::{Finding, Severity};

/// Returns the bloat estimate when it is usable and above both thresholds.
fn excessive_bloat(percentage: Option<f64>, size_bytes: i64, thresholds: &Thresholds) -> Option<f64> {
    let percentage = percentage?;
    // estimates outside [0, 100] are garbage from the estimator
    if !(0.0..=100.0).contains(&percentage) {
        return None;
    }
    (percentage > thresholds.bloat_percentage && size_bytes >= thresholds.bloat_min_size_bytes)
        .then_some(percentage)
}

pub struct BloatedTables;

impl Check for BloatedTables {
    fn id(&self) -> &'static str {
        ids::BLOATED_TABLES
    }

    fn description(&self) -> &'static str {
        "Tables whose estimated bloat exceeds the configured percentage"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        Ok(ctx
            .view
            .tables()
            .iter()
            .filter_map(|table| {
                let percentage =
                    excessive_bloat(table.bloat_percentage, table.size_bytes, ctx.thresholds)?;
                Some(table_finding(
                    ids::BLOATED_TABLES,
                    Severity::Warning,
                    &table.name,
                    format!(
                        "Table {} is ~{:.1}% bloated ({} on disk). VACUUM does not return this space; use pg_repack or VACUUM FULL in a maintenance window",
                        table.name,
                        percentage,
                        size_pretty(table.size_bytes)
                    ),
                ))
            })
            .collect())
    }
}

pub struct BloatedIndexes;

impl Check for BloatedIndexes {
    fn id(&self) -> &'static str {
        ids::BLOATED_INDEXES
    }

    fn description(&self) -> &'static str {
        "Indexes whose estimated bloat exceeds the configured percentage"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        Ok(ctx
            .view
            .indexes()
            .iter()
            // invalid indexes get their own, more urgent finding
            .filter(|index| index.valid)
            .filter_map(|index| {
                let percentage =
                    excessive_bloat(index.bloat_percentage, index.size_bytes, ctx.thresholds)?;
                Some(index_finding(
                    ids::BLOATED_INDEXES,
                    Severity::Warning,
                    index,
                    format!(
                        "Index {} is ~{:.1}% bloated ({} on disk); rebuilding it reclaims the space",
                        index.name,
                        percentage,
                        size_pretty(index.size_bytes)
                    ),
                ))
            })
            .collect())
    }
}

/// Sizable tables read mostly through sequential scans.
pub struct TablesWithMissingIndexes;

impl Check for TablesWithMissingIndexes {
    fn id(&self) -> &'static str {
        ids::TABLES_WITH_MISSING_INDEXES
    }

    fn description(&self) -> &'static str {
        "Large tables where sequential scans outnumber index scans"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let min_rows = ctx.thresholds.missing_index_min_rows;
        Ok(ctx
            .view
            .tables()
            .iter()
            .filter(|table| table.seq_scans >= 0 && table.index_scans >= 0)
            .filter(|table| table.row_estimate >= min_rows && table.seq_scans > table.index_scans)
            .map(|table| {
                table_finding(
                    ids::TABLES_WITH_MISSING_INDEXES,
                    Severity::Info,
                    &table.name,
                    format!(
                        "Table {} (~{} rows) was read by {} sequential scans vs {} index scans; frequent filters on it likely lack an index",
                        table.name, table.row_estimate, table.seq_scans, table.index_scans
                    ),
                )
            })
            .collect())
    }
}
