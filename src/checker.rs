use crate::analysis::{Check, CheckContext};
use crate::config::{ConfigError, HealthConfig, Thresholds};
use crate::exclusion::Exclusions;
use crate::models::{Finding, Severity, Subject};
use crate::registry::CheckRegistry;
use crate::snapshot::Snapshot;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-run settings of the [`DiagnosticEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub exclusions: Exclusions,
    /// Checks not started within this budget are skipped
    pub deadline: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &HealthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds.clone(),
            exclusions: Exclusions::compile(&config.exclusions)?,
            deadline: config.deadline(),
        })
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, Default, Serialize)]
pub struct Evaluation {
    /// Deduplicated findings, most severe first
    pub findings: Vec<Finding>,
    pub checks_run: Vec<String>,
    pub failed_checks: Vec<String>,
    pub skipped_checks: Vec<String>,
    /// `false` when the deadline cut the run short
    pub complete: bool,
}

impl Evaluation {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

enum CheckOutcome {
    Completed(Vec<Finding>),
    Failed(Finding),
    Skipped,
}

/// Runs the enabled checks of a registry over snapshots.
pub struct DiagnosticEngine<'r> {
    registry: &'r CheckRegistry,
    settings: EngineSettings,
}

impl<'r> DiagnosticEngine<'r> {
    pub fn new(registry: &'r CheckRegistry, settings: EngineSettings) -> Self {
        Self { registry, settings }
    }

    pub fn evaluate(&self, snapshot: &Snapshot) -> Evaluation {
        let checks = self.registry.enabled_checks();
        let started = Instant::now();
        info!(
            "Evaluating {} checks against {} tables, {} indexes",
            checks.len(),
            snapshot.tables().len(),
            snapshot.indexes().len()
        );

        // collect() keeps registry order regardless of completion order
        let outcomes: Vec<CheckOutcome> = checks
            .par_iter()
            .map(|check| self.run_check(check.as_ref(), snapshot, started))
            .collect();

        let mut evaluation = Evaluation {
            complete: true,
            ..Default::default()
        };
        let mut merged = Vec::new();
        for (check, outcome) in checks.iter().zip(outcomes) {
            match outcome {
                CheckOutcome::Completed(findings) => {
                    debug!("Check {} produced {} findings", check.id(), findings.len());
                    evaluation.checks_run.push(check.id().to_string());
                    merged.extend(findings);
                }
                CheckOutcome::Failed(finding) => {
                    evaluation.failed_checks.push(check.id().to_string());
                    merged.push(finding);
                }
                CheckOutcome::Skipped => {
                    evaluation.skipped_checks.push(check.id().to_string());
                    evaluation.complete = false;
                }
            }
        }

        evaluation.findings = normalize(merged);
        if !evaluation.complete {
            warn!(
                "Deadline reached; skipped checks: {}",
                evaluation.skipped_checks.join(", ")
            );
        }
        info!(
            "Evaluation finished in {:?} with {} findings",
            started.elapsed(),
            evaluation.findings.len()
        );
        evaluation
    }

    fn run_check(&self, check: &dyn Check, snapshot: &Snapshot, started: Instant) -> CheckOutcome {
        if let Some(deadline) = self.settings.deadline {
            if started.elapsed() >= deadline {
                return CheckOutcome::Skipped;
            }
        }

        let view = self.settings.exclusions.view_for(snapshot, check.id());
        let ctx = CheckContext::new(view, &self.settings.thresholds);
        match panic::catch_unwind(AssertUnwindSafe(|| check.evaluate(&ctx))) {
            Ok(Ok(findings)) => CheckOutcome::Completed(findings),
            Ok(Err(err)) => {
                warn!("Check {} failed: {}", check.id(), err);
                CheckOutcome::Failed(failure_finding(check.id(), err.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Check {} panicked: {}", check.id(), message);
                CheckOutcome::Failed(failure_finding(check.id(), message))
            }
        }
    }
}

/// Deduplicates by key (first seen wins) and sorts by severity descending,
/// then objects, then check id.
pub fn normalize(findings: Vec<Finding>) -> Vec<Finding> {
    let mut findings: Vec<Finding> = findings.into_iter().unique_by(Finding::key).collect();
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.objects.cmp(&b.objects))
            .then_with(|| a.check.cmp(&b.check))
    });
    findings
}

fn failure_finding(check: &str, message: String) -> Finding {
    Finding::new(
        check,
        Severity::Info,
        Vec::new(),
        format!("Check {} could not complete: {}", check, message),
        Subject::CheckFailure { message },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
