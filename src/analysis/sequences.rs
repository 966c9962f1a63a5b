use crate::analysis::{ids, unevaluable, Check, CheckContext, CheckError};
use crate::models::{Finding, Severity, Subject};

/// Non-cycling sequences running out of values.
pub struct SequenceOverflow;

impl Check for SequenceOverflow {
    fn id(&self) -> &'static str {
        ids::SEQUENCE_OVERFLOW
    }

    fn description(&self) -> &'static str {
        "Sequences close to their maximum (or minimum) value"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CheckError> {
        let threshold = ctx.thresholds.sequence_remaining_percentage;
        let mut findings = Vec::new();

        for sequence in ctx.view.sequences().iter().filter(|s| !s.cycle) {
            let Some(remaining) = sequence.remaining_percentage() else {
                findings.push(unevaluable(
                    ids::SEQUENCE_OVERFLOW,
                    &sequence.name,
                    "inconsistent bounds or last value".into(),
                ));
                continue;
            };
            if remaining >= threshold {
                continue;
            }

            findings.push(Finding::new(
                ids::SEQUENCE_OVERFLOW,
                Severity::Warning,
                vec![sequence.name.clone()],
                format!(
                    "Sequence {} ({}) has {:.2}% of its values left; widen the column type or restart it before nextval fails",
                    sequence.name, sequence.data_type, remaining
                ),
                Subject::Sequence {
                    sequence: sequence.name.clone(),
                },
            ));
        }

        Ok(findings)
    }
}
