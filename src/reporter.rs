use crate::checker::Evaluation;
use crate::models::{Finding, Severity};
use clap::ValueEnum;
use itertools::Itertools;
use snafu::{ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum ReporterError {
    #[snafu(display("Failed to write output: {}", source))]
    OutputError { source: std::io::Error },
}

type Result<T, E = ReporterError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Markdown formatted report
    Markdown,
    /// JSON formatted report
    Json,
    /// Plain text summary
    Text,
}

const SEVERITIES: [Severity; 3] = [Severity::High, Severity::Warning, Severity::Info];

pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn report<W: Write>(&self, evaluation: &Evaluation, out: &mut W) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.report_markdown(evaluation, out),
            ReportFormat::Json => self.report_json(evaluation, out),
            ReportFormat::Text => self.report_text(evaluation, out),
        }
    }

    fn report_markdown<W: Write>(&self, evaluation: &Evaluation, out: &mut W) -> Result<()> {
        writeln!(out, "# PostgreSQL Schema Health Report\n").context(OutputSnafu)?;

        writeln!(out, "## Summary\n").context(OutputSnafu)?;
        writeln!(out, "- **Checks Run**: {}", evaluation.checks_run.len()).context(OutputSnafu)?;
        writeln!(out, "- **Findings**: {}", evaluation.findings.len()).context(OutputSnafu)?;
        for severity in SEVERITIES {
            let count = evaluation.count(severity);
            if count > 0 {
                writeln!(
                    out,
                    "- **{} ({})**: {}",
                    severity.as_str(),
                    self.format_severity_badge(severity),
                    count
                )
                .context(OutputSnafu)?;
            }
        }
        if !evaluation.failed_checks.is_empty() {
            writeln!(
                out,
                "- **Failed Checks**: {}",
                evaluation.failed_checks.join(", ")
            )
            .context(OutputSnafu)?;
        }
        if !evaluation.complete {
            writeln!(
                out,
                "- **Incomplete**: deadline reached before {} could run",
                evaluation.skipped_checks.join(", ")
            )
            .context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        if evaluation.findings.is_empty() {
            writeln!(out, "No issues found.").context(OutputSnafu)?;
            return Ok(());
        }

        // Grouped by check; within a group the evaluation order is kept
        let groups = evaluation
            .findings
            .iter()
            .into_group_map_by(|f| f.check.as_str());
        for check in groups.keys().sorted() {
            writeln!(out, "## {}\n", check).context(OutputSnafu)?;
            for finding in &groups[check] {
                self.write_finding_markdown(out, finding)?;
            }
        }

        Ok(())
    }

    fn write_finding_markdown<W: Write>(&self, out: &mut W, finding: &Finding) -> Result<()> {
        let objects = finding.objects.iter().map(|o| format!("`{}`", o)).join(", ");
        let title = if objects.is_empty() {
            finding.check.clone()
        } else {
            objects
        };
        writeln!(
            out,
            "### {} {}\n",
            title,
            self.format_severity_badge(finding.severity)
        )
        .context(OutputSnafu)?;
        writeln!(out, "{}\n", finding.description).context(OutputSnafu)?;
        Ok(())
    }

    fn format_severity_badge(&self, severity: Severity) -> &'static str {
        match severity {
            Severity::High => "![HIGH](https://img.shields.io/badge/HIGH-red)",
            Severity::Warning => "![WARNING](https://img.shields.io/badge/WARNING-orange)",
            Severity::Info => "![INFO](https://img.shields.io/badge/INFO-blue)",
        }
    }

    fn report_json<W: Write>(&self, evaluation: &Evaluation, out: &mut W) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, evaluation)
            .map_err(std::io::Error::from)
            .context(OutputSnafu)?;
        writeln!(out).context(OutputSnafu)?;
        Ok(())
    }

    fn report_text<W: Write>(&self, evaluation: &Evaluation, out: &mut W) -> Result<()> {
        writeln!(out, "PostgreSQL Schema Health Report").context(OutputSnafu)?;
        writeln!(out, "===============================\n").context(OutputSnafu)?;

        writeln!(out, "Summary:").context(OutputSnafu)?;
        writeln!(out, "  Checks Run: {}", evaluation.checks_run.len()).context(OutputSnafu)?;
        writeln!(out, "  Total Findings: {}", evaluation.findings.len()).context(OutputSnafu)?;
        for severity in SEVERITIES {
            let count = evaluation.count(severity);
            if count > 0 {
                writeln!(out, "  {}: {}", severity.as_str(), count).context(OutputSnafu)?;
            }
        }
        if !evaluation.complete {
            writeln!(
                out,
                "  Skipped (deadline): {}",
                evaluation.skipped_checks.join(", ")
            )
            .context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        for finding in &evaluation.findings {
            writeln!(
                out,
                "[{}] {}: {}",
                finding.severity.as_str(),
                finding.key(),
                finding.description
            )
            .context(OutputSnafu)?;
        }

        Ok(())
    }
}
