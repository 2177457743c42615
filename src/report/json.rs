use super::{collect_findings, Evidence, Finding, FindingKind};
use crate::analysis::UsageStatus;
use crate::harness::TestSummary;
use crate::orchestrator::{AnalysisKind, AnalysisReport, AnalysisStats};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, report: &AnalysisReport) -> Result<()> {
        let json = render(report)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("Report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }
}

/// Render the JSON document
pub fn render(report: &AnalysisReport) -> Result<String> {
    let findings = collect_findings(report);
    let document = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        root: report.root.display().to_string(),
        analyses: &report.analyses,
        summary: JsonSummary::new(report, &findings),
        stats: &report.stats,
        findings,
        verification: report.verification.as_ref(),
        warnings: &report.warnings,
    };
    serde_json::to_string_pretty(&document).into_diagnostic()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    root: String,
    analyses: &'a [AnalysisKind],
    summary: JsonSummary,
    stats: &'a AnalysisStats,
    findings: Vec<Finding>,
    verification: Option<&'a TestSummary>,
    warnings: &'a [String],
}

#[derive(Serialize)]
struct JsonSummary {
    total_findings: usize,
    dead_code: usize,
    duplicates: usize,
    candidate_unused_packages: usize,
    optional_packages: usize,
    verified_unused_packages: usize,
    verified_required_packages: usize,
    inconclusive_packages: usize,
    advisory: usize,
    verified: usize,
}

impl JsonSummary {
    fn new(report: &AnalysisReport, findings: &[Finding]) -> Self {
        let usage = |status| {
            report
                .dependency_usage
                .as_ref()
                .map(|u| u.count(status))
                .unwrap_or(0)
        };
        let verification = report.verification.as_ref();

        Self {
            total_findings: findings.len(),
            dead_code: count_kind(findings, FindingKind::DeadCode),
            duplicates: count_kind(findings, FindingKind::Duplicate),
            candidate_unused_packages: usage(UsageStatus::CandidateUnused),
            optional_packages: usage(UsageStatus::Optional),
            verified_unused_packages: verification.map(|s| s.unused).unwrap_or(0),
            verified_required_packages: verification.map(|s| s.required).unwrap_or(0),
            inconclusive_packages: verification.map(|s| s.inconclusive).unwrap_or(0),
            advisory: findings.iter().filter(|f| f.evidence == Evidence::Advisory).count(),
            verified: findings.iter().filter(|f| f.evidence == Evidence::Verified).count(),
        }
    }
}

fn count_kind(findings: &[Finding], kind: FindingKind) -> usize {
    findings.iter().filter(|f| f.kind == kind).count()
}
