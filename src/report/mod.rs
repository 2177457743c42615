mod json;
mod sarif;
mod terminal;

pub use json::JsonReporter;
pub use sarif::SarifReporter;
pub use terminal::TerminalReporter;

use crate::analysis::{Confidence, FindingCode, Severity, UsageStatus};
use crate::harness::Outcome;
use crate::orchestrator::AnalysisReport;
use miette::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Default)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
    Sarif,
}

/// Which analysis produced a finding; also the primary sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    DeadCode,
    Duplicate,
    UnusedDependency,
}

/// Whether a finding was confirmed by running the test suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Evidence {
    Advisory,
    Verified,
}

/// One report row, flattened from whichever analysis produced it
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub code: &'static str,
    #[serde(skip)]
    pub rule: FindingCode,
    pub severity: Severity,
    pub confidence: Confidence,
    pub evidence: Evidence,
    pub file: PathBuf,
    pub line: usize,
    pub end_line: usize,
    pub message: String,
    /// Short labelled facts shown under the message
    pub details: Vec<String>,
}

/// Flatten a report into findings sorted by kind, file and line.
///
/// A package verified as unused replaces its static candidate finding; one
/// verified as required drops it.
pub fn collect_findings(report: &AnalysisReport) -> Vec<Finding> {
    let mut findings = Vec::new();

    for dc in &report.dead_code {
        let mut details: Vec<String> = dc
            .adjustments
            .iter()
            .map(|a| format!("{:+.2} {}", a.delta, a.reason))
            .collect();
        if !dc.potential_uses.is_empty() {
            details.push(format!("potential uses: {}", dc.potential_uses.join(", ")));
        }
        findings.push(Finding {
            kind: FindingKind::DeadCode,
            code: dc.code.code(),
            rule: dc.code,
            severity: dc.severity,
            confidence: dc.confidence,
            evidence: Evidence::Advisory,
            file: dc.symbol.location.file.clone(),
            line: dc.symbol.location.line,
            end_line: dc.symbol.location.end_line,
            message: dc.reason.clone(),
            details,
        });
    }

    for dup in &report.duplicates {
        let similarity = Confidence::new(dup.similarity);
        findings.push(Finding {
            kind: FindingKind::Duplicate,
            code: dup.code.code(),
            rule: dup.code,
            severity: Severity::from_confidence(similarity),
            confidence: similarity,
            evidence: Evidence::Advisory,
            file: dup.file_a.clone(),
            line: dup.lines_a.start,
            end_line: dup.lines_a.end,
            message: format!(
                "{} lines duplicated in {}:{} ({:.0}% similar)",
                dup.size,
                dup.file_b.display(),
                dup.lines_b,
                dup.similarity * 100.0
            ),
            details: vec![format!("other copy: {}:{}", dup.file_b.display(), dup.lines_b)],
        });
    }

    let verified: HashMap<&str, _> = report
        .verification
        .iter()
        .flat_map(|s| s.results.iter())
        .filter(|r| r.outcome != Outcome::Advisory)
        .map(|r| (r.package.as_str(), r))
        .collect();
    let manifest = report.manifest.clone().unwrap_or_default();

    if let Some(usage) = &report.dependency_usage {
        for pkg in usage.packages.iter().filter(|u| u.status == UsageStatus::CandidateUnused) {
            if verified
                .get(pkg.package.name.as_str())
                .is_some_and(|r| r.outcome != Outcome::Inconclusive)
            {
                continue;
            }
            findings.push(Finding {
                kind: FindingKind::UnusedDependency,
                code: FindingCode::CandidateUnusedPackage.code(),
                rule: FindingCode::CandidateUnusedPackage,
                severity: Severity::Info,
                confidence: pkg.confidence(),
                evidence: Evidence::Advisory,
                file: manifest.clone(),
                line: first_line(&pkg.package.lines),
                end_line: first_line(&pkg.package.lines),
                message: format!("'{}' is declared but never imported", pkg.package.raw_name),
                details: vec![format!("import names: {}", pkg.package.import_names.join(", "))],
            });
        }
    }

    if let Some(summary) = &report.verification {
        for result in summary.results.iter().filter(|r| r.outcome == Outcome::NotRequired) {
            let line = report
                .dependency_usage
                .as_ref()
                .and_then(|u| u.packages.iter().find(|p| p.package.name == result.package))
                .map(|p| first_line(&p.package.lines))
                .unwrap_or(1);
            findings.push(Finding {
                kind: FindingKind::UnusedDependency,
                code: FindingCode::VerifiedUnusedPackage.code(),
                rule: FindingCode::VerifiedUnusedPackage,
                severity: Severity::from_confidence(result.confidence),
                confidence: result.confidence,
                evidence: Evidence::Verified,
                file: manifest.clone(),
                line,
                end_line: line,
                message: format!("'{}' is not required: {}", result.package, result.reason),
                details: vec![format!(
                    "environment: {}, tests: {}, {:.1}s",
                    result.environment, result.test_type, result.duration_secs
                )],
            });
        }
    }

    findings.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.code.cmp(b.code))
    });
    findings
}

fn first_line(lines: &[usize]) -> usize {
    lines.first().map(|l| l + 1).unwrap_or(1)
}

/// Reporter for outputting analysis results
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    details: bool,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self {
            format,
            output_path,
            details: true,
        }
    }

    /// Terminal only: print confidence badges and adjustment details
    pub fn with_details(mut self, details: bool) -> Self {
        self.details = details;
        self
    }

    pub fn report(&self, report: &AnalysisReport) -> Result<()> {
        match &self.format {
            ReportFormat::Terminal => TerminalReporter::new()
                .with_confidence(self.details)
                .report(report),
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(report),
            ReportFormat::Sarif => SarifReporter::new(self.output_path.clone()).report(report),
        }
    }
}
