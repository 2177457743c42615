use super::{collect_findings, Evidence, Finding, FindingKind};
use crate::analysis::{Confidence, Severity};
use crate::harness::{Outcome, TestSummary};
use crate::orchestrator::AnalysisReport;
use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Terminal reporter with colored output
pub struct TerminalReporter {
    /// Show confidence badges and adjustment details
    show_confidence: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            show_confidence: true,
        }
    }

    pub fn with_confidence(mut self, show: bool) -> Self {
        self.show_confidence = show;
        self
    }

    pub fn report(&self, report: &AnalysisReport) -> Result<()> {
        let findings = collect_findings(report);

        if findings.is_empty() {
            println!("{}", "No issues found!".green().bold());
        } else {
            println!();
            println!(
                "{}",
                format!("Found {} issues:", findings.len()).yellow().bold()
            );
            println!();

            // Group by file, keeping kind order inside each file
            let mut by_file: BTreeMap<&PathBuf, Vec<&Finding>> = BTreeMap::new();
            for finding in &findings {
                by_file.entry(&finding.file).or_default().push(finding);
            }
            for (file, items) in by_file {
                println!("{}", display_path(&report.root, file).cyan().bold());
                for item in items {
                    self.print_item(item);
                }
                println!();
            }
        }

        if let Some(summary) = &report.verification {
            self.print_verification(summary);
        }

        if !report.warnings.is_empty() {
            println!("{}", "Warnings:".yellow());
            for warning in &report.warnings {
                println!("  {} {}", "!".yellow(), warning);
            }
            println!();
        }

        self.print_summary(report, &findings);
        Ok(())
    }

    fn confidence_indicator(&self, confidence: Confidence) -> colored::ColoredString {
        match confidence.value() {
            c if c >= 0.9 => "●".green().bold(),
            c if c >= 0.7 => "◉".bright_green(),
            c if c >= 0.4 => "○".yellow(),
            _ => "◌".red(),
        }
    }

    fn print_item(&self, item: &Finding) {
        let severity_str = match item.severity {
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".blue().bold(),
        };

        let confidence_badge = if self.show_confidence {
            format!("{} ", self.confidence_indicator(item.confidence))
        } else {
            String::new()
        };

        let evidence_badge = match item.evidence {
            Evidence::Verified => " [VERIFIED]".green().bold().to_string(),
            Evidence::Advisory => String::new(),
        };

        println!(
            "  {}{} {} [{}] {}{}",
            confidence_badge,
            item.line.to_string().dimmed(),
            severity_str,
            item.code.dimmed(),
            item.message,
            evidence_badge
        );

        if self.show_confidence {
            println!(
                "    {} confidence {}",
                "→".dimmed(),
                item.confidence.to_string().white()
            );
            for detail in &item.details {
                println!("    {} {}", "·".dimmed(), detail.dimmed());
            }
        }
    }

    fn print_verification(&self, summary: &TestSummary) {
        let title = if summary.dry_run {
            "Dependency verification (dry run):"
        } else {
            "Dependency verification:"
        };
        println!(
            "{} {}",
            title.bold(),
            format!("{} / {}", summary.environment, summary.test_type).dimmed()
        );

        for result in &summary.results {
            let outcome = match result.outcome {
                Outcome::NotRequired => "not required".green().bold(),
                Outcome::Required => "required".red(),
                Outcome::Inconclusive => "inconclusive".yellow(),
                Outcome::Advisory => "advisory".blue(),
            };
            println!(
                "  {:<24} {:<14} {} {}",
                result.package,
                outcome,
                result.confidence.to_string().dimmed(),
                result.reason.dimmed()
            );
        }
        println!();
    }

    fn print_summary(&self, report: &AnalysisReport, findings: &[Finding]) {
        let count = |kind: FindingKind| findings.iter().filter(|f| f.kind == kind).count();

        println!("{}", "─".repeat(60).dimmed());

        let mut parts = Vec::new();
        let dead = count(FindingKind::DeadCode);
        if dead > 0 {
            parts.push(format!("{} dead symbols", dead).yellow().to_string());
        }
        let duplicates = count(FindingKind::Duplicate);
        if duplicates > 0 {
            parts.push(format!("{} duplicate blocks", duplicates).yellow().to_string());
        }
        let packages = count(FindingKind::UnusedDependency);
        if packages > 0 {
            parts.push(format!("{} unused packages", packages).blue().to_string());
        }
        if parts.is_empty() {
            parts.push("clean".green().to_string());
        }
        println!("Summary: {}", parts.join(", "));

        let stats = &report.stats;
        if stats.files_indexed > 0 || stats.files_skipped > 0 {
            println!(
                "{}",
                format!(
                    "{} files indexed, {} skipped, {} symbols, {} call-sites",
                    stats.files_indexed, stats.files_skipped, stats.symbols, stats.call_sites
                )
                .dimmed()
            );
        }
        println!();

        let low = findings
            .iter()
            .filter(|f| f.kind == FindingKind::DeadCode && f.confidence.value() < 0.4)
            .count();
        if low > 0 {
            println!(
                "{}",
                "⚠ Low confidence items may be false positives (getattr, string dispatch)".yellow()
            );
        }
        if count(FindingKind::UnusedDependency) > 0 && report.verification.is_none() {
            println!(
                "{}",
                "Tip: Run with --analysis dependency-verification to confirm unused packages"
                    .dimmed()
            );
        }
        if dead > 0 {
            println!(
                "{}",
                "Tip: Use --min-confidence 0.7 to filter low confidence results".dimmed()
            );
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn display_path(root: &Path, file: &Path) -> String {
    file.strip_prefix(root).unwrap_or(file).display().to_string()
}
