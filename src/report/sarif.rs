use super::{collect_findings, Evidence};
use crate::analysis::{FindingCode, Severity};
use crate::orchestrator::AnalysisReport;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// SARIF reporter for CI/CD integration (GitHub, Azure DevOps, etc.)
pub struct SarifReporter {
    output_path: Option<PathBuf>,
}

impl SarifReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, report: &AnalysisReport) -> Result<()> {
        let sarif = SarifReport::from_report(report);
        let json = serde_json::to_string_pretty(&sarif).into_diagnostic()?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("SARIF report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }
}

/// SARIF 2.1.0 format
#[derive(Serialize)]
struct SarifReport {
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
struct SarifDriver {
    name: &'static str,
    version: &'static str,
    #[serde(rename = "informationUri")]
    information_uri: &'static str,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
struct SarifRule {
    id: &'static str,
    name: &'static str,
    #[serde(rename = "shortDescription")]
    short_description: SarifMessage,
    #[serde(rename = "defaultConfiguration")]
    default_configuration: SarifConfiguration,
}

#[derive(Serialize)]
struct SarifConfiguration {
    level: &'static str,
}

#[derive(Serialize)]
struct SarifResult {
    #[serde(rename = "ruleId")]
    rule_id: &'static str,
    #[serde(rename = "ruleIndex")]
    rule_index: usize,
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
    properties: SarifProperties,
}

#[derive(Serialize)]
struct SarifProperties {
    confidence: f64,
    evidence: Evidence,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifactLocation,
    region: SarifRegion,
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Serialize)]
struct SarifRegion {
    #[serde(rename = "startLine")]
    start_line: usize,
    #[serde(rename = "endLine")]
    end_line: usize,
}

fn level(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

fn default_level(code: FindingCode) -> &'static str {
    match code {
        FindingCode::CandidateUnusedPackage => "note",
        _ => "warning",
    }
}

/// Project-relative URI when the file is under the root
fn artifact_uri(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

impl SarifReport {
    fn from_report(report: &AnalysisReport) -> Self {
        let rules = FindingCode::ALL
            .iter()
            .map(|code| SarifRule {
                id: code.code(),
                name: code.rule_name(),
                short_description: SarifMessage {
                    text: code.description().to_string(),
                },
                default_configuration: SarifConfiguration {
                    level: default_level(*code),
                },
            })
            .collect();

        let results = collect_findings(report)
            .into_iter()
            .map(|finding| SarifResult {
                rule_id: finding.code,
                rule_index: FindingCode::ALL
                    .iter()
                    .position(|code| *code == finding.rule)
                    .unwrap_or_default(),
                level: level(finding.severity),
                message: SarifMessage {
                    text: finding.message,
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifactLocation {
                            uri: artifact_uri(&report.root, &finding.file),
                        },
                        region: SarifRegion {
                            start_line: finding.line.max(1),
                            end_line: finding.end_line.max(finding.line).max(1),
                        },
                    },
                }],
                properties: SarifProperties {
                    confidence: finding.confidence.value(),
                    evidence: finding.evidence,
                },
            })
            .collect();

        SarifReport {
            schema: "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
            version: "2.1.0",
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: "deadweight",
                        version: env!("CARGO_PKG_VERSION"),
                        information_uri: "https://github.com/user/deadweight",
                        rules,
                    },
                },
                results,
            }],
        }
    }
}
