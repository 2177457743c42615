use super::{Confidence, FindingCode};
use crate::manifest::{DeclaredPackage, Manifest};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Static verdict for one declared package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageStatus {
    /// At least one import name is imported somewhere
    Used,
    /// Never imported; a candidate for verification
    CandidateUnused,
    /// Tooling or dev-only; not expected to be imported
    Optional,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageUsage {
    pub package: DeclaredPackage,
    pub status: UsageStatus,
    /// Import names observed in the source tree
    pub matched_imports: Vec<String>,
}

impl PackageUsage {
    pub fn code(&self) -> Option<FindingCode> {
        (self.status == UsageStatus::CandidateUnused).then_some(FindingCode::CandidateUnusedPackage)
    }

    /// Static evidence only, so candidates are advisory
    pub fn confidence(&self) -> Confidence {
        Confidence::none()
    }
}

/// Per-package usage of a manifest
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyUsageReport {
    pub packages: Vec<PackageUsage>,
}

impl DependencyUsageReport {
    /// Packages never imported and not optional
    pub fn candidates(&self) -> Vec<&DeclaredPackage> {
        self.packages
            .iter()
            .filter(|u| u.status == UsageStatus::CandidateUnused)
            .map(|u| &u.package)
            .collect()
    }

    pub fn count(&self, status: UsageStatus) -> usize {
        self.packages.iter().filter(|u| u.status == status).count()
    }
}

/// Cross-references declared packages with top-level imports
#[derive(Debug, Default)]
pub struct DependencyUsageMatcher;

impl DependencyUsageMatcher {
    pub fn new() -> Self {
        Self
    }

    /// `imports` holds top-level module names of non-relative imports.
    /// Names compare case-insensitively (`PyQt5` is declared and imported as such).
    pub fn match_usage(&self, manifest: &Manifest, imports: &BTreeSet<String>) -> DependencyUsageReport {
        let by_lowercase: HashMap<String, &String> = imports
            .iter()
            .map(|import| (import.to_lowercase(), import))
            .collect();

        let packages: Vec<PackageUsage> = manifest
            .packages
            .iter()
            .map(|package| {
                let matched_imports: Vec<String> = package
                    .import_names
                    .iter()
                    .filter_map(|name| by_lowercase.get(&name.to_lowercase()))
                    .map(|import| (*import).clone())
                    .collect();

                let status = if !matched_imports.is_empty() {
                    UsageStatus::Used
                } else if package.optional {
                    UsageStatus::Optional
                } else {
                    UsageStatus::CandidateUnused
                };
                debug!("{}: {:?} via {:?}", package.name, status, matched_imports);

                PackageUsage {
                    package: package.clone(),
                    status,
                    matched_imports,
                }
            })
            .collect();

        let report = DependencyUsageReport { packages };
        info!(
            "{} declared packages, {} candidate-unused",
            report.packages.len(),
            report.count(UsageStatus::CandidateUnused)
        );
        report
    }
}
