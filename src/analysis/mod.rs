mod dead_symbols;
mod dependency_usage;
mod duplicates;
mod entry_points;

pub use dead_symbols::{ConfidenceAdjustment, DeadCodeFinding, DeadSymbolDetector};
pub use dependency_usage::{DependencyUsageMatcher, DependencyUsageReport, PackageUsage, UsageStatus};
pub use duplicates::{DuplicateBlockDetector, DuplicateBlockFinding, LineRange};
pub use entry_points::{EntryPointDetector, EntryPointKind};

use serde::{Deserialize, Serialize};

/// Confidence score in (0, 1]. Dry-run verification results are the one
/// place an exact 0 is produced, see [`Confidence::none`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const FLOOR: f64 = 0.05;

    /// Clamp a raw score into `[FLOOR, 1.0]`
    pub fn new(score: f64) -> Self {
        if score.is_nan() {
            return Confidence(Self::FLOOR);
        }
        Confidence(score.clamp(Self::FLOOR, 1.0))
    }

    /// No evidence at all (inconclusive or advisory results)
    pub fn none() -> Self {
        Confidence(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Severity levels for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
        }
    }

    /// `warning` at 0.7 and above, `info` below
    pub fn from_confidence(confidence: Confidence) -> Self {
        if confidence.value() >= 0.7 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable rule identifiers used by every reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingCode {
    UnusedFunction,
    UnusedClass,
    UnusedMethod,
    DuplicateBlock,
    CandidateUnusedPackage,
    VerifiedUnusedPackage,
}

impl FindingCode {
    pub const ALL: [FindingCode; 6] = [
        FindingCode::UnusedFunction,
        FindingCode::UnusedClass,
        FindingCode::UnusedMethod,
        FindingCode::DuplicateBlock,
        FindingCode::CandidateUnusedPackage,
        FindingCode::VerifiedUnusedPackage,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FindingCode::UnusedFunction => "DW001",
            FindingCode::UnusedClass => "DW002",
            FindingCode::UnusedMethod => "DW003",
            FindingCode::DuplicateBlock => "DW010",
            FindingCode::CandidateUnusedPackage => "DW020",
            FindingCode::VerifiedUnusedPackage => "DW021",
        }
    }

    pub fn rule_name(&self) -> &'static str {
        match self {
            FindingCode::UnusedFunction => "unused-function",
            FindingCode::UnusedClass => "unused-class",
            FindingCode::UnusedMethod => "unused-method",
            FindingCode::DuplicateBlock => "duplicate-block",
            FindingCode::CandidateUnusedPackage => "candidate-unused-package",
            FindingCode::VerifiedUnusedPackage => "verified-unused-package",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FindingCode::UnusedFunction => "Function is never called or referenced",
            FindingCode::UnusedClass => "Class is never constructed or referenced",
            FindingCode::UnusedMethod => "Method is never called or referenced",
            FindingCode::DuplicateBlock => "Code block is duplicated in another file",
            FindingCode::CandidateUnusedPackage => "Declared package is never imported",
            FindingCode::VerifiedUnusedPackage => "Test suite passes without the declared package",
        }
    }
}

impl std::fmt::Display for FindingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
