//! deadweight - source health checks for Python projects
//!
//! Finds symbols nothing calls, near-duplicate code blocks and declared
//! dependencies nothing imports, then verifies the dependency findings by
//! disabling each package in the manifest and re-running the test suite.
//!
//! # Architecture
//!
//! The analysis pipeline consists of:
//! 1. **File Discovery** - Find all .py and .pyi files
//! 2. **Parsing** - Parse source files using tree-sitter
//! 3. **Indexing** - Build the symbol table and reference graph
//! 4. **Detection** - Dead symbols, duplicate blocks, unused packages
//! 5. **Verification** - Mutate the manifest one package at a time and run the tests
//! 6. **Reporting** - Output results in various formats

pub mod analysis;
pub mod config;
pub mod discovery;
pub mod harness;
pub mod index;
pub mod manifest;
pub mod orchestrator;
pub mod parser;
pub mod report;

pub use analysis::{
    Confidence, DeadCodeFinding, DeadSymbolDetector, DependencyUsageMatcher,
    DuplicateBlockDetector, DuplicateBlockFinding, FindingCode, Severity,
};
pub use config::Config;
pub use discovery::FileFinder;
pub use harness::{
    DependencyTestResult, Environment, HarnessError, InterruptFlag, MutationTestHarness, Outcome,
    TestSummary, TestType,
};
pub use index::{CallSite, DeclaredSymbol, ParallelIndexBuilder, SymbolIndex};
pub use manifest::{DeclaredPackage, Manifest, ManifestError, ManifestStore};
pub use orchestrator::{AnalysisKind, AnalysisOrchestrator, AnalysisReport};
pub use report::{ReportFormat, Reporter};
