//! End-to-end orchestration over a scratch copy of the sample project

use deadweight::analysis::UsageStatus;
use deadweight::config::Config;
use deadweight::harness::{CommandOutcome, Environment, Installer, InterruptFlag, Outcome, TestRunner};
use deadweight::manifest::DeclaredPackage;
use deadweight::orchestrator::{AnalysisKind, AnalysisOrchestrator};
use deadweight::report::{collect_findings, Evidence, FindingKind};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Scratch copy so verification never touches the checked-in fixture
fn scratch_project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = dir.path().join("project");
    copy_dir(
        &PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/python/sample_project"),
        &root,
    );
    (dir, root)
}

fn outcome(code: i32, stdout: &str) -> CommandOutcome {
    CommandOutcome {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        ..CommandOutcome::default()
    }
}

struct PassingInstaller;

impl Installer for PassingInstaller {
    fn install(&self, _manifest: &Path, _env: Environment) -> std::io::Result<CommandOutcome> {
        Ok(outcome(0, ""))
    }

    fn uninstall(&self, _package: &str, _env: Environment) -> std::io::Result<Option<CommandOutcome>> {
        Ok(None)
    }
}

/// Fails with a missing-module error whenever `alpha` is disabled
struct AlphaRunner {
    manifest: PathBuf,
    runs: Cell<usize>,
}

impl TestRunner for AlphaRunner {
    fn run_tests(
        &self,
        _selection: &[String],
        _env: Environment,
        _timeout: Duration,
        _interrupt: &InterruptFlag,
    ) -> std::io::Result<CommandOutcome> {
        self.runs.set(self.runs.get() + 1);
        let contents = std::fs::read_to_string(&self.manifest)?;
        if contents.contains("# DISABLED FOR TESTING: alpha") {
            Ok(outcome(1, "E   ModuleNotFoundError: No module named 'alpha'"))
        } else {
            Ok(outcome(0, "1 passed in 0.02s"))
        }
    }
}

#[test]
fn test_static_analyses_on_sample_project() {
    let (_dir, root) = scratch_project();
    let config = Config::default();

    let report = AnalysisOrchestrator::new(&config, &root).run().unwrap();

    assert!(report.ran(AnalysisKind::DeadCode));
    assert!(report.ran(AnalysisKind::DependencyUsage));
    assert!(!report.ran(AnalysisKind::DependencyVerification));
    assert!(report.verification.is_none());
    assert_eq!(report.stats.files_indexed, 5);
    assert_eq!(report.stats.files_skipped, 0);
    assert!(report.stats.symbols > 0);

    assert!(report.dead_code.iter().any(|f| f.symbol.name == "orphan_helper"));
    let usage = report.dependency_usage.as_ref().unwrap();
    assert_eq!(usage.count(UsageStatus::CandidateUnused), 1);
    assert!(report.manifest.as_ref().unwrap().ends_with("requirements.txt"));
}

#[test]
fn test_verification_confirms_unused_package() {
    let (_dir, root) = scratch_project();
    let manifest = root.join("requirements.txt");
    let original = std::fs::read_to_string(&manifest).unwrap();
    let config = Config::default();
    let installer = PassingInstaller;
    let runner = AlphaRunner {
        manifest: manifest.clone(),
        runs: Cell::new(0),
    };

    let report = AnalysisOrchestrator::new(&config, &root)
        .with_analyses([AnalysisKind::DependencyVerification])
        .with_capabilities(&installer, &runner)
        .run()
        .unwrap();

    // Usage matching ran implicitly and picked the only candidate
    assert!(report.ran(AnalysisKind::DependencyUsage));
    assert!(report.warnings.is_empty());
    let summary = report.verification.as_ref().unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.unused, 1);
    assert_eq!(summary.results[0].package, "beta");
    assert_eq!(summary.results[0].outcome, Outcome::NotRequired);
    assert_eq!(runner.runs.get(), 1);
    assert_eq!(std::fs::read_to_string(&manifest).unwrap(), original);

    let findings = collect_findings(&report);
    let dependency: Vec<_> = findings
        .iter()
        .filter(|f| f.kind == FindingKind::UnusedDependency)
        .collect();
    assert_eq!(dependency.len(), 1);
    assert_eq!(dependency[0].code, "DW021");
    assert_eq!(dependency[0].evidence, Evidence::Verified);
    assert_eq!(dependency[0].line, 3);
}

#[test]
fn test_allow_list_without_usage_is_blind() {
    let (_dir, root) = scratch_project();
    let manifest = root.join("requirements.txt");
    let config = Config::default();
    let installer = PassingInstaller;
    let runner = AlphaRunner {
        manifest,
        runs: Cell::new(0),
    };

    let report = AnalysisOrchestrator::new(&config, &root)
        .with_analyses([AnalysisKind::DependencyVerification])
        .with_packages(vec!["alpha".to_string()])
        .with_capabilities(&installer, &runner)
        .run()
        .unwrap();

    assert!(report.dependency_usage.is_none());
    assert!(report.warnings.iter().any(|w| w.contains("tested blind")));
    let summary = report.verification.as_ref().unwrap();
    assert_eq!(summary.required, 1);
    assert!(summary.results[0].failure_signature.is_some());

    // A required package produces no finding
    assert!(collect_findings(&report).is_empty());
}

#[test]
fn test_unknown_allow_list_package_fails() {
    let (_dir, root) = scratch_project();
    let config = Config::default();
    let installer = PassingInstaller;
    let runner = AlphaRunner {
        manifest: root.join("requirements.txt"),
        runs: Cell::new(0),
    };

    let result = AnalysisOrchestrator::new(&config, &root)
        .with_analyses([AnalysisKind::DependencyVerification])
        .with_packages(vec!["gamma".to_string()])
        .with_capabilities(&installer, &runner)
        .run();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("gamma"));
    assert_eq!(runner.runs.get(), 0);
}

#[test]
fn test_dry_run_leaves_candidates_advisory() {
    let (_dir, root) = scratch_project();
    let manifest = root.join("requirements.txt");
    let original = std::fs::read_to_string(&manifest).unwrap();
    let config = Config::default();
    let installer = PassingInstaller;
    let runner = AlphaRunner {
        manifest: manifest.clone(),
        runs: Cell::new(0),
    };
    let never = |_: &[DeclaredPackage]| -> bool { panic!("dry run must not prompt") };

    let report = AnalysisOrchestrator::new(&config, &root)
        .with_analyses(AnalysisKind::ALL)
        .with_dry_run(true)
        .with_capabilities(&installer, &runner)
        .with_confirm(&never)
        .run()
        .unwrap();

    let summary = report.verification.as_ref().unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.results[0].outcome, Outcome::Advisory);
    assert_eq!(runner.runs.get(), 0);
    assert_eq!(std::fs::read_to_string(&manifest).unwrap(), original);

    let findings = collect_findings(&report);
    assert!(findings.iter().all(|f| f.evidence == Evidence::Advisory));
    assert!(findings.iter().any(|f| f.code == "DW020"));
}

#[test]
fn test_declined_confirmation_skips_verification() {
    let (_dir, root) = scratch_project();
    let config = Config::default();
    let installer = PassingInstaller;
    let runner = AlphaRunner {
        manifest: root.join("requirements.txt"),
        runs: Cell::new(0),
    };
    let decline = |packages: &[DeclaredPackage]| -> bool {
        assert_eq!(packages.len(), 1);
        false
    };

    let report = AnalysisOrchestrator::new(&config, &root)
        .with_analyses([AnalysisKind::DependencyVerification])
        .with_capabilities(&installer, &runner)
        .with_confirm(&decline)
        .run()
        .unwrap();

    assert!(report.verification.is_none());
    assert!(report.warnings.iter().any(|w| w.contains("cancelled")));
    assert_eq!(runner.runs.get(), 0);
}

#[test]
fn test_missing_manifest_is_a_warning_for_static_runs() {
    let (_dir, root) = scratch_project();
    std::fs::remove_file(root.join("requirements.txt")).unwrap();
    let config = Config::default();

    let report = AnalysisOrchestrator::new(&config, &root).run().unwrap();
    assert!(report.dependency_usage.is_none());
    assert!(report.warnings.iter().any(|w| w.contains("dependency usage skipped")));
    assert!(!report.dead_code.is_empty());

    let verifying = AnalysisOrchestrator::new(&config, &root)
        .with_analyses([AnalysisKind::DependencyVerification])
        .run();
    assert!(verifying.is_err());
}

#[test]
fn test_findings_are_sorted() {
    let (_dir, root) = scratch_project();
    let config = Config::default();
    let report = AnalysisOrchestrator::new(&config, &root)
        .with_parallel(true)
        .run()
        .unwrap();

    let findings = collect_findings(&report);
    assert!(!findings.is_empty());
    for pair in findings.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!((a.kind, &a.file, a.line) <= (b.kind, &b.file, b.line));
    }
}
