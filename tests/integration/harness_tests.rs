//! Mutation test harness integration tests
//!
//! The installer and test runner are replaced with in-process fakes that read
//! the manifest to decide what the "test suite" would do.

use deadweight::config::{Config, ManifestConfig};
use deadweight::harness::{
    CommandOutcome, Environment, HarnessError, Installer, InterruptFlag, MutationTestHarness,
    Outcome, TestRunner,
};
use deadweight::manifest::{DeclaredPackage, Manifest, ManifestStore};
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MANIFEST: &str = "# app deps\nalpha==1.0\nbeta==2.0\n";
const DISABLE_MARKER: &str = "# DISABLED FOR TESTING: ";

fn ok(code: i32, output: &str) -> CommandOutcome {
    CommandOutcome {
        exit_code: Some(code),
        stdout: output.to_string(),
        ..CommandOutcome::default()
    }
}

/// Installer that records calls and can be told to fail
#[derive(Default)]
struct FakeInstaller {
    installs: Cell<usize>,
    uninstalls: RefCell<Vec<String>>,
    fail_install: bool,
}

impl Installer for FakeInstaller {
    fn install(&self, _manifest: &Path, _env: Environment) -> std::io::Result<CommandOutcome> {
        self.installs.set(self.installs.get() + 1);
        if self.fail_install {
            Ok(ok(1, "ERROR: Could not find a version that satisfies the requirement"))
        } else {
            Ok(ok(0, ""))
        }
    }

    fn uninstall(&self, package: &str, _env: Environment) -> std::io::Result<Option<CommandOutcome>> {
        self.uninstalls.borrow_mut().push(package.to_string());
        Ok(Some(ok(0, "")))
    }
}

enum Behavior {
    /// Fail with a missing-module error for every disabled package in this list
    ImportsFrom(Vec<&'static str>),
    TimeOut,
    NoTests,
    Panic,
    Interrupt(InterruptFlag),
    /// Replace the manifest with a directory so nothing can be written back
    BlockManifest,
}

/// Test runner that inspects the manifest on disk
struct FakeRunner {
    manifest: PathBuf,
    behavior: Behavior,
    runs: Cell<usize>,
    seen_manifests: RefCell<Vec<String>>,
}

impl FakeRunner {
    fn new(manifest: &Path, behavior: Behavior) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            behavior,
            runs: Cell::new(0),
            seen_manifests: RefCell::new(Vec::new()),
        }
    }
}

impl TestRunner for FakeRunner {
    fn run_tests(
        &self,
        _selection: &[String],
        _env: Environment,
        _timeout: Duration,
        _interrupt: &InterruptFlag,
    ) -> std::io::Result<CommandOutcome> {
        self.runs.set(self.runs.get() + 1);
        let contents = std::fs::read_to_string(&self.manifest)?;
        self.seen_manifests.borrow_mut().push(contents.clone());

        match &self.behavior {
            Behavior::ImportsFrom(imported) => {
                for name in imported {
                    let disabled = format!("{}{}==", DISABLE_MARKER, name);
                    if contents.contains(&disabled) {
                        return Ok(ok(
                            1,
                            &format!(
                                "E   ModuleNotFoundError: No module named '{}'\n1 error in 0.12s",
                                name
                            ),
                        ));
                    }
                }
                Ok(ok(0, "3 passed in 0.05s"))
            }
            Behavior::TimeOut => Ok(CommandOutcome {
                exit_code: None,
                timed_out: true,
                ..CommandOutcome::default()
            }),
            Behavior::NoTests => Ok(ok(5, "no tests ran in 0.01s")),
            Behavior::Panic => panic!("runner exploded"),
            Behavior::Interrupt(flag) => {
                flag.set();
                Ok(CommandOutcome {
                    exit_code: None,
                    interrupted: true,
                    ..CommandOutcome::default()
                })
            }
            Behavior::BlockManifest => {
                std::fs::remove_file(&self.manifest)?;
                std::fs::create_dir(&self.manifest)?;
                Ok(ok(0, "3 passed in 0.05s"))
            }
        }
    }
}

fn project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let manifest = dir.path().join("requirements.txt");
    std::fs::write(&manifest, MANIFEST).expect("Failed to write manifest");
    (dir, manifest)
}

fn packages(manifest: &Path, names: &[&str]) -> Vec<DeclaredPackage> {
    let parsed = Manifest::load(manifest, &ManifestConfig::default()).expect("manifest parses");
    names
        .iter()
        .map(|n| parsed.get(n).cloned().expect("package declared"))
        .collect()
}

fn assert_pristine(manifest: &Path) {
    assert_eq!(std::fs::read_to_string(manifest).unwrap(), MANIFEST);
    let store = ManifestStore::new(manifest, &ManifestConfig::default());
    assert!(store.stale_backups().unwrap().is_empty(), "backup left behind");
}

#[test]
fn test_alpha_beta_scenario() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec!["alpha"]));

    let summary = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["alpha", "beta"]))
        .unwrap();

    assert_eq!(summary.total, 2);
    let alpha = &summary.results[0];
    assert_eq!(alpha.package, "alpha");
    assert_eq!(alpha.outcome, Outcome::Required);
    assert!(alpha.is_required);
    assert!(alpha.confidence.value() >= 0.85);
    assert!(alpha
        .failure_signature
        .as_deref()
        .unwrap()
        .contains("No module named 'alpha'"));

    let beta = &summary.results[1];
    assert_eq!(beta.outcome, Outcome::NotRequired);
    assert!(!beta.is_required);
    assert!(beta.confidence.value() >= 0.9);
    assert_eq!(summary.unused, 1);
    assert_eq!(summary.required, 1);

    assert_pristine(&manifest);
}

#[test]
fn test_only_one_line_disabled_at_a_time() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec![]));

    MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["alpha", "beta"]))
        .unwrap();

    let seen = runner.seen_manifests.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], "# app deps\n# DISABLED FOR TESTING: alpha==1.0\nbeta==2.0\n");
    assert_eq!(seen[1], "# app deps\nalpha==1.0\n# DISABLED FOR TESTING: beta==2.0\n");
}

#[test]
fn test_uninstall_and_resync() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec![]));

    MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap();

    assert_eq!(*installer.uninstalls.borrow(), vec!["beta".to_string()]);
    // One install with the package disabled, one re-sync after restore
    assert_eq!(installer.installs.get(), 2);
}

#[test]
fn test_timeout_is_inconclusive_and_restored() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::TimeOut);

    let summary = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap();

    let result = &summary.results[0];
    assert_eq!(result.outcome, Outcome::Inconclusive);
    assert!(result.is_required);
    assert_eq!(result.confidence.value(), 0.0);
    assert_eq!(result.reason, "timed out");
    assert_pristine(&manifest);
}

#[test]
fn test_install_failure_is_environment_error() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller {
        fail_install: true,
        ..FakeInstaller::default()
    };
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec![]));

    let summary = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap();

    let result = &summary.results[0];
    assert_eq!(result.outcome, Outcome::Inconclusive);
    assert!(result.reason.starts_with("environment error"));
    assert_eq!(runner.runs.get(), 0, "tests must not run after a failed install");
    assert_pristine(&manifest);
}

#[test]
fn test_no_tests_collected_is_inconclusive() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::NoTests);

    let summary = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap();

    assert_eq!(summary.results[0].outcome, Outcome::Inconclusive);
    assert_eq!(summary.inconclusive, 1);
    assert_pristine(&manifest);
}

#[test]
fn test_panic_still_restores_manifest() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::Panic);
    let targets = packages(&manifest, &["beta"]);

    let result = catch_unwind(AssertUnwindSafe(|| {
        MutationTestHarness::new(&config, &manifest, &installer, &runner).verify(&targets)
    }));

    assert!(result.is_err());
    assert_pristine(&manifest);
}

#[test]
fn test_interrupt_restores_and_stops() {
    let (_dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let flag = InterruptFlag::new();
    let runner = FakeRunner::new(&manifest, Behavior::Interrupt(flag.clone()));

    let err = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .with_interrupt(flag)
        .verify(&packages(&manifest, &["alpha", "beta"]))
        .unwrap_err();

    assert!(matches!(err, HarnessError::Interrupted { completed: 0 }));
    assert_eq!(runner.runs.get(), 1, "no package after the interrupt");
    // The uninstalled package is reinstalled from the restored manifest
    assert_eq!(*installer.uninstalls.borrow(), vec!["alpha".to_string()]);
    assert_eq!(installer.installs.get(), 2);
    assert_pristine(&manifest);
}

#[test]
fn test_interrupt_without_uninstall_skips_resync() {
    let (_dir, manifest) = project();
    let mut config = Config::default();
    config.verification.uninstall_disabled = false;
    let installer = FakeInstaller::default();
    let flag = InterruptFlag::new();
    let runner = FakeRunner::new(&manifest, Behavior::Interrupt(flag.clone()));

    let err = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .with_interrupt(flag)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap_err();

    assert!(matches!(err, HarnessError::Interrupted { .. }));
    assert!(installer.uninstalls.borrow().is_empty());
    assert_eq!(installer.installs.get(), 1);
    assert_pristine(&manifest);
}

#[test]
fn test_restore_failure_halts_and_keeps_backup() {
    let (dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::BlockManifest);
    let targets = packages(&manifest, &["alpha", "beta"]);

    let err = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&targets)
        .unwrap_err();

    let backup = match &err {
        HarnessError::RestoreFailure { backup } => backup.clone(),
        other => panic!("expected a restore failure, got {:?}", other),
    };
    assert!(err.to_string().contains(&backup.display().to_string()));
    assert_eq!(backup.parent(), Some(dir.path()));
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), MANIFEST);
    assert_eq!(runner.runs.get(), 1, "no package after a failed restore");
    assert_eq!(installer.installs.get(), 1, "no re-sync after a failed restore");
}

#[test]
fn test_dry_run_touches_nothing() {
    let (dir, manifest) = project();
    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec![]));

    let summary = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .with_dry_run(true)
        .verify(&packages(&manifest, &["alpha", "beta"]))
        .unwrap();

    assert!(summary.dry_run);
    for result in &summary.results {
        assert_eq!(result.outcome, Outcome::Advisory);
        assert!(result.is_required);
        assert_eq!(result.confidence.value(), 0.0);
    }
    assert!(summary.results[1].reason.contains("line 3"));
    assert_eq!(installer.installs.get(), 0);
    assert_eq!(runner.runs.get(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert_pristine(&manifest);
}

#[test]
fn test_stale_backup_blocks_run() {
    let (dir, manifest) = project();
    let stale = dir
        .path()
        .join("requirements.txt.deadweight-backup-20240101T000000.000000Z");
    std::fs::write(&stale, MANIFEST).unwrap();

    let config = Config::default();
    let installer = FakeInstaller::default();
    let runner = FakeRunner::new(&manifest, Behavior::ImportsFrom(vec![]));

    let err = MutationTestHarness::new(&config, &manifest, &installer, &runner)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap_err();

    assert!(matches!(err, HarnessError::Manifest(_)));
    assert_eq!(installer.installs.get(), 0);
    assert!(stale.exists(), "the stale backup belongs to the user");
    assert_eq!(std::fs::read_to_string(&manifest).unwrap(), MANIFEST);
}

#[cfg(unix)]
#[test]
fn test_command_environment_runs_templates() {
    use deadweight::config::EnvironmentCommands;
    use deadweight::harness::CommandEnvironment;

    let (dir, manifest) = project();
    let mut config = Config::default();
    config.verification.environments.insert(
        Environment::Host,
        EnvironmentCommands {
            install: vec!["sh".into(), "-c".into(), "test -f {manifest}".into()],
            uninstall: vec![],
            test: vec![
                "sh".into(),
                "-c".into(),
                "grep -q '^# DISABLED FOR TESTING: beta' requirements.txt".into(),
            ],
        },
    );
    let env = CommandEnvironment::new(dir.path(), &config);

    let summary = MutationTestHarness::new(&config, &manifest, &env, &env)
        .verify(&packages(&manifest, &["beta"]))
        .unwrap();

    assert_eq!(summary.results[0].outcome, Outcome::NotRequired);
    assert_pristine(&manifest);
}
