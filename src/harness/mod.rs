//! Mutation testing of declared dependencies.
//!
//! One package at a time: back up the manifest, comment out the package,
//! reinstall, run the tests, classify the result, restore. The manifest is
//! restored on every exit path, including errors, timeouts, interruption and
//! panics (through the [`MutationSession`] drop guard).

mod capabilities;
mod classify;
mod interrupt;
mod process;

pub use capabilities::{CommandEnvironment, Installer, TestRunner};
pub use classify::{classify, Classification, FailureSignature, SignatureScanner};
pub use interrupt::InterruptFlag;
pub use process::{run_command, CommandOutcome};

use crate::analysis::Confidence;
use crate::config::Config;
use crate::manifest::{DeclaredPackage, ManifestError, ManifestStore, MutationSession};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where installs and tests run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    /// Directly on the host interpreter
    #[default]
    Host,
    /// Inside the project's compose service
    Container,
    /// In an isolated uv-managed environment
    Sandbox,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Host => "host",
            Environment::Container => "container",
            Environment::Sandbox => "sandbox",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which part of the test suite to run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    Unit,
    Integration,
    #[default]
    All,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Unit => "unit",
            TestType::Integration => "integration",
            TestType::All => "all",
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    NotRequired,
    Required,
    Inconclusive,
    /// Dry run: located but not tested
    Advisory,
}

impl Outcome {
    /// Anything but a clean pass keeps the package
    pub fn is_required(&self) -> bool {
        !matches!(self, Outcome::NotRequired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NotRequired => "not-required",
            Outcome::Required => "required",
            Outcome::Inconclusive => "inconclusive",
            Outcome::Advisory => "advisory",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyTestResult {
    pub package: String,
    pub outcome: Outcome,
    pub is_required: bool,
    pub environment: Environment,
    pub test_type: TestType,
    pub exit_code: Option<i32>,
    pub failure_signature: Option<String>,
    pub duration_secs: f64,
    pub confidence: Confidence,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub required: usize,
    pub unused: usize,
    pub inconclusive: usize,
    pub environment: Environment,
    pub test_type: TestType,
    pub dry_run: bool,
    pub results: Vec<DependencyTestResult>,
}

impl TestSummary {
    fn new(
        results: Vec<DependencyTestResult>,
        environment: Environment,
        test_type: TestType,
        dry_run: bool,
    ) -> Self {
        let count = |o: Outcome| results.iter().filter(|r| r.outcome == o).count();
        Self {
            total: results.len(),
            required: count(Outcome::Required),
            unused: count(Outcome::NotRequired),
            inconclusive: count(Outcome::Inconclusive),
            environment,
            test_type,
            dry_run,
            results,
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),

    #[error("manifest restore failed; original content is kept at {backup}")]
    #[diagnostic(
        code(deadweight::harness::restore_failure),
        help("copy the backup over the manifest and reinstall before running anything else")
    )]
    RestoreFailure { backup: PathBuf },

    #[error("interrupted after {completed} package(s); the manifest was restored")]
    #[diagnostic(code(deadweight::harness::interrupted))]
    Interrupted { completed: usize },

    #[error("invalid failure signature pattern: {0}")]
    #[diagnostic(code(deadweight::harness::signature))]
    Signature(#[from] regex::Error),
}

/// Per-package progress through a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    BackedUp,
    Disabled,
    Reinstalled,
    Tested,
    Restored,
}

impl HarnessState {
    /// Forward steps, plus the rollback to `Restored` from anything after `BackedUp`
    pub fn can_transition_to(&self, next: HarnessState) -> bool {
        use HarnessState::*;
        matches!(
            (self, next),
            (Idle, BackedUp)
                | (BackedUp, Disabled)
                | (Disabled, Reinstalled)
                | (Reinstalled, Tested)
                | (BackedUp | Disabled | Reinstalled | Tested, Restored)
                | (Restored, Idle)
        )
    }
}

struct StateTracker<'p> {
    package: &'p str,
    state: HarnessState,
}

impl<'p> StateTracker<'p> {
    fn new(package: &'p str) -> Self {
        Self {
            package,
            state: HarnessState::Idle,
        }
    }

    fn advance(&mut self, next: HarnessState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.package, self.state, next);
        self.state = next;
    }
}

/// Disables declared packages one at a time and runs the test suite
pub struct MutationTestHarness<'a> {
    config: &'a Config,
    manifest_path: PathBuf,
    installer: &'a dyn Installer,
    runner: &'a dyn TestRunner,
    interrupt: InterruptFlag,
    environment: Environment,
    test_type: TestType,
    timeout: Duration,
    dry_run: bool,
}

impl<'a> MutationTestHarness<'a> {
    pub fn new(
        config: &'a Config,
        manifest_path: &Path,
        installer: &'a dyn Installer,
        runner: &'a dyn TestRunner,
    ) -> Self {
        Self {
            config,
            manifest_path: manifest_path.to_path_buf(),
            installer,
            runner,
            interrupt: InterruptFlag::new(),
            environment: config.verification.environment,
            test_type: config.verification.test_type,
            timeout: Duration::from_secs(config.verification.timeout_secs),
            dry_run: false,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_test_type(mut self, test_type: TestType) -> Self {
        self.test_type = test_type;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Verify each package in order. Stops on interruption or a failed restore.
    pub fn verify(&self, packages: &[DeclaredPackage]) -> Result<TestSummary, HarnessError> {
        if self.dry_run {
            let results = packages.iter().map(|p| self.advisory_result(p)).collect();
            return Ok(TestSummary::new(results, self.environment, self.test_type, true));
        }

        let mut store = ManifestStore::new(&self.manifest_path, &self.config.manifest);
        store.preflight()?;
        let scanner = SignatureScanner::new()?;

        let mut results = Vec::with_capacity(packages.len());
        for (idx, package) in packages.iter().enumerate() {
            if self.interrupt.is_set() {
                return Err(HarnessError::Interrupted { completed: idx });
            }
            info!("[{}/{}] Verifying '{}'", idx + 1, packages.len(), package.name);
            match self.test_package(&mut store, package, &scanner) {
                Ok(result) => {
                    info!(
                        "'{}': {} ({})",
                        result.package,
                        result.outcome.as_str(),
                        result.reason
                    );
                    results.push(result);
                }
                Err(HarnessError::Interrupted { .. }) => {
                    return Err(HarnessError::Interrupted { completed: idx });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(TestSummary::new(results, self.environment, self.test_type, false))
    }

    fn advisory_result(&self, package: &DeclaredPackage) -> DependencyTestResult {
        let lines: Vec<String> = package.lines.iter().map(|l| (l + 1).to_string()).collect();
        DependencyTestResult {
            package: package.name.clone(),
            outcome: Outcome::Advisory,
            is_required: true,
            environment: self.environment,
            test_type: self.test_type,
            exit_code: None,
            failure_signature: None,
            duration_secs: 0.0,
            confidence: Confidence::none(),
            reason: format!("dry run: would disable line {}", lines.join(", ")),
        }
    }

    fn test_package(
        &self,
        store: &mut ManifestStore,
        package: &DeclaredPackage,
        scanner: &SignatureScanner,
    ) -> Result<DependencyTestResult, HarnessError> {
        let mut tracker = StateTracker::new(&package.name);
        let start = Instant::now();

        let mut session = store.begin()?;
        tracker.advance(HarnessState::BackedUp);

        let mut uninstalled = false;
        let trial = self.run_trial(&mut session, package, scanner, &mut tracker, &mut uninstalled);

        match session.restore() {
            Ok(()) => tracker.advance(HarnessState::Restored),
            Err(ManifestError::RestoreFailed { backup }) => {
                return Err(HarnessError::RestoreFailure { backup });
            }
            Err(e) => return Err(e.into()),
        }
        drop(session);

        // An uninstalled package is always put back, interrupted or not
        let interrupted = matches!(trial, Err(HarnessError::Interrupted { .. }));
        if uninstalled || (self.config.verification.resync_after_restore && !interrupted) {
            self.resync();
        }
        tracker.advance(HarnessState::Idle);

        let (classification, exit_code, signature) = trial?;
        Ok(DependencyTestResult {
            package: package.name.clone(),
            outcome: classification.outcome,
            is_required: classification.outcome.is_required(),
            environment: self.environment,
            test_type: self.test_type,
            exit_code,
            failure_signature: signature,
            duration_secs: start.elapsed().as_secs_f64(),
            confidence: classification.confidence,
            reason: classification.reason,
        })
    }

    /// Steps between backup and restore. Never restores itself.
    fn run_trial(
        &self,
        session: &mut MutationSession<'_>,
        package: &DeclaredPackage,
        scanner: &SignatureScanner,
        tracker: &mut StateTracker<'_>,
        uninstalled: &mut bool,
    ) -> Result<(Classification, Option<i32>, Option<String>), HarnessError> {
        session.disable(package)?;
        tracker.advance(HarnessState::Disabled);

        if self.config.verification.uninstall_disabled {
            match self.installer.uninstall(&package.name, self.environment) {
                Ok(Some(outcome)) => {
                    *uninstalled = true;
                    if !outcome.success() {
                        debug!("Uninstall of '{}' exited with {:?}", package.name, outcome.exit_code);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    *uninstalled = true;
                    warn!("Uninstall of '{}' failed: {}", package.name, e);
                }
            }
        }
        self.check_interrupt()?;

        match self.installer.install(session.manifest_path(), self.environment) {
            Ok(outcome) if outcome.interrupted => {
                return Err(HarnessError::Interrupted { completed: 0 })
            }
            Ok(outcome) if !outcome.success() => {
                let detail = if outcome.timed_out {
                    "install timed out".to_string()
                } else {
                    format!("install exited with {:?}", outcome.exit_code)
                };
                return Ok((Classification::install_failed(&detail), outcome.exit_code, None));
            }
            Ok(_) => {}
            Err(e) => {
                return Ok((Classification::install_failed(&e.to_string()), None, None));
            }
        }
        tracker.advance(HarnessState::Reinstalled);
        self.check_interrupt()?;

        let selection = self.config.selection_for(self.test_type);
        let outcome = match self
            .runner
            .run_tests(&selection, self.environment, self.timeout, &self.interrupt)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok((Classification::install_failed(&e.to_string()), None, None));
            }
        };
        if outcome.interrupted {
            return Err(HarnessError::Interrupted { completed: 0 });
        }
        tracker.advance(HarnessState::Tested);

        let signature = scanner.scan(&outcome.combined_output(), package);
        let classification = classify(&outcome, package, signature.as_ref());
        Ok((classification, outcome.exit_code, signature.map(|s| s.line)))
    }

    fn check_interrupt(&self) -> Result<(), HarnessError> {
        if self.interrupt.is_set() {
            Err(HarnessError::Interrupted { completed: 0 })
        } else {
            Ok(())
        }
    }

    /// Reinstall from the restored manifest so the next package starts from a full environment
    fn resync(&self) {
        match self.installer.resync(&self.manifest_path, self.environment) {
            Ok(outcome) if outcome.success() => debug!("Environment re-synced"),
            Ok(outcome) => warn!("Re-sync after restore exited with {:?}", outcome.exit_code),
            Err(e) => warn!("Re-sync after restore failed: {}", e),
        }
    }
}
