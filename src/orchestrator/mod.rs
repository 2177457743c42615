//! Runs the selected analyses in dependency order and merges their results.

use crate::analysis::{
    DeadCodeFinding, DeadSymbolDetector, DependencyUsageMatcher, DependencyUsageReport,
    DuplicateBlockDetector, DuplicateBlockFinding,
};
use crate::config::Config;
use crate::discovery::{FileFinder, SourceFile};
use crate::harness::{
    CommandEnvironment, Installer, InterruptFlag, MutationTestHarness, TestRunner, TestSummary,
};
use crate::index::{IndexBuilder, IndexStats, ParallelIndexBuilder, SymbolIndex};
use crate::manifest::{DeclaredPackage, Manifest, ManifestError};
use miette::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// One analysis the orchestrator can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisKind {
    DeadCode,
    Duplicates,
    DependencyUsage,
    DependencyVerification,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::DeadCode,
        AnalysisKind::Duplicates,
        AnalysisKind::DependencyUsage,
        AnalysisKind::DependencyVerification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::DeadCode => "dead-code",
            AnalysisKind::Duplicates => "duplicates",
            AnalysisKind::DependencyUsage => "dependency-usage",
            AnalysisKind::DependencyVerification => "dependency-verification",
        }
    }

    /// The static analyses: everything but verification
    pub fn static_analyses() -> BTreeSet<AnalysisKind> {
        [
            AnalysisKind::DeadCode,
            AnalysisKind::Duplicates,
            AnalysisKind::DependencyUsage,
        ]
        .into_iter()
        .collect()
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub symbols: usize,
    pub call_sites: usize,
    pub imports: usize,
    pub elapsed_secs: f64,
}

impl AnalysisStats {
    fn from_index(stats: IndexStats) -> Self {
        Self {
            files_indexed: stats.files_indexed,
            files_skipped: stats.files_skipped,
            symbols: stats.symbols,
            call_sites: stats.call_sites,
            imports: stats.imports,
            elapsed_secs: 0.0,
        }
    }
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub root: PathBuf,
    pub analyses: Vec<AnalysisKind>,
    pub dead_code: Vec<DeadCodeFinding>,
    pub duplicates: Vec<DuplicateBlockFinding>,
    pub dependency_usage: Option<DependencyUsageReport>,
    pub verification: Option<TestSummary>,
    /// Manifest the dependency analyses read
    pub manifest: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    fn new(root: &Path, analyses: &BTreeSet<AnalysisKind>) -> Self {
        Self {
            root: root.to_path_buf(),
            analyses: analyses.iter().copied().collect(),
            dead_code: Vec::new(),
            duplicates: Vec::new(),
            dependency_usage: None,
            verification: None,
            manifest: None,
            warnings: Vec::new(),
            stats: AnalysisStats::default(),
        }
    }

    pub fn ran(&self, kind: AnalysisKind) -> bool {
        self.analyses.contains(&kind)
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Asked once before the manifest is mutated; `false` skips verification
pub type ConfirmFn<'a> = dyn Fn(&[DeclaredPackage]) -> bool + 'a;

/// Selects analyses, runs them in dependency order, produces one report
pub struct AnalysisOrchestrator<'a> {
    config: &'a Config,
    root: PathBuf,
    analyses: BTreeSet<AnalysisKind>,
    packages: Vec<String>,
    parallel: bool,
    progress: bool,
    dry_run: bool,
    interrupt: InterruptFlag,
    installer: Option<&'a dyn Installer>,
    runner: Option<&'a dyn TestRunner>,
    confirm: Option<&'a ConfirmFn<'a>>,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(config: &'a Config, root: &Path) -> Self {
        Self {
            config,
            root: root.to_path_buf(),
            analyses: AnalysisKind::static_analyses(),
            packages: Vec::new(),
            parallel: false,
            progress: false,
            dry_run: false,
            interrupt: InterruptFlag::new(),
            installer: None,
            runner: None,
            confirm: None,
        }
    }

    pub fn with_analyses(mut self, analyses: impl IntoIterator<Item = AnalysisKind>) -> Self {
        self.analyses = analyses.into_iter().collect();
        self
    }

    /// Explicit allow-list of packages to verify
    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
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

    /// Replace the command-template installer and runner
    pub fn with_capabilities(
        mut self,
        installer: &'a dyn Installer,
        runner: &'a dyn TestRunner,
    ) -> Self {
        self.installer = Some(installer);
        self.runner = Some(runner);
        self
    }

    pub fn with_confirm(mut self, confirm: &'a ConfirmFn<'a>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn run(&self) -> Result<AnalysisReport> {
        let start = Instant::now();
        let analyses = self.effective_analyses();
        let mut report = AnalysisReport::new(&self.root, &analyses);

        let verify = analyses.contains(&AnalysisKind::DependencyVerification);
        let match_usage = analyses.contains(&AnalysisKind::DependencyUsage);
        if verify && !match_usage {
            report.warn(format!(
                "verifying {} without usage matching: candidates are tested blind",
                self.packages.join(", ")
            ));
        }

        let needs_files = analyses.contains(&AnalysisKind::DeadCode)
            || analyses.contains(&AnalysisKind::Duplicates)
            || match_usage;
        let needs_index = analyses.contains(&AnalysisKind::DeadCode) || match_usage;
        let needs_manifest = match_usage || verify;

        let files = if needs_files {
            info!("Discovering files...");
            let files = FileFinder::new(self.config).find_files(&self.root)?;
            info!("Found {} Python files", files.len());
            if files.is_empty() {
                report.warn(format!("no Python files found under {}", self.root.display()));
            }
            files
        } else {
            Vec::new()
        };

        // Indexing and manifest parsing are independent
        let manifest_path = self.config.manifest_path(&self.root);
        let (config, root, parallel, progress) = (self.config, &self.root, self.parallel, self.progress);
        let (index, manifest) = rayon::join(
            || -> Result<Option<SymbolIndex>> {
                if needs_index {
                    build_index(root, &files, parallel, progress).map(Some)
                } else {
                    Ok(None)
                }
            },
            || -> Option<std::result::Result<Manifest, ManifestError>> {
                needs_manifest.then(|| Manifest::load(&manifest_path, &config.manifest))
            },
        );
        let index = index?;

        let manifest = match manifest {
            Some(Ok(manifest)) => {
                report.manifest = Some(manifest.path.clone());
                Some(manifest)
            }
            Some(Err(e)) if !verify => {
                report.warn(format!("dependency usage skipped: {}", e));
                None
            }
            Some(Err(e)) => return Err(e.into()),
            None => None,
        };

        if let Some(index) = &index {
            report.stats = AnalysisStats::from_index(index.stats());
            for skipped in index.skipped_files() {
                report.warn(format!(
                    "skipped {}: {}",
                    skipped.path.display(),
                    skipped.reason
                ));
            }
        }

        if analyses.contains(&AnalysisKind::DeadCode) {
            if let Some(index) = &index {
                info!("Detecting dead symbols...");
                let min_confidence = self.config.dead_code.min_confidence;
                report.dead_code = DeadSymbolDetector::new(self.config)
                    .detect(index)
                    .into_iter()
                    .filter(|f| f.confidence.value() >= min_confidence)
                    .collect();
            }
        }

        if analyses.contains(&AnalysisKind::Duplicates) {
            info!("Detecting duplicate blocks...");
            report.duplicates = DuplicateBlockDetector::new(&self.config.duplicates).detect(&files);
        }

        if match_usage {
            if let (Some(index), Some(manifest)) = (&index, &manifest) {
                let usage = DependencyUsageMatcher::new().match_usage(manifest, &index.top_level_imports());
                report.dependency_usage = Some(usage);
            }
        }

        if verify {
            if let Some(manifest) = &manifest {
                let packages = self.verification_targets(manifest, report.dependency_usage.as_ref())?;
                report.verification = self.verify(manifest, &packages, &mut report)?;
            }
        }

        report.stats.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Verification needs usage matching for its candidates unless an allow-list is given
    fn effective_analyses(&self) -> BTreeSet<AnalysisKind> {
        let mut analyses = self.analyses.clone();
        if analyses.contains(&AnalysisKind::DependencyVerification) && self.packages.is_empty() {
            analyses.insert(AnalysisKind::DependencyUsage);
        }
        analyses
    }

    /// The allow-list when given, otherwise the candidate-unused packages
    fn verification_targets(
        &self,
        manifest: &Manifest,
        usage: Option<&DependencyUsageReport>,
    ) -> std::result::Result<Vec<DeclaredPackage>, ManifestError> {
        if !self.packages.is_empty() {
            return self
                .packages
                .iter()
                .map(|name| {
                    manifest
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ManifestError::PackageNotDeclared(name.clone()))
                })
                .collect();
        }
        Ok(usage
            .map(|u| u.candidates().into_iter().cloned().collect())
            .unwrap_or_default())
    }

    fn verify(
        &self,
        manifest: &Manifest,
        packages: &[DeclaredPackage],
        report: &mut AnalysisReport,
    ) -> Result<Option<TestSummary>> {
        if packages.is_empty() {
            info!("No packages to verify");
        } else if !self.dry_run {
            if let Some(confirm) = self.confirm {
                if !confirm(packages) {
                    report.warn("dependency verification cancelled".to_string());
                    return Ok(None);
                }
            }
        }

        let commands = CommandEnvironment::new(&self.root, self.config)
            .with_interrupt(self.interrupt.clone());
        let installer: &dyn Installer = match self.installer {
            Some(installer) => installer,
            None => &commands,
        };
        let runner: &dyn TestRunner = match self.runner {
            Some(runner) => runner,
            None => &commands,
        };

        let summary = MutationTestHarness::new(self.config, &manifest.path, installer, runner)
            .with_dry_run(self.dry_run)
            .with_interrupt(self.interrupt.clone())
            .verify(packages)?;
        Ok(Some(summary))
    }
}

fn build_index(root: &Path, files: &[SourceFile], parallel: bool, progress: bool) -> Result<SymbolIndex> {
    if parallel {
        Ok(ParallelIndexBuilder::new(root).build_from_files(files))
    } else {
        info!("Parsing files...");
        let mut builder = IndexBuilder::new(root)?;
        builder.process_files(files, progress);
        Ok(builder.build())
    }
}
