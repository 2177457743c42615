use clap::Parser;
use colored::Colorize;
use deadweight::config::Config;
use deadweight::harness::{Environment, InterruptFlag, TestType};
use deadweight::manifest::DeclaredPackage;
use deadweight::orchestrator::{AnalysisKind, AnalysisOrchestrator};
use deadweight::report::{self, Reporter};
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::Result;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// deadweight - dead code, duplicate blocks and unused dependencies in Python projects
#[derive(Parser, Debug)]
#[command(name = "deadweight")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the project directory to analyze
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Analyses to run (comma-separated or repeated)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    analysis: Vec<AnalysisArg>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target directories to analyze (can be specified multiple times)
    #[arg(short, long)]
    target: Vec<PathBuf>,

    /// Patterns to exclude (can be specified multiple times)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Patterns to retain - never report as dead (can be specified multiple times)
    #[arg(short, long)]
    retain: Vec<String>,

    /// Dependency manifest (default: requirements.txt in the project root)
    #[arg(short, long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Where installs and tests run during verification
    #[arg(long, value_enum)]
    environment: Option<Environment>,

    /// Which tests to run during verification
    #[arg(long, value_enum)]
    test_type: Option<TestType>,

    /// Timeout in seconds for one test-suite run
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verify only these packages (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    packages: Vec<String>,

    /// Dry run - locate packages in the manifest without touching it
    #[arg(long)]
    dry_run: bool,

    /// Minimum block size in lines for duplicate detection
    #[arg(long)]
    min_lines: Option<usize>,

    /// Minimum similarity (0.0-1.0) for duplicate detection
    #[arg(long)]
    min_similarity: Option<f64>,

    /// Minimum confidence (0.0-1.0) for dead code findings
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: OutputFormat,

    /// Output file (for json/sarif formats)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable parallel processing for faster analysis
    #[arg(long)]
    parallel: bool,

    /// Ask before the manifest is mutated
    #[arg(long)]
    interactive: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AnalysisArg {
    DeadCode,
    Duplicates,
    DependencyUsage,
    DependencyVerification,
    All,
}

impl AnalysisArg {
    fn kinds(self) -> Vec<AnalysisKind> {
        match self {
            AnalysisArg::DeadCode => vec![AnalysisKind::DeadCode],
            AnalysisArg::Duplicates => vec![AnalysisKind::Duplicates],
            AnalysisArg::DependencyUsage => vec![AnalysisKind::DependencyUsage],
            AnalysisArg::DependencyVerification => vec![AnalysisKind::DependencyVerification],
            AnalysisArg::All => AnalysisKind::ALL.to_vec(),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
    Sarif,
}

impl From<OutputFormat> for report::ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => report::ReportFormat::Terminal,
            OutputFormat::Json => report::ReportFormat::Json,
            OutputFormat::Sarif => report::ReportFormat::Sarif,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("deadweight v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    run_analysis(&config, &cli)
}

fn run_analysis(config: &Config, cli: &Cli) -> Result<()> {
    let start_time = Instant::now();

    let analyses: Vec<AnalysisKind> = if cli.analysis.is_empty() {
        AnalysisKind::static_analyses().into_iter().collect()
    } else {
        cli.analysis.iter().flat_map(|a| a.kinds()).collect()
    };
    let verifying = analyses.contains(&AnalysisKind::DependencyVerification);

    let interrupt = InterruptFlag::new();
    if verifying && !cli.dry_run {
        if let Err(e) = interrupt.install_handler() {
            warn!("Could not install the Ctrl-C handler: {}", e);
        }
    }

    if cli.parallel && !cli.quiet && matches!(cli.format, OutputFormat::Terminal) {
        println!("{}", "⚡ Parallel mode".cyan());
    }

    let mut orchestrator = AnalysisOrchestrator::new(config, &cli.path)
        .with_analyses(analyses)
        .with_packages(cli.packages.clone())
        .with_parallel(cli.parallel)
        .with_progress(!cli.quiet && !cli.verbose)
        .with_dry_run(cli.dry_run)
        .with_interrupt(interrupt);
    if cli.interactive {
        orchestrator = orchestrator.with_confirm(&confirm_mutation);
    }

    let report = orchestrator.run()?;

    let reporter = Reporter::new(cli.format.clone().into(), cli.output.clone()).with_details(!cli.quiet);
    reporter.report(&report)?;

    if !cli.quiet && matches!(cli.format, OutputFormat::Terminal) {
        println!(
            "{}",
            format!("Completed in {:.2}s", start_time.elapsed().as_secs_f64()).dimmed()
        );
    }

    Ok(())
}

/// `--interactive`: list what will be disabled and ask once
fn confirm_mutation(packages: &[DeclaredPackage]) -> bool {
    println!();
    println!(
        "{}",
        "The manifest will be mutated for each of these packages:".cyan().bold()
    );
    for package in packages {
        println!("  {} {}", "•".dimmed(), package.raw_name);
    }
    println!();

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Verify {} packages?", packages.len()))
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        // Try to load from default locations
        Config::from_default_locations(&cli.path)?
    };

    // Override with CLI arguments
    if !cli.target.is_empty() {
        config.targets = cli.target.clone();
    }
    if !cli.exclude.is_empty() {
        config.exclude.extend(cli.exclude.clone());
    }
    if !cli.retain.is_empty() {
        config.retain_patterns.extend(cli.retain.clone());
    }
    if let Some(manifest) = &cli.manifest {
        config.manifest.path = manifest.clone();
    }
    if let Some(environment) = cli.environment {
        config.verification.environment = environment;
    }
    if let Some(test_type) = cli.test_type {
        config.verification.test_type = test_type;
    }
    if let Some(timeout) = cli.timeout {
        config.verification.timeout_secs = timeout;
    }
    if let Some(min_lines) = cli.min_lines {
        config.duplicates.min_lines = min_lines;
    }
    if let Some(min_similarity) = cli.min_similarity {
        config.duplicates.min_similarity = min_similarity;
    }
    if let Some(min_confidence) = cli.min_confidence {
        config.dead_code.min_confidence = min_confidence;
    }

    Ok(config)
}
