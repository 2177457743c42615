use crate::harness::{Environment, TestType};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for a deadweight run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target directories to analyze, relative to the project root
    pub targets: Vec<PathBuf>,

    /// Glob patterns for files excluded from analysis
    pub exclude: Vec<String>,

    /// Directory names pruned before traversal
    pub excluded_dirs: Vec<String>,

    /// Patterns to retain - never report as dead code
    pub retain_patterns: Vec<String>,

    /// Explicit entry points (simple or qualified names)
    pub entry_points: Vec<String>,

    /// Dead code configuration
    pub dead_code: DeadCodeConfig,

    /// Duplicate detection configuration
    pub duplicates: DuplicateConfig,

    /// Dependency manifest configuration
    pub manifest: ManifestConfig,

    /// Mutation testing configuration
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadCodeConfig {
    /// Findings below this confidence are dropped from the report
    pub min_confidence: f64,

    /// Report private symbols only
    pub private_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Window size in normalized lines
    pub min_lines: usize,

    /// Minimum fraction of equal lines for a window pair to count
    pub min_similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest path, relative to the project root
    pub path: PathBuf,

    /// Marker that starts a comment line
    pub comment_marker: String,

    /// Prefix written in front of a disabled declaration line
    pub disable_marker: String,

    /// Extra manifest-name -> import-name mappings
    pub import_names: BTreeMap<String, Vec<String>>,

    /// Extra packages treated as optional/dev-only
    pub optional_packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub environment: Environment,

    pub test_type: TestType,

    /// Timeout for one test-suite run
    pub timeout_secs: u64,

    /// Timeout for one install/uninstall command
    pub install_timeout_secs: u64,

    /// Re-run the install command after each restore
    pub resync_after_restore: bool,

    /// Uninstall the disabled package before reinstalling
    pub uninstall_disabled: bool,

    /// Test selection per test type
    pub selections: BTreeMap<TestType, Vec<String>>,

    /// Command templates per environment
    pub environments: BTreeMap<Environment, EnvironmentCommands>,
}

/// Command templates for one execution environment.
///
/// Placeholders: `{manifest}` (manifest path relative to the project root),
/// `{package}` (manifest name) and `{selection}` (expanded to the selection
/// arguments).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentCommands {
    pub install: Vec<String>,
    #[serde(default)]
    pub uninstall: Vec<String>,
    pub test: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: vec![],
            exclude: vec![
                "**/migrations/**".to_string(),
                "**/*_pb2.py".to_string(),
            ],
            excluded_dirs: [
                ".git",
                ".hg",
                ".svn",
                "__pycache__",
                ".venv",
                "venv",
                "env",
                ".tox",
                ".nox",
                ".mypy_cache",
                ".pytest_cache",
                ".ruff_cache",
                "build",
                "dist",
                "node_modules",
                "site-packages",
                "*.egg-info",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            retain_patterns: vec![],
            entry_points: vec![],
            dead_code: DeadCodeConfig::default(),
            duplicates: DuplicateConfig::default(),
            manifest: ManifestConfig::default(),
            verification: VerificationConfig::default(),
        }
    }
}

impl Default for DeadCodeConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            private_only: false,
        }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_lines: 3,
            min_similarity: 0.8,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("requirements.txt"),
            comment_marker: "#".to_string(),
            disable_marker: "# DISABLED FOR TESTING: ".to_string(),
            import_names: BTreeMap::new(),
            optional_packages: vec![],
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        let mut selections = BTreeMap::new();
        selections.insert(TestType::Unit, vec!["tests/unit".to_string()]);
        selections.insert(TestType::Integration, vec!["tests/integration".to_string()]);
        selections.insert(TestType::All, vec!["tests".to_string()]);

        let mut environments = BTreeMap::new();
        environments.insert(Environment::Host, EnvironmentCommands::host());
        environments.insert(Environment::Container, EnvironmentCommands::container());
        environments.insert(Environment::Sandbox, EnvironmentCommands::sandbox());

        Self {
            environment: Environment::Host,
            test_type: TestType::All,
            timeout_secs: 600,
            install_timeout_secs: 900,
            resync_after_restore: true,
            uninstall_disabled: true,
            selections,
            environments,
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl EnvironmentCommands {
    pub fn host() -> Self {
        Self {
            install: args(&["python", "-m", "pip", "install", "-q", "-r", "{manifest}"]),
            uninstall: args(&["python", "-m", "pip", "uninstall", "-y", "-q", "{package}"]),
            test: args(&["python", "-m", "pytest", "-q", "-x", "{selection}"]),
        }
    }

    pub fn container() -> Self {
        Self {
            install: args(&[
                "docker", "compose", "run", "--rm", "app", "pip", "install", "-q", "-r",
                "{manifest}",
            ]),
            uninstall: vec![],
            test: args(&[
                "docker", "compose", "run", "--rm", "app", "python", "-m", "pytest", "-q", "-x",
                "{selection}",
            ]),
        }
    }

    pub fn sandbox() -> Self {
        Self {
            install: args(&["uv", "pip", "install", "-q", "-r", "{manifest}"]),
            uninstall: args(&["uv", "pip", "uninstall", "{package}"]),
            test: args(&["uv", "run", "--no-sync", "pytest", "-q", "-x", "{selection}"]),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".deadweight.yml",
            ".deadweight.yaml",
            ".deadweight.toml",
            "deadweight.yml",
            "deadweight.yaml",
            "deadweight.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Check if a file path matches an exclusion pattern
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude.iter().any(|pattern| glob_match(pattern, &path_str))
    }

    /// Check if a directory name is pruned before traversal
    pub fn is_excluded_dir(&self, dir_name: &str) -> bool {
        self.excluded_dirs
            .iter()
            .any(|pattern| glob_match(pattern, dir_name))
    }

    /// Check if a symbol should be retained
    pub fn should_retain(&self, name: &str) -> bool {
        self.retain_patterns.iter().any(|p| glob_match(p, name))
    }

    /// Check if a symbol is a configured entry point
    pub fn is_configured_entry_point(&self, name: &str, qualified_name: &str) -> bool {
        self.entry_points
            .iter()
            .any(|ep| ep == name || ep == qualified_name || glob_match(ep, qualified_name))
    }

    /// Absolute manifest path for a project root
    pub fn manifest_path(&self, project_root: &Path) -> PathBuf {
        if self.manifest.path.is_absolute() {
            self.manifest.path.clone()
        } else {
            project_root.join(&self.manifest.path)
        }
    }

    /// Command templates for an environment, falling back to the built-in ones
    pub fn commands_for(&self, environment: Environment) -> EnvironmentCommands {
        self.verification
            .environments
            .get(&environment)
            .cloned()
            .unwrap_or_else(|| match environment {
                Environment::Host => EnvironmentCommands::host(),
                Environment::Container => EnvironmentCommands::container(),
                Environment::Sandbox => EnvironmentCommands::sandbox(),
            })
    }

    /// Test selection arguments for a test type
    pub fn selection_for(&self, test_type: TestType) -> Vec<String> {
        self.verification
            .selections
            .get(&test_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Simple glob matching for patterns like "*_handler", "*.egg-info" or "**/migrations/**"
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        let suffix = &pattern[1..];
        return text.ends_with(suffix);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        let prefix = &pattern[..pattern.len() - 1];
        return text.starts_with(prefix);
    }

    if pattern.contains("**") {
        let cleaned = pattern.replace("**/", "").replace("/**", "");

        // "**/migrations/**" matches a complete directory name anywhere in the path
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let dir_name = cleaned.trim_matches('/');
            let dir_pattern = format!("/{}/", dir_name);
            return text.contains(&dir_pattern);
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }

            if prefix.is_empty() {
                if let Some(file_suffix) = suffix.strip_prefix('*') {
                    return text.ends_with(file_suffix);
                }
                return text.ends_with(suffix) || text.contains(&format!("/{}", suffix));
            }

            if suffix.is_empty() {
                return text.starts_with(prefix) || text.contains(&format!("{}/", prefix));
            }

            return (text.starts_with(prefix) || text.contains(&format!("/{}/", prefix)))
                && (text.ends_with(suffix) || text.contains(&format!("/{}", suffix)));
        }
    }

    text == pattern
}
