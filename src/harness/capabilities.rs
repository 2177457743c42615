use super::process::{run_command, CommandOutcome};
use super::{Environment, InterruptFlag};
use crate::config::{Config, EnvironmentCommands};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Installs the project's dependencies into an execution environment
pub trait Installer {
    fn install(&self, manifest: &Path, environment: Environment) -> std::io::Result<CommandOutcome>;

    /// Reinstall from a restored manifest. Runs to completion even after an interrupt.
    fn resync(&self, manifest: &Path, environment: Environment) -> std::io::Result<CommandOutcome> {
        self.install(manifest, environment)
    }

    /// Remove one package. `Ok(None)` when the environment has no uninstall step.
    fn uninstall(
        &self,
        package: &str,
        environment: Environment,
    ) -> std::io::Result<Option<CommandOutcome>>;
}

/// Runs the project's test suite
pub trait TestRunner {
    fn run_tests(
        &self,
        selection: &[String],
        environment: Environment,
        timeout: Duration,
        interrupt: &InterruptFlag,
    ) -> std::io::Result<CommandOutcome>;
}

/// Installer and test runner backed by the configured command templates
#[derive(Debug, Clone)]
pub struct CommandEnvironment {
    root: PathBuf,
    commands: BTreeMap<Environment, EnvironmentCommands>,
    install_timeout: Duration,
    interrupt: InterruptFlag,
}

impl CommandEnvironment {
    pub fn new(root: &Path, config: &Config) -> Self {
        let commands = [Environment::Host, Environment::Container, Environment::Sandbox]
            .into_iter()
            .map(|env| (env, config.commands_for(env)))
            .collect();
        Self {
            root: root.to_path_buf(),
            commands,
            install_timeout: Duration::from_secs(config.verification.install_timeout_secs),
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn commands(&self, environment: Environment) -> EnvironmentCommands {
        self.commands
            .get(&environment)
            .cloned()
            .unwrap_or_else(EnvironmentCommands::host)
    }

    /// Manifest path as the command sees it: relative to the project root when inside it
    fn manifest_arg(&self, manifest: &Path) -> String {
        manifest
            .strip_prefix(&self.root)
            .unwrap_or(manifest)
            .to_string_lossy()
            .to_string()
    }
}

impl CommandEnvironment {
    fn run_install(
        &self,
        manifest: &Path,
        environment: Environment,
        interrupt: &InterruptFlag,
    ) -> std::io::Result<CommandOutcome> {
        let vars = Placeholders {
            manifest: Some(self.manifest_arg(manifest)),
            ..Placeholders::default()
        };
        let argv = expand_template(&self.commands(environment).install, &vars);
        run_command(&argv, &self.root, &[], self.install_timeout, interrupt)
    }
}

impl Installer for CommandEnvironment {
    fn install(&self, manifest: &Path, environment: Environment) -> std::io::Result<CommandOutcome> {
        self.run_install(manifest, environment, &self.interrupt)
    }

    fn resync(&self, manifest: &Path, environment: Environment) -> std::io::Result<CommandOutcome> {
        // Bounded by the install timeout only; a pending Ctrl-C must not cut it short
        self.run_install(manifest, environment, &InterruptFlag::new())
    }

    fn uninstall(
        &self,
        package: &str,
        environment: Environment,
    ) -> std::io::Result<Option<CommandOutcome>> {
        let template = self.commands(environment).uninstall;
        if template.is_empty() {
            return Ok(None);
        }
        let vars = Placeholders {
            package: Some(package.to_string()),
            ..Placeholders::default()
        };
        let argv = expand_template(&template, &vars);
        run_command(&argv, &self.root, &[], self.install_timeout, &self.interrupt).map(Some)
    }
}

impl TestRunner for CommandEnvironment {
    fn run_tests(
        &self,
        selection: &[String],
        environment: Environment,
        timeout: Duration,
        interrupt: &InterruptFlag,
    ) -> std::io::Result<CommandOutcome> {
        let vars = Placeholders {
            selection: selection.to_vec(),
            ..Placeholders::default()
        };
        let argv = expand_template(&self.commands(environment).test, &vars);
        let envs = [("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string())];
        run_command(&argv, &self.root, &envs, timeout, interrupt)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Placeholders {
    pub manifest: Option<String>,
    pub package: Option<String>,
    pub selection: Vec<String>,
}

/// Substitute placeholders. A bare `{selection}` argument expands to one argument per entry.
pub(crate) fn expand_template(template: &[String], vars: &Placeholders) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.len() + vars.selection.len());
    for part in template {
        if part == "{selection}" {
            argv.extend(vars.selection.iter().cloned());
            continue;
        }
        let mut arg = part.clone();
        if let Some(manifest) = &vars.manifest {
            arg = arg.replace("{manifest}", manifest);
        }
        if let Some(package) = &vars.package {
            arg = arg.replace("{package}", package);
        }
        arg = arg.replace("{selection}", &vars.selection.join(" "));
        argv.push(arg);
    }
    argv
}
