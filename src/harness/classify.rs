use super::process::CommandOutcome;
use super::Outcome;
use crate::analysis::Confidence;
use crate::manifest::DeclaredPackage;
use regex::Regex;

/// pytest: no tests were collected
const PYTEST_NO_TESTS: i32 = 5;

/// A missing-module or failed-import line found in test output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignature {
    /// Dotted module path named by the error
    pub module: String,
    /// The matching output line
    pub line: String,
}

impl FailureSignature {
    pub fn top_level(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }

    pub fn names(&self, package: &DeclaredPackage) -> bool {
        let top = self.top_level();
        package.import_names.iter().any(|n| n == top) || package.name == top.to_lowercase()
    }
}

/// Finds import failures in test output
#[derive(Debug)]
pub struct SignatureScanner {
    patterns: Vec<Regex>,
}

impl SignatureScanner {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = [
            r"ModuleNotFoundError: No module named '(?P<module>[\w.]+)'",
            r"ImportError: No module named '?(?P<module>[\w.]+)'?",
            r"ImportError: cannot import name '[^']+' from '(?P<module>[\w.]+)'",
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// First signature in the output, preferring lines that name `package`
    pub fn scan(&self, output: &str, package: &DeclaredPackage) -> Option<FailureSignature> {
        let mut found: Vec<FailureSignature> = Vec::new();
        for line in output.lines() {
            for pattern in &self.patterns {
                if let Some(module) = pattern.captures(line).and_then(|c| c.name("module")) {
                    found.push(FailureSignature {
                        module: module.as_str().to_string(),
                        line: line.trim().to_string(),
                    });
                    break;
                }
            }
        }
        let preferred = found.iter().position(|s| s.names(package));
        match preferred {
            Some(idx) => Some(found.swap_remove(idx)),
            None => found.into_iter().next(),
        }
    }
}

/// Verdict for one test run
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    pub confidence: Confidence,
    pub reason: String,
}

impl Classification {
    fn new(outcome: Outcome, confidence: f64, reason: impl Into<String>) -> Self {
        let confidence = if confidence <= 0.0 {
            Confidence::none()
        } else {
            Confidence::new(confidence)
        };
        Self {
            outcome,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn install_failed(detail: &str) -> Self {
        Self::new(
            Outcome::Inconclusive,
            0.0,
            format!("environment error: {}", detail),
        )
    }
}

/// Classify a test run made with `package` disabled
pub fn classify(
    outcome: &CommandOutcome,
    package: &DeclaredPackage,
    signature: Option<&FailureSignature>,
) -> Classification {
    if outcome.timed_out {
        return Classification::new(Outcome::Inconclusive, 0.0, "timed out");
    }
    // A crash (e.g. a segfault while importing) is still a failing run
    let Some(code) = outcome.exit_code else {
        return Classification::new(
            Outcome::Required,
            0.5,
            format!("test run terminated by a signal without '{}'", package.name),
        );
    };
    if code == PYTEST_NO_TESTS {
        return Classification::new(Outcome::Inconclusive, 0.0, "no tests collected");
    }

    match (code, signature) {
        (0, None) => Classification::new(
            Outcome::NotRequired,
            0.95,
            format!("tests pass without '{}'", package.name),
        ),
        (0, Some(sig)) => {
            let confidence = if sig.names(package) { 0.6 } else { 0.5 };
            Classification::new(
                Outcome::Required,
                confidence,
                format!("tests pass but report an import failure: {}", sig.line),
            )
        }
        (code, Some(sig)) if sig.names(package) => Classification::new(
            Outcome::Required,
            0.9,
            format!("tests fail (exit {}) with missing module '{}'", code, sig.module),
        ),
        (code, Some(sig)) => Classification::new(
            Outcome::Required,
            0.5,
            format!("tests fail (exit {}) with missing module '{}'", code, sig.module),
        ),
        (code, None) => Classification::new(
            Outcome::Required,
            0.6,
            format!("tests fail (exit {}) without '{}'", code, package.name),
        ),
    }
}
