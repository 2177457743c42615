use super::entry_points::{EntryPointDetector, EntryPointKind};
use super::{Confidence, FindingCode, Severity};
use crate::config::Config;
use crate::index::{DeclaredSymbol, SymbolIndex, SymbolKind};
use serde::Serialize;
use tracing::{debug, info};

const BASE_CONFIDENCE: f64 = 0.6;
const PRIVATE_BONUS: f64 = 0.2;
const STRING_LITERAL_PENALTY: f64 = -0.3;
const SOFT_ENTRY_POINT_PENALTY: f64 = -0.3;
/// A name seen in a string literal is likely dispatched dynamically
const STRING_LITERAL_CAP: f64 = 0.3;
const MAX_POTENTIAL_USES: usize = 5;

/// One step of the confidence computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceAdjustment {
    pub reason: String,
    pub delta: f64,
}

/// A declared symbol with no matching call-site
#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeFinding {
    pub symbol: DeclaredSymbol,

    pub code: FindingCode,

    pub severity: Severity,

    pub confidence: Confidence,

    pub reason: String,

    /// Call-site names that almost match
    pub potential_uses: Vec<String>,

    pub adjustments: Vec<ConfidenceAdjustment>,
}

/// Flags declared symbols that nothing calls or references
pub struct DeadSymbolDetector<'a> {
    config: &'a Config,
    entry_points: EntryPointDetector<'a>,
}

impl<'a> DeadSymbolDetector<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            entry_points: EntryPointDetector::new(config),
        }
    }

    pub fn detect(&self, index: &SymbolIndex) -> Vec<DeadCodeFinding> {
        self.entry_points.count(index);

        let mut called: Vec<&str> = index.called_names().collect();
        called.sort_unstable();

        let mut findings: Vec<DeadCodeFinding> = index
            .symbols()
            .filter(|decl| !index.is_referenced(&decl.qualified_name))
            .filter(|decl| !self.config.dead_code.private_only || decl.is_private())
            .filter_map(|decl| self.evaluate(decl, index, &called))
            .collect();

        findings.sort_by(|a, b| {
            a.symbol
                .location
                .file
                .cmp(&b.symbol.location.file)
                .then(a.symbol.location.line.cmp(&b.symbol.location.line))
        });

        info!("Found {} unreferenced symbols", findings.len());
        findings
    }

    fn evaluate(
        &self,
        decl: &DeclaredSymbol,
        index: &SymbolIndex,
        called: &[&str],
    ) -> Option<DeadCodeFinding> {
        let entry_point = self.entry_points.classify(decl);
        if let Some(EntryPointKind::Hard(reason)) = &entry_point {
            debug!("Skipping {}: {}", decl.qualified_name, reason);
            return None;
        }

        let mut adjustments = Vec::new();
        if decl.is_private() {
            adjustments.push(ConfidenceAdjustment {
                reason: "private by naming convention".to_string(),
                delta: PRIVATE_BONUS,
            });
        }
        let in_string = index.contains_string_literal(&decl.name);
        if in_string {
            adjustments.push(ConfidenceAdjustment {
                reason: "name appears in a string literal".to_string(),
                delta: STRING_LITERAL_PENALTY,
            });
        }
        if let Some(EntryPointKind::Soft(reason)) = &entry_point {
            adjustments.push(ConfidenceAdjustment {
                reason: reason.clone(),
                delta: SOFT_ENTRY_POINT_PENALTY,
            });
        }

        let raw = BASE_CONFIDENCE + adjustments.iter().map(|a| a.delta).sum::<f64>();
        let raw = if in_string {
            raw.min(STRING_LITERAL_CAP)
        } else {
            raw
        };
        let confidence = Confidence::new(raw);

        if confidence.value() < self.config.dead_code.min_confidence {
            return None;
        }

        let code = match decl.kind {
            SymbolKind::Function => FindingCode::UnusedFunction,
            SymbolKind::Class => FindingCode::UnusedClass,
            SymbolKind::Method => FindingCode::UnusedMethod,
        };

        Some(DeadCodeFinding {
            symbol: decl.clone(),
            code,
            severity: Severity::from_confidence(confidence),
            confidence,
            reason: format!("{} '{}' is never used", decl.kind.display_name(), decl.name),
            potential_uses: potential_uses(&decl.name, called),
            adjustments,
        })
    }
}

/// Call-site names that nearly match `name`
fn potential_uses(name: &str, called: &[&str]) -> Vec<String> {
    let stripped = name.trim_start_matches('_');
    let lower = name.to_lowercase();

    called
        .iter()
        .filter(|&&candidate| candidate != name)
        .filter(|&&candidate| {
            candidate.to_lowercase() == lower
                || (!stripped.is_empty() && candidate.trim_start_matches('_') == stripped)
                || (name.len() >= 4
                    && candidate.len() >= 4
                    && (candidate.contains(name) || name.contains(candidate)))
        })
        .take(MAX_POTENTIAL_USES)
        .map(|c| c.to_string())
        .collect()
}
