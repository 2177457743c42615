//! Integration tests for each detector type
//!
//! These tests verify the detectors against the Python fixtures.

use deadweight::analysis::{
    DeadCodeFinding, DeadSymbolDetector, DependencyUsageMatcher, DuplicateBlockDetector,
    FindingCode, UsageStatus,
};
use deadweight::config::{Config, ManifestConfig};
use deadweight::discovery::FileFinder;
use deadweight::index::{ParallelIndexBuilder, SymbolIndex};
use deadweight::manifest::Manifest;
use std::path::PathBuf;

/// Get the path to the test fixtures directory
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/python")
}

fn sample_index(config: &Config) -> SymbolIndex {
    let root = fixtures_path().join("sample_project");
    let files = FileFinder::new(config).find_files(&root).expect("discovery");
    ParallelIndexBuilder::new(&root).build_from_files(&files)
}

fn finding<'a>(findings: &'a [DeadCodeFinding], name: &str) -> Option<&'a DeadCodeFinding> {
    findings.iter().find(|f| f.symbol.name == name)
}

// ============================================================================
// Dead Symbol Detection Tests
// ============================================================================

mod dead_symbol_tests {
    use super::*;

    #[test]
    fn test_unreferenced_symbols_are_flagged() {
        let config = Config::default();
        let findings = DeadSymbolDetector::new(&config).detect(&sample_index(&config));

        let helper = finding(&findings, "orphan_helper").expect("orphan_helper flagged");
        assert_eq!(helper.code, FindingCode::UnusedFunction);
        assert!((helper.confidence.value() - 0.6).abs() < 1e-9);

        let private = finding(&findings, "_unused_private").expect("private flagged");
        assert!(private.confidence.value() > helper.confidence.value());

        let step = finding(&findings, "abandoned_step").expect("method flagged");
        assert_eq!(step.code, FindingCode::UnusedMethod);

        let exporter = finding(&findings, "LegacyExporter").expect("class flagged");
        assert_eq!(exporter.code, FindingCode::UnusedClass);
    }

    #[test]
    fn test_referenced_symbols_never_flagged() {
        let config = Config::default();
        let index = sample_index(&config);
        let findings = DeadSymbolDetector::new(&config).detect(&index);

        for f in &findings {
            assert!(
                !index.is_referenced(&f.symbol.qualified_name),
                "{} has a call-site but was reported",
                f.symbol.qualified_name
            );
        }
        for name in ["load_settings", "Pipeline", "run", "dispatch"] {
            assert!(finding(&findings, name).is_none(), "{} is used", name);
        }
    }

    #[test]
    fn test_entry_points_are_not_flagged() {
        let config = Config::default();
        let findings = DeadSymbolDetector::new(&config).detect(&sample_index(&config));

        for name in ["main", "__init__", "test_pipeline_runs"] {
            assert!(finding(&findings, name).is_none(), "{} is an entry point", name);
        }
    }

    #[test]
    fn test_string_dispatch_lowers_confidence() {
        let config = Config::default();
        let findings = DeadSymbolDetector::new(&config).detect(&sample_index(&config));

        let ping = finding(&findings, "handle_ping").expect("still flagged");
        assert!(ping.confidence.value() <= 0.3);
        assert!(ping
            .adjustments
            .iter()
            .any(|a| a.reason.contains("string literal")));

        let echo = finding(&findings, "handle_echo").expect("flagged");
        assert!(echo.confidence.value() > ping.confidence.value());
    }

    #[test]
    fn test_confidences_are_in_range() {
        let config = Config::default();
        for f in DeadSymbolDetector::new(&config).detect(&sample_index(&config)) {
            let c = f.confidence.value();
            assert!(c > 0.0 && c <= 1.0, "{} out of range", c);
        }
    }

    #[test]
    fn test_retain_patterns_and_min_confidence() {
        let mut config = Config::default();
        config.retain_patterns.push("orphan_*".to_string());
        config.dead_code.min_confidence = 0.5;
        let findings = DeadSymbolDetector::new(&config).detect(&sample_index(&config));

        assert!(finding(&findings, "orphan_helper").is_none());
        assert!(finding(&findings, "handle_ping").is_none());
        assert!(findings.iter().all(|f| f.confidence.value() >= 0.5));
    }

    #[test]
    fn test_private_only() {
        let mut config = Config::default();
        config.dead_code.private_only = true;
        let findings = DeadSymbolDetector::new(&config).detect(&sample_index(&config));

        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.symbol.name.starts_with('_')));
    }
}

// ============================================================================
// Duplicate Block Detection Tests
// ============================================================================

mod duplicate_tests {
    use super::*;

    #[test]
    fn test_identical_function_bodies() {
        let config = Config::default();
        let root = fixtures_path().join("duplicates");
        let files = FileFinder::new(&config).find_files(&root).unwrap();
        assert_eq!(files.len(), 2);

        let findings = DuplicateBlockDetector::new(&config.duplicates).detect(&files);
        assert_eq!(findings.len(), 1);
        let dup = &findings[0];
        assert_eq!(dup.size, 10);
        assert!((dup.similarity - 1.0).abs() < 1e-9);
        assert_eq!(dup.lines_a.start, 2);
        assert_eq!(dup.lines_a.end, 11);
        assert!(dup.file_a.ends_with("report_a.py"));
        assert!(dup.file_b.ends_with("report_b.py"));
    }

    #[test]
    fn test_thresholds_hold_for_every_finding() {
        let config = Config::default();
        let root = fixtures_path();
        let files = FileFinder::new(&config).find_files(&root).unwrap();

        for (min_lines, min_similarity) in [(3, 0.8), (5, 0.6), (8, 1.0)] {
            let findings = DuplicateBlockDetector::new(&config.duplicates)
                .with_min_lines(min_lines)
                .with_min_similarity(min_similarity)
                .detect(&files);
            for f in findings {
                assert!(f.size >= min_lines);
                assert!(f.similarity + 1e-9 >= min_similarity);
            }
        }
    }

    #[test]
    fn test_block_larger_than_file_finds_nothing() {
        let config = Config::default();
        let files = FileFinder::new(&config)
            .find_files(&fixtures_path().join("duplicates"))
            .unwrap();
        let findings = DuplicateBlockDetector::new(&config.duplicates)
            .with_min_lines(20)
            .detect(&files);
        assert!(findings.is_empty());
    }
}

// ============================================================================
// Dependency Usage Tests
// ============================================================================

mod dependency_usage_tests {
    use super::*;

    #[test]
    fn test_alpha_used_beta_candidate() {
        let config = Config::default();
        let index = sample_index(&config);
        let manifest = Manifest::load(
            &fixtures_path().join("sample_project/requirements.txt"),
            &ManifestConfig::default(),
        )
        .unwrap();

        let report = DependencyUsageMatcher::new().match_usage(&manifest, &index.top_level_imports());
        let status = |name: &str| {
            report
                .packages
                .iter()
                .find(|p| p.package.name == name)
                .map(|p| p.status)
        };

        assert_eq!(status("alpha"), Some(UsageStatus::Used));
        assert_eq!(status("beta"), Some(UsageStatus::CandidateUnused));
        assert_eq!(status("pytest"), Some(UsageStatus::Optional));

        let candidates: Vec<&str> = report.candidates().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(candidates, vec!["beta"]);
        assert_eq!(report.packages[1].confidence().value(), 0.0);
    }

    #[test]
    fn test_manifest_name_differs_from_import_name() {
        let manifest = Manifest::parse(
            std::path::Path::new("requirements.txt"),
            "PyYAML==6.0\nbeautifulsoup4\nrequests\n",
            &ManifestConfig::default(),
        );
        let imports = ["yaml", "bs4"].iter().map(|s| s.to_string()).collect();

        let report = DependencyUsageMatcher::new().match_usage(&manifest, &imports);
        let candidates: Vec<&str> = report.candidates().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(candidates, vec!["requests"]);
    }
}
