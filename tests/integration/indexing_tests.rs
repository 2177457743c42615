//! Symbol indexing over real Python trees

use deadweight::config::Config;
use deadweight::discovery::{FileFinder, FileType, SourceFile};
use deadweight::index::{CallKind, IndexBuilder, ParallelIndexBuilder, SymbolIndex, SymbolKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn sample_project() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/python/sample_project")
}

fn index_project(root: &Path) -> SymbolIndex {
    let config = Config::default();
    let files = FileFinder::new(&config).find_files(root).expect("discovery");
    ParallelIndexBuilder::new(root).build_from_files(&files)
}

#[test]
fn test_discovers_python_sources() {
    let config = Config::default();
    let files = FileFinder::new(&config)
        .find_files(&sample_project())
        .unwrap();
    let names: BTreeSet<String> = files
        .iter()
        .map(|f| f.module_path(&sample_project()))
        .collect();

    assert!(names.contains("app"));
    assert!(names.contains("app.core"));
    assert!(names.contains("app.handlers"));
    assert!(names.contains("tests.test_core"));
    assert!(files.iter().all(|f| f.file_type == FileType::Python));
}

#[test]
fn test_declarations_are_qualified() {
    let index = index_project(&sample_project());

    let helper = index.get("app.core.orphan_helper").expect("function indexed");
    assert_eq!(helper.kind, SymbolKind::Function);
    assert_eq!(helper.location.line, 10);

    let step = index.get("app.core.Pipeline.abandoned_step").expect("method indexed");
    assert_eq!(step.kind, SymbolKind::Method);
    assert_eq!(step.enclosing_class.as_deref(), Some("Pipeline"));

    let class = index.get("app.core.LegacyExporter").expect("class indexed");
    assert_eq!(class.kind, SymbolKind::Class);
    assert!(class.location.end_line > class.location.line);
}

#[test]
fn test_call_sites_resolve_across_files() {
    let index = index_project(&sample_project());

    assert!(index.is_referenced("app.core.load_settings"));
    assert!(index.is_referenced("app.core.Pipeline"));
    assert!(index.is_referenced("app.core.Pipeline.run"));
    assert!(index.is_referenced("app.handlers.dispatch"));
    assert!(!index.is_referenced("app.core.orphan_helper"));

    let constructions: Vec<_> = index
        .call_sites()
        .iter()
        .filter(|c| c.name == "Pipeline" && c.kind == CallKind::Construction)
        .collect();
    assert!(!constructions.is_empty());

    let callers: Vec<&str> = index
        .callers_of("app.core.load_settings")
        .into_iter()
        .map(|(caller, _)| caller)
        .collect();
    assert!(callers.iter().any(|c| c.starts_with("app.main")));
}

#[test]
fn test_imports_and_literals() {
    let index = index_project(&sample_project());

    let top_level = index.top_level_imports();
    assert!(top_level.contains("alpha"));
    assert!(top_level.contains("sys"));
    assert!(top_level.contains("app"));
    assert!(!top_level.contains("beta"));

    assert!(index.imports().iter().any(|i| i.relative && i.module.contains("handlers")));
    assert!(index.contains_string_literal("handle_ping"));
    assert!(!index.contains_string_literal("handle_echo"));
}

#[test]
fn test_parse_failures_are_skipped_and_counted() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("good.py"), "def fine():\n    return 1\n").unwrap();
    std::fs::write(dir.path().join("broken.py"), "def broken(:\n    pass\n").unwrap();

    let index = index_project(dir.path());
    let stats = index.stats();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_skipped, 1);
    assert!(index.get("good.fine").is_some());
    assert!(index.skipped_files()[0].path.ends_with("broken.py"));
}

#[test]
fn test_sequential_and_parallel_agree() {
    let root = sample_project();
    let config = Config::default();
    let files = FileFinder::new(&config).find_files(&root).unwrap();

    let mut builder = IndexBuilder::new(&root).unwrap();
    builder.process_files(&files, false);
    let sequential = builder.build();
    let parallel = ParallelIndexBuilder::new(&root).build_from_files(&files);

    let names = |index: &SymbolIndex| -> BTreeSet<String> {
        index.symbols().map(|s| s.qualified_name.clone()).collect()
    };
    assert_eq!(names(&sequential), names(&parallel));
    assert_eq!(sequential.stats().call_sites, parallel.stats().call_sites);
}

#[test]
fn test_stub_files_declare_nothing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let stub = dir.path().join("api.pyi");
    std::fs::write(&stub, "def typed(x: int) -> int: ...\n").unwrap();

    let files = vec![SourceFile::new(stub, FileType::PythonStub)];
    let index = ParallelIndexBuilder::new(dir.path()).build_from_files(&files);
    assert_eq!(index.symbols().count(), 0);
}
