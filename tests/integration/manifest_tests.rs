//! Manifest parsing, line editing and backup/restore tests

use deadweight::config::ManifestConfig;
use deadweight::manifest::{
    disable_lines, enable_lines, Manifest, ManifestError, ManifestStore, BACKUP_INFIX,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

const MARKER: &str = "# DISABLED FOR TESTING: ";

fn parse(contents: &str) -> Manifest {
    Manifest::parse(
        Path::new("requirements.txt"),
        contents,
        &ManifestConfig::default(),
    )
}

#[test]
fn test_enable_disable_identity_across_line_endings() {
    let manifests = [
        "alpha==1.0\nbeta==2.0\n",
        "alpha==1.0\r\nbeta==2.0\r\n",
        "alpha==1.0\nbeta==2.0",
        "# header\n\nalpha==1.0 ; python_version >= '3.8'\n-r base.txt\nbeta[extra]>=2\n",
        "",
    ];

    for original in manifests {
        let lines: Vec<usize> = parse(original)
            .packages
            .iter()
            .flat_map(|p| p.lines.iter().copied())
            .collect();
        let disabled = disable_lines(original, &lines, MARKER);
        if !lines.is_empty() {
            assert_ne!(disabled, original);
        }
        assert_eq!(enable_lines(&disabled, &lines, MARKER), original);
    }
}

#[test]
fn test_disabled_line_is_not_a_declaration() {
    let original = "alpha==1.0\nbeta==2.0\n";
    let beta = parse(original).get("beta").cloned().unwrap();
    let disabled = disable_lines(original, &beta.lines, MARKER);

    let reparsed = parse(&disabled);
    assert!(reparsed.get("beta").is_none());
    assert!(reparsed.get("alpha").is_some());
}

#[test]
fn test_name_normalization_lookup() {
    let manifest = parse("Django_Rest.Framework==3.0\nPyYAML>=6\n");
    assert!(manifest.get("django-rest-framework").is_some());
    assert!(manifest.get("Django_Rest_Framework").is_some());
    let yaml = manifest.get("pyyaml").unwrap();
    assert_eq!(yaml.raw_name, "PyYAML");
    assert_eq!(yaml.import_names, vec!["yaml".to_string()]);
}

#[test]
fn test_session_roundtrip_is_byte_exact() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("requirements.txt");
    let original = "alpha==1.0\r\nbeta==2.0\r\n# trailing comment";
    std::fs::write(&path, original).unwrap();

    let beta = Manifest::load(&path, &ManifestConfig::default())
        .unwrap()
        .get("beta")
        .cloned()
        .unwrap();

    let mut store = ManifestStore::new(&path, &ManifestConfig::default());
    {
        let mut session = store.begin().unwrap();
        assert!(session.backup_path().exists());
        assert!(session
            .backup_path()
            .to_string_lossy()
            .contains(BACKUP_INFIX));
        session.disable(&beta).unwrap();
        let mutated = std::fs::read_to_string(&path).unwrap();
        assert!(mutated.contains("# DISABLED FOR TESTING: beta==2.0\r\n"));
        session.restore().unwrap();
    }

    assert_eq!(std::fs::read(&path).unwrap(), original.as_bytes());
    assert!(store.stale_backups().unwrap().is_empty());
}

#[test]
fn test_panic_inside_session_restores() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("requirements.txt");
    let original = "alpha==1.0\nbeta==2.0\n";
    std::fs::write(&path, original).unwrap();
    let alpha = Manifest::load(&path, &ManifestConfig::default())
        .unwrap()
        .get("alpha")
        .cloned()
        .unwrap();

    let mut store = ManifestStore::new(&path, &ManifestConfig::default());
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut session = store.begin().unwrap();
        session.disable(&alpha).unwrap();
        panic!("test suite crashed");
    }));

    assert!(result.is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    // The guard released the store
    assert!(store.begin().is_ok());
}

#[test]
fn test_missing_manifest_fails_preflight() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = ManifestStore::new(&dir.path().join("requirements.txt"), &ManifestConfig::default());
    assert!(matches!(store.preflight(), Err(ManifestError::Io { .. })));
}

#[cfg(unix)]
#[test]
fn test_read_only_manifest_fails_preflight() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("requirements.txt");
    std::fs::write(&path, "alpha==1.0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o444)).unwrap();

    let store = ManifestStore::new(&path, &ManifestConfig::default());
    assert!(matches!(store.preflight(), Err(ManifestError::NotWritable(_))));
}
