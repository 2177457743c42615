use super::ManifestError;
use crate::config::ManifestConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Distributions whose import name differs from the manifest name
const IMPORT_NAME_TABLE: &[(&str, &[&str])] = &[
    ("beautifulsoup4", &["bs4"]),
    ("pillow", &["PIL"]),
    ("scikit-learn", &["sklearn"]),
    ("scikit-image", &["skimage"]),
    ("pyyaml", &["yaml"]),
    ("python-dateutil", &["dateutil"]),
    ("opencv-python", &["cv2"]),
    ("opencv-python-headless", &["cv2"]),
    ("psycopg2-binary", &["psycopg2"]),
    ("python-dotenv", &["dotenv"]),
    ("protobuf", &["google"]),
    ("google-cloud-storage", &["google"]),
    ("google-api-python-client", &["googleapiclient"]),
    ("pyjwt", &["jwt"]),
    ("pymysql", &["pymysql"]),
    ("mysqlclient", &["MySQLdb"]),
    ("attrs", &["attr", "attrs"]),
    ("msgpack-python", &["msgpack"]),
    ("python-magic", &["magic"]),
    ("python-multipart", &["multipart"]),
    ("pyzmq", &["zmq"]),
    ("pycryptodome", &["Crypto"]),
    ("pyopenssl", &["OpenSSL"]),
    ("dnspython", &["dns"]),
    ("typing-extensions", &["typing_extensions"]),
    ("setuptools", &["setuptools", "pkg_resources"]),
    ("faiss-cpu", &["faiss"]),
    ("tensorflow-gpu", &["tensorflow"]),
    ("djangorestframework", &["rest_framework"]),
    ("django-cors-headers", &["corsheaders"]),
    ("pyserial", &["serial"]),
    ("pyusb", &["usb"]),
];

/// Packages used by tooling rather than imported by project code
const OPTIONAL_PACKAGES: &[&str] = &[
    "pytest",
    "black",
    "flake8",
    "mypy",
    "isort",
    "pylint",
    "ruff",
    "coverage",
    "pre-commit",
    "tox",
    "nox",
    "ipython",
    "ipdb",
    "jupyter",
    "notebook",
    "gunicorn",
    "uvicorn",
    "wheel",
    "setuptools",
    "pip",
    "twine",
    "build",
    "sphinx",
    "bandit",
];

/// A third-party package declared in the manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredPackage {
    /// Normalized name: lowercase, `_` and `.` folded to `-`
    pub name: String,

    /// Name as written in the manifest
    pub raw_name: String,

    pub version_spec: Option<String>,

    pub extras: Vec<String>,

    /// Environment marker after `;`
    pub marker: Option<String>,

    /// Top-level module names this package provides
    pub import_names: Vec<String>,

    /// Tooling or dev-only package
    pub optional: bool,

    /// 0-based indices of the manifest lines declaring it
    pub lines: Vec<usize>,
}

/// Parsed dependency manifest
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub path: PathBuf,

    /// Packages in order of first declaration
    pub packages: Vec<DeclaredPackage>,
}

impl Manifest {
    pub fn load(path: &Path, config: &ManifestConfig) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(path, &contents, config))
    }

    pub fn parse(path: &Path, contents: &str, config: &ManifestConfig) -> Self {
        let mut packages: Vec<DeclaredPackage> = Vec::new();
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();

        for (idx, line) in contents.lines().enumerate() {
            let Some(parsed) = parse_line(line, config) else {
                continue;
            };

            match positions.get(&parsed.name) {
                Some(&pos) => packages[pos].lines.push(idx),
                None => {
                    let import_names = import_names_for(&parsed.name, &config.import_names);
                    let optional = is_optional(&parsed.name, &config.optional_packages);
                    positions.insert(parsed.name.clone(), packages.len());
                    packages.push(DeclaredPackage {
                        name: parsed.name,
                        raw_name: parsed.raw_name,
                        version_spec: parsed.version_spec,
                        extras: parsed.extras,
                        marker: parsed.marker,
                        import_names,
                        optional,
                        lines: vec![idx],
                    });
                }
            }
        }

        debug!("{}: {} declared packages", path.display(), packages.len());
        Self {
            path: path.to_path_buf(),
            packages,
        }
    }

    /// Look up a package by any spelling of its name
    pub fn get(&self, name: &str) -> Option<&DeclaredPackage> {
        let normalized = normalize_name(name);
        self.packages.iter().find(|p| p.name == normalized)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

struct ParsedLine {
    name: String,
    raw_name: String,
    version_spec: Option<String>,
    extras: Vec<String>,
    marker: Option<String>,
}

/// Parse one manifest line. Blank, comment, disabled and option lines yield None.
fn parse_line(line: &str, config: &ManifestConfig) -> Option<ParsedLine> {
    let trimmed = line.trim();
    let disable = config.disable_marker.trim();
    if trimmed.is_empty()
        || (!disable.is_empty() && trimmed.starts_with(disable))
        || trimmed.starts_with(config.comment_marker.as_str())
        || trimmed.starts_with('-')
    {
        return None;
    }

    // Inline comments need leading whitespace
    let inline = format!(" {}", config.comment_marker);
    let without_comment = match trimmed.find(&inline) {
        Some(pos) => trimmed[..pos].trim_end(),
        None => trimmed,
    };

    let (requirement, marker) = match without_comment.split_once(';') {
        Some((req, marker)) => (req.trim(), Some(marker.trim().to_string())),
        None => (without_comment, None),
    };

    let name_end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(requirement.len());
    let raw_name = &requirement[..name_end];
    if raw_name.is_empty() || !raw_name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut rest = requirement[name_end..].trim_start();
    let mut extras = Vec::new();
    if let Some(after) = rest.strip_prefix('[') {
        let close = after.find(']')?;
        extras = after[..close]
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        rest = after[close + 1..].trim_start();
    }

    let version_spec = (!rest.is_empty()).then(|| rest.to_string());

    Some(ParsedLine {
        name: normalize_name(raw_name),
        raw_name: raw_name.to_string(),
        version_spec,
        extras,
        marker: marker.filter(|m| !m.is_empty()),
    })
}

/// Lowercase, with runs of `-`, `_` and `.` folded to a single `-`
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_separator = false;
    for c in name.trim().chars() {
        if c == '-' || c == '_' || c == '.' {
            if !last_was_separator {
                normalized.push('-');
            }
            last_was_separator = true;
        } else {
            normalized.extend(c.to_lowercase());
            last_was_separator = false;
        }
    }
    normalized
}

/// Import names for a normalized package name
pub fn import_names_for(name: &str, extra: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    if let Some((_, names)) = extra.iter().find(|(k, _)| normalize_name(k) == name) {
        return names.clone();
    }
    if let Some((_, names)) = IMPORT_NAME_TABLE.iter().find(|(k, _)| *k == name) {
        return names.iter().map(|n| n.to_string()).collect();
    }
    vec![name.replace('-', "_")]
}

/// Whether a normalized package name is tooling or dev-only
pub fn is_optional(name: &str, extra: &[String]) -> bool {
    if extra.iter().any(|e| normalize_name(e) == name) {
        return true;
    }
    OPTIONAL_PACKAGES.contains(&name)
        || name.starts_with("pytest-")
        || name.starts_with("flake8-")
        || name.starts_with("types-")
        || name.ends_with("-stubs")
}
