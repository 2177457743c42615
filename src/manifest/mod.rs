//! Dependency manifest handling.
//!
//! Every read and write of the on-disk manifest goes through
//! [`ManifestStore`]; mutation happens only inside a [`MutationSession`],
//! which owns a timestamped backup and restores the manifest when dropped.

mod edit;
mod requirements;
mod store;

pub use edit::{disable_lines, enable_lines, write_atomic};
pub use requirements::{import_names_for, is_optional, normalize_name, DeclaredPackage, Manifest};
pub use store::{ManifestStore, MutationSession, BACKUP_INFIX};

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ManifestError {
    #[error("failed to access manifest {path}: {source}")]
    #[diagnostic(code(deadweight::manifest::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {0} is not writable")]
    #[diagnostic(
        code(deadweight::manifest::read_only),
        help("verification edits the manifest in place; check file permissions")
    )]
    NotWritable(PathBuf),

    #[error("a mutation session is already active for {0}")]
    #[diagnostic(code(deadweight::manifest::session_active))]
    SessionActive(PathBuf),

    #[error("stale manifest backup found at {backup}")]
    #[diagnostic(
        code(deadweight::manifest::stale_backup),
        help("an earlier run did not finish; compare the backup with the manifest, restore it if needed, then delete it")
    )]
    StaleBackup { backup: PathBuf },

    #[error("package '{0}' is not declared in the manifest")]
    #[diagnostic(code(deadweight::manifest::unknown_package))]
    PackageNotDeclared(String),

    #[error("manifest could not be restored; original content is kept at {backup}")]
    #[diagnostic(
        code(deadweight::manifest::restore_failed),
        help("copy the backup over the manifest before running anything else")
    )]
    RestoreFailed { backup: PathBuf },
}
