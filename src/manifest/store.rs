use super::edit::{disable_lines, enable_lines, write_atomic};
use super::{DeclaredPackage, ManifestError};
use crate::config::ManifestConfig;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Separates the manifest file name from the backup timestamp
pub const BACKUP_INFIX: &str = ".deadweight-backup-";

/// Single-writer access to the dependency manifest
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    disable_marker: String,
    active: bool,
}

impl ManifestStore {
    pub fn new(path: &Path, config: &ManifestConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            disable_marker: config.disable_marker.clone(),
            active: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disable_marker(&self) -> &str {
        &self.disable_marker
    }

    fn io_error(&self, source: std::io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn read(&self) -> Result<String, ManifestError> {
        std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))
    }

    /// Check the manifest is readable and writable and no earlier run left a backup
    pub fn preflight(&self) -> Result<(), ManifestError> {
        std::fs::read(&self.path).map_err(|e| self.io_error(e))?;

        let metadata = std::fs::metadata(&self.path).map_err(|e| self.io_error(e))?;
        if metadata.permissions().readonly() {
            return Err(ManifestError::NotWritable(self.path.clone()));
        }
        OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|_| ManifestError::NotWritable(self.path.clone()))?;

        if let Some(backup) = self.stale_backups()?.into_iter().next() {
            return Err(ManifestError::StaleBackup { backup });
        }
        Ok(())
    }

    /// Backups left next to the manifest by earlier runs
    pub fn stale_backups(&self) -> Result<Vec<PathBuf>, ManifestError> {
        let Some(file_name) = self.path.file_name().map(|n| n.to_string_lossy().to_string())
        else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}{}", file_name, BACKUP_INFIX);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| self.io_error(e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        backups.sort();
        Ok(backups)
    }

    /// Back up the manifest and open a session for mutating it
    pub fn begin(&mut self) -> Result<MutationSession<'_>, ManifestError> {
        if self.active {
            return Err(ManifestError::SessionActive(self.path.clone()));
        }
        if let Some(backup) = self.stale_backups()?.into_iter().next() {
            return Err(ManifestError::StaleBackup { backup });
        }

        let original = std::fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let backup = PathBuf::from(format!("{}{}{}", self.path.display(), BACKUP_INFIX, timestamp));
        write_atomic(&backup, &original).map_err(|source| ManifestError::Io {
            path: backup.clone(),
            source,
        })?;
        debug!("Backed up {} to {}", self.path.display(), backup.display());

        self.active = true;
        Ok(MutationSession {
            store: self,
            backup,
            original,
            disabled: Vec::new(),
            restored: false,
        })
    }
}

/// An open mutation of the manifest.
///
/// Dropping the session restores the manifest. Call [`MutationSession::restore`]
/// explicitly to observe failures.
#[derive(Debug)]
pub struct MutationSession<'a> {
    store: &'a mut ManifestStore,
    backup: PathBuf,
    original: Vec<u8>,
    disabled: Vec<usize>,
    restored: bool,
}

impl<'a> MutationSession<'a> {
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn manifest_path(&self) -> &Path {
        &self.store.path
    }

    /// Comment out every line that declares `package`
    pub fn disable(&mut self, package: &DeclaredPackage) -> Result<(), ManifestError> {
        if package.lines.is_empty() {
            return Err(ManifestError::PackageNotDeclared(package.name.clone()));
        }
        let current = self.store.read()?;
        let updated = disable_lines(&current, &package.lines, &self.store.disable_marker);
        write_atomic(&self.store.path, updated.as_bytes()).map_err(|e| self.store.io_error(e))?;
        self.disabled.extend(&package.lines);
        info!("Disabled '{}' in {}", package.name, self.store.path.display());
        Ok(())
    }

    /// Bring the manifest back to its pre-session bytes and delete the backup
    pub fn restore(&mut self) -> Result<(), ManifestError> {
        if self.restored {
            return Ok(());
        }

        if let Err(e) = self.enable_disabled() {
            warn!("Line-level restore failed ({}), copying backup", e);
        }

        if !self.matches_original() {
            let from_backup = std::fs::read(&self.backup)
                .and_then(|bytes| write_atomic(&self.store.path, &bytes));
            if let Err(e) = from_backup {
                error!("Restoring from {} failed: {}", self.backup.display(), e);
            }
        }

        if !self.matches_original() {
            return Err(ManifestError::RestoreFailed {
                backup: self.backup.clone(),
            });
        }

        if let Err(e) = std::fs::remove_file(&self.backup) {
            warn!("Could not delete backup {}: {}", self.backup.display(), e);
        }
        self.restored = true;
        self.store.active = false;
        debug!("Restored {}", self.store.path.display());
        Ok(())
    }

    fn enable_disabled(&self) -> Result<(), ManifestError> {
        if self.disabled.is_empty() {
            return Ok(());
        }
        let current = self.store.read()?;
        let restored = enable_lines(&current, &self.disabled, &self.store.disable_marker);
        write_atomic(&self.store.path, restored.as_bytes()).map_err(|e| self.store.io_error(e))
    }

    fn matches_original(&self) -> bool {
        std::fs::read(&self.store.path)
            .map(|bytes| bytes == self.original)
            .unwrap_or(false)
    }
}

impl Drop for MutationSession<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.restore() {
                error!("{}", e);
            }
        }
        self.store.active = false;
    }
}
