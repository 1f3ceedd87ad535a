//! # Install Locator
//!
//! Remembers where the last successful run installed to, and uses that to decide whether the
//! current run is a first install or an update.
//!
//! The record lives behind [`InstallRecordStore`] so the locator never reaches for per-user
//! locations on its own. Production uses [`FileRecordStore`], a one-line text file in the
//! user's home directory; tests use an in-memory store.

use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::{Result, SyncError};
use crate::manifest::{self, Manifest};
use crate::planner::InstallMode;

/// File name of the record inside the user's home directory.
pub const RECORD_FILE_NAME: &str = ".smartinstall_install_path";

/// Persistence for the last install directory.
pub trait InstallRecordStore {
    /// The stored directory, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<PathBuf>>;

    /// Replaces the stored directory.
    fn save(&self, dir: &Path) -> Result<()>;
}

/// Stores the directory as a bare string in a text file.
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.smartinstall_install_path`, if a home directory can be determined.
    pub fn default_location() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(RECORD_FILE_NAME))
    }
}

impl InstallRecordStore for FileRecordStore {
    fn load(&self) -> Result<Option<PathBuf>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let text = text.trim();
                Ok(if text.is_empty() { None } else { Some(PathBuf::from(text)) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Persistence { reason: format!("reading {:?}: {}", self.path, e) }),
        }
    }

    fn save(&self, dir: &Path) -> Result<()> {
        // The format has no quoting, so a path that cannot be written back verbatim is refused.
        let text = dir.to_str().ok_or_else(|| SyncError::Persistence {
            reason: format!("{:?} is not valid UTF-8", dir),
        })?;
        if text.contains(['\n', '\r']) {
            return Err(SyncError::Persistence { reason: format!("{:?} contains a line break", dir) });
        }
        std::fs::write(&self.path, text)
            .map_err(|e| SyncError::Persistence { reason: format!("writing {:?}: {}", self.path, e) })
    }
}

/// What the locator concluded about this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub mode: InstallMode,
    /// The directory to update. `None` on a first install: the caller has to pick one.
    pub target: Option<PathBuf>,
}

pub struct InstallLocator<S: InstallRecordStore> {
    store: S,
}

impl<S: InstallRecordStore> InstallLocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The last install directory. A failed load is reported and treated as "none".
    pub fn load(&self) -> Option<PathBuf> {
        match self.store.load() {
            Ok(path) => path,
            Err(e) => {
                warn!("{}; treating this run as a first install", e);
                None
            }
        }
    }

    /// Records `dir` as the last install directory. Failure is logged and otherwise ignored.
    pub fn save(&self, dir: &Path) {
        match self.store.save(dir) {
            Ok(()) => debug!("Remembered install directory {:?}", dir),
            Err(e) => warn!("Could not remember install directory: {}", e),
        }
    }

    /// Update mode when the stored directory still exists and holds at least one manifest file.
    pub fn detect(&self, manifest: &Manifest) -> Detection {
        if let Some(dir) = self.load() {
            let populated = dir.is_dir()
                && manifest
                    .entries()
                    .iter()
                    .any(|e| manifest::resolve(&dir, &e.relative_path).is_file());
            if populated {
                info!("Found an existing installation at {:?}", dir);
                return Detection { mode: InstallMode::Update, target: Some(dir) };
            }
            debug!("Stored directory {:?} holds no installed files", dir);
        }
        Detection { mode: InstallMode::FirstInstall, target: None }
    }
}

/// In-memory record for tests. `fail` makes every call return a persistence error.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    pub record: std::sync::Mutex<Option<PathBuf>>,
    pub fail: bool,
}

#[cfg(test)]
impl MemoryRecordStore {
    pub fn with_record(dir: &Path) -> Self {
        Self { record: std::sync::Mutex::new(Some(dir.to_path_buf())), fail: false }
    }
}

#[cfg(test)]
impl InstallRecordStore for MemoryRecordStore {
    fn load(&self) -> Result<Option<PathBuf>> {
        if self.fail {
            return Err(SyncError::Persistence { reason: "store unavailable".to_string() });
        }
        Ok(self.record.lock().unwrap().clone())
    }

    fn save(&self, dir: &Path) -> Result<()> {
        if self.fail {
            return Err(SyncError::Persistence { reason: "store unavailable".to_string() });
        }
        *self.record.lock().unwrap() = Some(dir.to_path_buf());
        Ok(())
    }
}
