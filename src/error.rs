//! # Error Taxonomy
//!
//! Only `ManifestUnavailable` (and its packaging-time sibling `RulesUnavailable`) stop a run.
//! Every per-file kind is recovered where it happens: the planner degrades a failed read to
//! `UPDATE`, the executor counts a failed copy and moves on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No plan can be formed. Raised before the target directory is touched.
    #[error("manifest unavailable at {path:?}: {reason}")]
    ManifestUnavailable { path: PathBuf, reason: String },

    /// The ignore-rules document exists but is malformed.
    #[error("ignore rules unavailable at {path:?}: {reason}")]
    RulesUnavailable { path: PathBuf, reason: String },

    /// A file could not be opened or a read failed mid-stream while fingerprinting.
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {path:?}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path:?}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a bundle document failed while packaging.
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Loading or saving the last install directory failed.
    #[error("install record: {reason}")]
    Persistence { reason: String },

    /// Packaging walked the source tree and found nothing to bundle.
    #[error("no files to bundle under {path:?}")]
    EmptySource { path: PathBuf },

    /// The bundle would be written inside the tree being packed, or over it.
    #[error("bundle {out_dir:?} overlaps source tree {source_dir:?}")]
    OverlappingBundle { source_dir: PathBuf, out_dir: PathBuf },
}

pub type Result<T> = std::result::Result<T, SyncError>;
