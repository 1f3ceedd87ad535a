//! # Sync Planner
//!
//! Decides, per manifest entry and in manifest order, what the installer does with a file:
//!
//! 1.  **ALWAYS rule matches** -> `SkipIgnored`, whatever the mode or the target holds.
//! 2.  **Update mode and an UPDATE_ONLY rule matches** -> `SkipIgnored`.
//! 3.  **Target file exists**: fingerprint it. Equal to the manifest -> `SkipUpToDate`,
//!     different or unreadable -> `Update`.
//! 4.  **Target file missing** -> `Install`.
//!
//! Ignore rules are evaluated before the target is even looked at, and comparison is by
//! content, never by timestamp, so re-running against a synced directory schedules nothing.
//! Planning never writes to the target.

use std::fmt;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::{Result, SyncError};
use crate::hash_store;
use crate::ignore_rules::{IgnoreRuleSet, IgnoreTier};
use crate::invariant_ppt::assert_invariant;
use crate::manifest::{self, Manifest, ManifestEntry};

/// Whether a previous installation is being refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    FirstInstall,
    Update,
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMode::FirstInstall => write!(f, "install"),
            InstallMode::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    SkipIgnored,
    SkipUpToDate,
    Install,
    Update,
}

impl FileDecision {
    /// True for the decisions that copy bytes into the target.
    pub fn is_scheduled(self) -> bool {
        matches!(self, FileDecision::Install | FileDecision::Update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub entry: ManifestEntry,
    pub decision: FileDecision,
    /// The tier that caused a `SkipIgnored` decision.
    pub ignored_by: Option<IgnoreTier>,
}

/// The per-file decisions of one run, in manifest order.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub mode: InstallMode,
    pub target_dir: PathBuf,
    pub files: Vec<PlannedFile>,
}

impl SyncPlan {
    pub fn count(&self, decision: FileDecision) -> usize {
        self.files.iter().filter(|f| f.decision == decision).count()
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &PlannedFile> {
        self.files.iter().filter(|f| f.decision.is_scheduled())
    }

    #[cfg(test)]
    pub fn decision_for(&self, relative_path: &str) -> Option<FileDecision> {
        self.files
            .iter()
            .find(|f| f.entry.relative_path == relative_path)
            .map(|f| f.decision)
    }
}

/// Stands in for the manifest's location when an already-loaded manifest turns out empty.
const EMPTY_MANIFEST_LABEL: &str = "<manifest>";

/// Computes the plan for bringing `target_dir` in line with `manifest`.
///
/// # Errors
///
/// [`SyncError::ManifestUnavailable`] when the manifest is empty: nothing can be installed.
/// Per-file problems never fail planning.
pub fn plan(manifest: &Manifest, rules: &IgnoreRuleSet, target_dir: &Path, mode: InstallMode) -> Result<SyncPlan> {
    if manifest.is_empty() {
        return Err(SyncError::ManifestUnavailable {
            path: PathBuf::from(EMPTY_MANIFEST_LABEL),
            reason: "manifest lists no files".to_string(),
        });
    }

    let files: Vec<PlannedFile> = manifest
        .entries()
        .iter()
        .map(|entry| {
            let (decision, ignored_by) = decide(entry, rules, target_dir, mode);
            debug!("{} -> {:?}", entry.relative_path, decision);
            PlannedFile { entry: entry.clone(), decision, ignored_by }
        })
        .collect();

    assert_invariant(files.len() == manifest.len(), "Every manifest entry receives exactly one decision", Some("Planner"));
    assert_invariant(
        files
            .iter()
            .filter(|f| f.decision.is_scheduled())
            .all(|f| !rules.matches(&f.entry.relative_path, IgnoreTier::Always)),
        "ALWAYS-ignored entries are never scheduled for copy",
        Some("Planner"),
    );

    Ok(SyncPlan { mode, target_dir: target_dir.to_path_buf(), files })
}

/// The decision for a single entry. Returns the ignoring tier alongside `SkipIgnored`.
pub fn decide(
    entry: &ManifestEntry,
    rules: &IgnoreRuleSet,
    target_dir: &Path,
    mode: InstallMode,
) -> (FileDecision, Option<IgnoreTier>) {
    let path = &entry.relative_path;

    if rules.matches(path, IgnoreTier::Always) {
        info!("Ignoring {} (always)", path);
        return (FileDecision::SkipIgnored, Some(IgnoreTier::Always));
    }
    if mode == InstallMode::Update && rules.matches(path, IgnoreTier::UpdateOnly) {
        info!("Ignoring {} (update-only)", path);
        return (FileDecision::SkipIgnored, Some(IgnoreTier::UpdateOnly));
    }

    let dest = manifest::resolve(target_dir, path);
    if !dest.exists() {
        return (FileDecision::Install, None);
    }

    match hash_store::fingerprint(&dest) {
        Ok(actual) if actual == entry.expected_fingerprint => (FileDecision::SkipUpToDate, None),
        Ok(_) => (FileDecision::Update, None),
        Err(e) => {
            warn!("Could not fingerprint {} ({}); scheduling an update", path, e);
            (FileDecision::Update, None)
        }
    }
}
