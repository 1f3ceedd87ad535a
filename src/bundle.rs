//! # Bundle
//!
//! The on-disk layout the installer ships with, and the packaging step that produces it:
//!
//! ```text
//! bundle/
//! ├── source_files/        the tree to install
//! ├── file_manifest.json   relative path -> fingerprint
//! └── ignore_rules.json    {"always": [...], "update": [...]}
//! ```
//!
//! The bundle is only ever read at install time.

use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::{Result, SyncError};
use crate::ignore_rules::{IgnoreRuleSet, IgnoreTier};
use crate::manifest::{self, Manifest};

pub const SOURCE_DIR_NAME: &str = "source_files";
pub const MANIFEST_FILE_NAME: &str = "file_manifest.json";
pub const RULES_FILE_NAME: &str = "ignore_rules.json";
/// Rule source read by `pack` when none is given.
pub const RULE_SOURCE_FILE_NAME: &str = ".installignore";
pub const DEFAULT_BUNDLE_DIR: &str = "bundle";

#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
}

impl Bundle {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `bundle/` beside the running executable, or `./bundle` when that does not exist.
    pub fn default_location() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_BUNDLE_DIR)))
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUNDLE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join(SOURCE_DIR_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.root.join(RULES_FILE_NAME)
    }

    /// # Errors
    ///
    /// [`SyncError::ManifestUnavailable`] if the document is missing, malformed, or empty.
    pub fn load_manifest(&self) -> Result<Manifest> {
        let manifest = Manifest::load(&self.manifest_path())?;
        debug!("Loaded manifest with {} entries", manifest.len());
        Ok(manifest)
    }

    /// Loads the bundled rules. A bundle without a rules document gets the built-in defaults.
    ///
    /// # Errors
    ///
    /// [`SyncError::RulesUnavailable`] if the document exists but cannot be read or parsed.
    pub fn load_rules(&self) -> Result<IgnoreRuleSet> {
        let path = self.rules_path();
        let rules = match std::fs::read_to_string(&path) {
            Ok(text) => IgnoreRuleSet::from_json(&text, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No {} in bundle; using built-in ignore rules only", RULES_FILE_NAME);
                IgnoreRuleSet::new(Vec::<String>::new(), Vec::<String>::new())
            }
            Err(e) => return Err(SyncError::RulesUnavailable { path, reason: e.to_string() }),
        };
        debug!(
            "Ignore rules: always={:?}, update={:?}",
            rules.patterns(IgnoreTier::Always).collect::<Vec<_>>(),
            rules.patterns(IgnoreTier::UpdateOnly).collect::<Vec<_>>()
        );
        Ok(rules)
    }
}

/// Reads an `.installignore`-style rule source. A missing file means defaults only.
pub fn load_rule_source(path: &Path) -> Result<IgnoreRuleSet> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(IgnoreRuleSet::parse_rule_source(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No rule source at {:?}; using built-in ignore rules only", path);
            Ok(IgnoreRuleSet::new(Vec::<String>::new(), Vec::<String>::new()))
        }
        Err(e) => Err(SyncError::RulesUnavailable { path: path.to_path_buf(), reason: e.to_string() }),
    }
}

/// Packages `source` into a bundle at `out`.
///
/// Builds the manifest (skipping ALWAYS-ignored files), replaces `out/source_files` with a copy
/// of exactly the manifest's files, and writes both JSON documents. Any failure aborts: a
/// bundle missing a file it lists is not shipped.
///
/// # Errors
///
/// [`SyncError::OverlappingBundle`] before anything is read or written when `out` lies inside
/// `source`, or `source` lies inside the `out/source_files` that packing replaces.
pub fn pack(source: &Path, out: &Path, rules: &IgnoreRuleSet) -> Result<Manifest> {
    check_layout(source, out)?;
    for rule in rules.rules() {
        debug!("Rule {:?} ({})", rule.pattern, rule.tier);
    }
    let manifest = Manifest::build(source, rules)?;
    let bundle = Bundle::open(out);
    let source_root = bundle.source_root();

    if source_root.exists() {
        debug!("Clearing previous bundle contents at {:?}", source_root);
        std::fs::remove_dir_all(&source_root)
            .map_err(|e| SyncError::Write { path: source_root.clone(), source: e })?;
    }

    for entry in manifest.entries() {
        let from = manifest::resolve(source, &entry.relative_path);
        let to = manifest::resolve(&source_root, &entry.relative_path);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::DirectoryCreate { path: parent.to_path_buf(), source: e })?;
        }
        std::fs::copy(&from, &to).map_err(|e| SyncError::Copy { path: from.clone(), source: e })?;
        info!("✓ Added {} ({}...)", entry.relative_path, &entry.expected_fingerprint[..8.min(entry.expected_fingerprint.len())]);
    }

    write_document(&bundle.manifest_path(), &manifest.to_json())?;
    write_document(&bundle.rules_path(), &rules.to_json())?;

    info!("Packed {} files into {:?}", manifest.len(), out);
    Ok(manifest)
}

fn check_layout(source: &Path, out: &Path) -> Result<()> {
    let source_dir = comparable(source);
    let out_dir = comparable(out);
    if out_dir.starts_with(&source_dir) || source_dir.starts_with(out_dir.join(SOURCE_DIR_NAME)) {
        return Err(SyncError::OverlappingBundle { source_dir, out_dir });
    }
    Ok(())
}

/// Canonicalises the deepest existing ancestor of `path` and re-appends the rest, so an `out`
/// that does not exist yet still compares against a canonical `source`.
fn comparable(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    for ancestor in absolute.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            return match absolute.strip_prefix(ancestor) {
                Ok(rest) => canonical.join(rest),
                Err(_) => canonical,
            };
        }
    }
    absolute
}

fn write_document(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| SyncError::Write { path: path.to_path_buf(), source: e })
}
