//! # Manifest
//!
//! The ordered mapping of relative path to expected fingerprint. It is produced once while
//! packaging (`Manifest::build`) and shipped inside the bundle as a JSON object; at install
//! time it is loaded whole and never recomputed.
//!
//! Relative paths always use `/` as separator. Iteration order is the order of the JSON
//! document, which is also the order files are planned, copied, and reported in.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use log::{debug, info, warn};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use walkdir::WalkDir;
use crate::error::{Result, SyncError};
use crate::hash_store::{self, Fingerprint};
use crate::ignore_rules::{IgnoreRuleSet, IgnoreTier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub expected_fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    /// Builds a manifest from `(path, fingerprint)` pairs.
    ///
    /// Paths are normalised to forward slashes. A repeated path keeps its first position and
    /// takes the last fingerprint.
    #[cfg(test)]
    pub fn from_entries<I, P, F>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, F)>,
        P: Into<String>,
        F: Into<String>,
    {
        let mut manifest = Self::default();
        for (path, fingerprint) in pairs {
            manifest.insert(path.into(), fingerprint.into());
        }
        manifest
    }

    fn insert(&mut self, path: String, fingerprint: Fingerprint) {
        let path = path.replace('\\', "/");
        match self.index.get(&path) {
            Some(&i) => {
                warn!("Duplicate manifest path {:?}; keeping the last fingerprint", path);
                self.entries[i].expected_fingerprint = fingerprint;
            }
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push(ManifestEntry { relative_path: path, expected_fingerprint: fingerprint });
            }
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    #[allow(dead_code)]
    pub fn lookup(&self, relative_path: &str) -> Option<&str> {
        self.index
            .get(&relative_path.replace('\\', "/"))
            .map(|&i| self.entries[i].expected_fingerprint.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walks `source_root`, skips ALWAYS-ignored files, and fingerprints the rest.
    ///
    /// The walk is sorted by file name so the same tree always yields the same order. A file
    /// that cannot be fingerprinted is left out with a warning.
    ///
    /// # Errors
    ///
    /// [`SyncError::EmptySource`] when nothing is left to bundle.
    pub fn build(source_root: &Path, rules: &IgnoreRuleSet) -> Result<Self> {
        let mut manifest = Self::default();

        let walker = WalkDir::new(source_root).follow_links(false).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", source_root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative_path) = to_relative(source_root, entry.path()) else {
                continue;
            };

            if rules.matches(&relative_path, IgnoreTier::Always) {
                info!("Ignoring {} (always)", relative_path);
                continue;
            }

            match hash_store::fingerprint(entry.path()) {
                Ok(fp) => {
                    debug!("Added {} ({}...)", relative_path, &fp[..8]);
                    manifest.insert(relative_path, fp);
                }
                Err(e) => warn!("Skipping {}: {}", relative_path, e),
            }
        }

        if manifest.is_empty() {
            return Err(SyncError::EmptySource { path: source_root.to_path_buf() });
        }
        Ok(manifest)
    }

    /// Reads and validates a manifest document.
    ///
    /// # Errors
    ///
    /// [`SyncError::ManifestUnavailable`] when the file cannot be read or [`Manifest::from_json`]
    /// rejects it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::ManifestUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text, path)
    }

    /// Parses a manifest document: a JSON object of relative path to hex fingerprint.
    ///
    /// Rejects documents that are not such an object, that are empty, or that name a path
    /// which would escape the target directory.
    pub fn from_json(text: &str, source: &Path) -> Result<Self> {
        let unavailable = |reason: String| SyncError::ManifestUnavailable { path: source.to_path_buf(), reason };

        let manifest: Manifest = serde_json::from_str(text).map_err(|e| unavailable(e.to_string()))?;
        if manifest.is_empty() {
            return Err(unavailable("manifest lists no files".to_string()));
        }
        for entry in &manifest.entries {
            if !is_safe_relative(&entry.relative_path) {
                return Err(unavailable(format!("unsafe path {:?}", entry.relative_path)));
            }
            if entry.expected_fingerprint.is_empty() {
                return Err(unavailable(format!("empty fingerprint for {:?}", entry.relative_path)));
            }
        }
        Ok(manifest)
    }

    pub fn to_json(&self) -> String {
        // Maps of strings always serialise.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.relative_path, &entry.expected_fingerprint)?;
        }
        map.end()
    }
}

struct ManifestVisitor;

impl<'de> Visitor<'de> for ManifestVisitor {
    type Value = Manifest;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping relative paths to fingerprints")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Manifest, A::Error> {
        let mut manifest = Manifest::default();
        while let Some((path, fingerprint)) = access.next_entry::<String, String>()? {
            manifest.insert(path, fingerprint);
        }
        Ok(manifest)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Joins a manifest path onto a root directory, one `/`-separated component at a time.
pub fn resolve(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .fold(root.to_path_buf(), |acc, c| acc.join(c))
}

/// The `/`-joined path of `path` below `root`, or `None` if it is not below it.
fn to_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

/// Relative, non-empty, and free of `..` or root/drive components.
fn is_safe_relative(relative_path: &str) -> bool {
    if relative_path.is_empty() || relative_path.starts_with('/') {
        return false;
    }
    // A drive prefix such as `C:` would make the join absolute on Windows.
    if relative_path.split('/').next().is_some_and(|first| first.contains(':')) {
        return false;
    }
    Path::new(relative_path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
