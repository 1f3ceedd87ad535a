//! # Ignore Rules
//!
//! Two tiers of exclusion patterns decide which bundled files the installer leaves alone:
//!
//! - **ALWAYS** rules apply on every run (first install and update). OS artifacts that slip
//!   into a source tree live here, and the built-in defaults are merged in on every load.
//! - **UPDATE_ONLY** rules apply only when updating an existing installation, so files a user
//!   is expected to edit are installed fresh once and then preserved.
//!
//! A path matches a rule when, after normalising both to forward slashes, the rule matches it
//! as a shell glob, or the rule ends in `/` and the path starts with the rule minus that
//! slash, or the two strings are equal. Matching is a pure function of the strings; nothing
//! here touches the filesystem. Like `fnmatch`, matching ignores case on Windows and respects
//! it elsewhere.

use std::fmt;
use std::path::Path;
use glob::{MatchOptions, Pattern};
use log::warn;
use serde::{Deserialize, Serialize};
use crate::error::{Result, SyncError};

/// OS metadata files that are never installed, at the root or at any depth.
pub const DEFAULT_ALWAYS: &[&str] = &[
    ".DS_Store",     // macOS
    "*/.DS_Store",
    "Thumbs.db",     // Windows
    "*/Thumbs.db",
    "desktop.ini",   // Windows
    "*/desktop.ini",
];

/// `*` crosses `/` and a leading dot needs no literal match, like a plain shell `fnmatch`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: !cfg!(windows),
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreTier {
    Always,
    UpdateOnly,
}

impl fmt::Display for IgnoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreTier::Always => write!(f, "always"),
            IgnoreTier::UpdateOnly => write!(f, "update-only"),
        }
    }
}

/// A single glob-style pattern tagged with the tier it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRule {
    pub pattern: String,
    pub tier: IgnoreTier,
}

/// The JSON shape shipped inside a bundle. Both tiers must be present, even when empty.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesDocument {
    always: Vec<String>,
    update: Vec<String>,
}

/// A rule with its glob compiled once up front.
#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    glob: Option<Pattern>,
}

impl CompiledRule {
    fn new(pattern: &str) -> Self {
        let pattern = normalize(pattern);
        let glob = match Pattern::new(&pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignore rule {:?} is not a valid glob ({}); using prefix/exact matching only", pattern, e);
                None
            }
        };
        Self { pattern, glob }
    }

    fn matches(&self, normalized_path: &str) -> bool {
        if let Some(glob) = &self.glob {
            if glob.matches_with(normalized_path, MATCH_OPTIONS) {
                return true;
            }
        }
        if self.pattern.ends_with('/') && normalized_path.starts_with(self.pattern.trim_end_matches('/')) {
            return true;
        }
        normalized_path == self.pattern
    }
}

/// The loaded, read-only rule set. Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    always: Vec<CompiledRule>,
    update: Vec<CompiledRule>,
}

impl IgnoreRuleSet {
    /// Builds a rule set from explicit tier lists, merging the built-in defaults into ALWAYS.
    pub fn new<A, U>(always: A, update: U) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        let mut set = Self {
            always: always.into_iter().map(|p| CompiledRule::new(p.as_ref())).collect(),
            update: update.into_iter().map(|p| CompiledRule::new(p.as_ref())).collect(),
        };
        set.merge_defaults();
        set
    }

    fn merge_defaults(&mut self) {
        for default in DEFAULT_ALWAYS {
            if !self.always.iter().any(|r| r.pattern == *default) {
                self.always.push(CompiledRule::new(default));
            }
        }
    }

    /// Parses an `.installignore`-style rule source.
    ///
    /// Blank lines and `#` comments are skipped. `ALWAYS:` and `UPDATE:` prefixes pick the tier;
    /// untagged lines are ALWAYS rules.
    pub fn parse_rule_source(text: &str) -> Self {
        let mut always = Vec::new();
        let mut update = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("ALWAYS:") {
                always.push(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("UPDATE:") {
                update.push(rest.trim().to_string());
            } else {
                always.push(line.to_string());
            }
        }

        Self::new(always, update)
    }

    /// Parses the bundled `{"always": [...], "update": [...]}` document.
    ///
    /// # Errors
    ///
    /// [`SyncError::RulesUnavailable`] when the text is not JSON of exactly that shape: a missing
    /// or misspelled tier is rejected rather than read as empty. `source` only labels the error.
    pub fn from_json(text: &str, source: &Path) -> Result<Self> {
        let doc: RulesDocument = serde_json::from_str(text).map_err(|e| SyncError::RulesUnavailable {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(doc.always, doc.update))
    }

    pub fn to_json(&self) -> String {
        let doc = RulesDocument {
            always: self.patterns(IgnoreTier::Always).map(str::to_string).collect(),
            update: self.patterns(IgnoreTier::UpdateOnly).map(str::to_string).collect(),
        };
        // A struct of string vectors always serialises.
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    }

    /// True when any rule of `tier` matches `relative_path`.
    pub fn matches(&self, relative_path: &str, tier: IgnoreTier) -> bool {
        let path = normalize(relative_path);
        self.tier_rules(tier).iter().any(|r| r.matches(&path))
    }

    /// The normalised patterns of one tier, in load order.
    pub fn patterns(&self, tier: IgnoreTier) -> impl Iterator<Item = &str> {
        self.tier_rules(tier).iter().map(|r| r.pattern.as_str())
    }

    /// Every rule of both tiers, ALWAYS first.
    pub fn rules(&self) -> Vec<IgnoreRule> {
        let mut out = Vec::with_capacity(self.always.len() + self.update.len());
        for tier in [IgnoreTier::Always, IgnoreTier::UpdateOnly] {
            out.extend(
                self.tier_rules(tier)
                    .iter()
                    .map(|r| IgnoreRule { pattern: r.pattern.clone(), tier }),
            );
        }
        out
    }

    fn tier_rules(&self, tier: IgnoreTier) -> &[CompiledRule] {
        match tier {
            IgnoreTier::Always => &self.always,
            IgnoreTier::UpdateOnly => &self.update,
        }
    }
}

/// Matches one path against one pattern with the same semantics as [`IgnoreRuleSet::matches`].
#[cfg(test)]
pub fn rule_matches(relative_path: &str, pattern: &str) -> bool {
    CompiledRule::new(pattern).matches(&normalize(relative_path))
}

fn normalize(s: &str) -> String {
    s.replace('\\', "/")
}
