//! # Sync Executor
//!
//! Applies a [`SyncPlan`]: every `Install` or `Update` entry is copied from the bundle's
//! source tree into the target directory, parent directories first, overwriting whatever is
//! there and carrying over the source modification time.
//!
//! Entries are independent. A failed copy is logged and counted, and the run moves on to the
//! next entry. Interrupting the process mid-run can leave the target partially updated; no
//! rollback is attempted.

use std::path::Path;
use filetime::FileTime;
use log::{error, info, warn};
use crate::error::{Result, SyncError};
use crate::invariant_ppt::assert_invariant;
use crate::manifest;
use crate::planner::{FileDecision, SyncPlan};

/// Aggregate outcome of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub installed: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub ignored: usize,
    /// Scheduled copies that did not complete.
    pub failed: usize,
}

impl SyncReport {
    /// True when at least one file landed in the target.
    pub fn changed_anything(&self) -> bool {
        self.installed + self.updated > 0
    }
}

/// Copies every scheduled entry of `plan` from `source_root` into `target_dir`.
pub fn execute(plan: &SyncPlan, source_root: &Path, target_dir: &Path) -> SyncReport {
    let mut report = SyncReport {
        up_to_date: plan.count(FileDecision::SkipUpToDate),
        ignored: plan.count(FileDecision::SkipIgnored),
        ..Default::default()
    };

    for file in plan.scheduled() {
        let rel = &file.entry.relative_path;
        let src = manifest::resolve(source_root, rel);
        let dest = manifest::resolve(target_dir, rel);

        match copy_entry(&src, &dest) {
            Ok(()) => match file.decision {
                FileDecision::Install => {
                    info!("✓ Installed {}", rel);
                    report.installed += 1;
                }
                _ => {
                    info!("✓ Updated {}", rel);
                    report.updated += 1;
                }
            },
            Err(e) => {
                error!("✗ {}: {}", rel, e);
                report.failed += 1;
            }
        }
    }

    let scheduled = plan.scheduled().count();
    assert_invariant(
        report.installed + report.updated + report.failed == scheduled,
        "Executor counts never exceed scheduled copies",
        Some("Executor"),
    );

    report
}

/// Copies one file, creating the destination's parent chain first.
fn copy_entry(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_file() {
        return Err(SyncError::Copy {
            path: src.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file missing from bundle"),
        });
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SyncError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::copy(src, dest).map_err(|source| SyncError::Copy { path: dest.to_path_buf(), source })?;

    // Content is already in place; a lost timestamp is not worth failing the entry over.
    match std::fs::metadata(src) {
        Ok(meta) => {
            let mtime = FileTime::from_last_modification_time(&meta);
            if let Err(e) = filetime::set_file_mtime(dest, mtime) {
                warn!("Could not preserve modification time on {:?}: {}", dest, e);
            }
        }
        Err(e) => warn!("Could not read metadata of {:?}: {}", src, e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_store::fingerprint_bytes;
    use crate::ignore_rules::IgnoreRuleSet;
    use crate::invariant_ppt::contract_test;
    use crate::manifest::Manifest;
    use crate::planner::{self, InstallMode};
    use proptest::prelude::*;
    use std::path::PathBuf;

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        source: PathBuf,
        target: PathBuf,
        manifest: Manifest,
        rules: IgnoreRuleSet,
    }

    fn fixture(files: &[(&str, &str)], always: &[&str], update: &[&str]) -> Fixture {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let p = manifest::resolve(source_dir.path(), rel);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, content).unwrap();
        }
        let manifest = Manifest::from_entries(files.iter().map(|(rel, content)| (*rel, fingerprint_bytes(content.as_bytes()))));
        Fixture {
            source: source_dir.path().to_path_buf(),
            target: target_dir.path().to_path_buf(),
            _dirs: (source_dir, target_dir),
            manifest,
            rules: IgnoreRuleSet::new(always.iter().copied(), update.iter().copied()),
        }
    }

    impl Fixture {
        fn run(&self, mode: InstallMode) -> SyncReport {
            let plan = planner::plan(&self.manifest, &self.rules, &self.target, mode).unwrap();
            execute(&plan, &self.source, &self.target)
        }
    }

    #[test]
    fn first_install_copies_everything() {
        let fx = fixture(&[("a.txt", "alpha"), ("sub/b.txt", "beta")], &["*.tmp"], &["sub/"]);

        let report = fx.run(InstallMode::FirstInstall);

        assert_eq!((report.installed, report.updated, report.failed), (2, 0, 0));
        assert_eq!(std::fs::read_to_string(fx.target.join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(fx.target.join("sub").join("b.txt")).unwrap(), "beta");
    }

    #[test]
    fn update_respects_update_only_rules() {
        let fx = fixture(&[("a.txt", "alpha"), ("sub/b.txt", "beta")], &["*.tmp"], &["sub/"]);
        fx.run(InstallMode::FirstInstall);
        std::fs::write(fx.target.join("sub").join("b.txt"), "user edited").unwrap();

        let report = fx.run(InstallMode::Update);

        assert_eq!((report.installed, report.updated), (0, 0));
        assert_eq!(report.up_to_date, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(std::fs::read_to_string(fx.target.join("sub").join("b.txt")).unwrap(), "user edited");
    }

    #[test]
    fn changed_file_is_overwritten() {
        let fx = fixture(&[("a.txt", "alpha")], &[], &[]);
        std::fs::write(fx.target.join("a.txt"), "stale").unwrap();

        let report = fx.run(InstallMode::Update);

        assert_eq!(report.updated, 1);
        assert_eq!(std::fs::read_to_string(fx.target.join("a.txt")).unwrap(), "alpha");
    }

    #[test]
    fn missing_source_file_counts_as_failure() {
        let fx = fixture(&[("a.txt", "alpha"), ("b.txt", "beta")], &[], &[]);
        std::fs::remove_file(fx.source.join("a.txt")).unwrap();

        let report = fx.run(InstallMode::FirstInstall);

        assert_eq!((report.installed, report.failed), (1, 1));
        assert!(fx.target.join("b.txt").is_file());
    }

    #[test]
    fn one_failure_does_not_block_the_rest() {
        let fx = fixture(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")], &[], &[]);
        // Unreadable for the planner, uncopyable for the executor.
        std::fs::create_dir_all(fx.target.join("b.txt")).unwrap();

        let report = fx.run(InstallMode::FirstInstall);

        assert_eq!((report.installed, report.updated, report.failed), (2, 0, 1));
        assert!(fx.target.join("a.txt").is_file());
        assert!(fx.target.join("c.txt").is_file());
    }

    #[test]
    fn blocked_parent_directory_is_a_per_file_failure() {
        let fx = fixture(&[("sub/b.txt", "beta"), ("a.txt", "alpha")], &[], &[]);
        std::fs::write(fx.target.join("sub"), "a file where a directory belongs").unwrap();

        let report = fx.run(InstallMode::FirstInstall);

        assert_eq!((report.installed, report.failed), (1, 1));
        assert!(fx.target.join("a.txt").is_file());
    }

    #[test]
    fn modification_time_is_preserved() {
        let fx = fixture(&[("a.txt", "alpha")], &[], &[]);
        let old = FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(fx.source.join("a.txt"), old).unwrap();

        fx.run(InstallMode::FirstInstall);

        let meta = std::fs::metadata(fx.target.join("a.txt")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn executor_checks_its_invariant() {
        let fx = fixture(&[("a.txt", "alpha")], &[], &[]);
        fx.run(InstallMode::FirstInstall);
        contract_test("executor", &["Executor counts never exceed scheduled copies"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn second_run_is_a_no_op(
            contents in prop::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6})?", "[ -~]{0,40}", 1..6),
        ) {
            let files: Vec<(String, String)> = contents
                .into_iter()
                .map(|(path, content)| (format!("{}.dat", path), content))
                .collect();
            let borrowed: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
            let fx = fixture(&borrowed, &[], &[]);

            let first = fx.run(InstallMode::FirstInstall);
            prop_assert_eq!(first.installed, files.len());

            let plan = planner::plan(&fx.manifest, &fx.rules, &fx.target, InstallMode::Update).unwrap();
            prop_assert_eq!(plan.scheduled().count(), 0);
            prop_assert_eq!(plan.count(FileDecision::SkipUpToDate), files.len());
        }
    }
}
