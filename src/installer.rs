//! # Installer Logic
//!
//! Orchestrates one run end to end:
//! 1. Load the bundle's manifest and ignore rules (`run_install`). A missing manifest stops
//!    the run before the target is touched.
//! 2. Ask the [`InstallLocator`] whether this is an update, confirm it or pick a target.
//! 3. Plan, copy, remember the directory, and report.
//! 4. Optionally open the target and schedule removal of the installer.
//!
//! `run_plan_preview` does steps 1-3 without copying anything, for `--dry-run` style audits.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result, bail};
use log::{info, warn};
use crate::bundle::Bundle;
use crate::executor::{self, SyncReport};
use crate::locator::{InstallLocator, InstallRecordStore};
use crate::planner::{self, FileDecision, InstallMode, SyncPlan};
use crate::system::SystemOps;

/// Knobs for a run, as parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install here instead of prompting.
    pub target: Option<PathBuf>,
    /// Skip the confirmation before an update.
    pub assume_yes: bool,
    /// Treat the run as an update even if no installation was detected.
    pub force_update: bool,
    pub open_when_done: bool,
    /// Executable to delete after a run that changed something.
    pub self_remove: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// The path prompt was cancelled. Nothing was touched.
    Cancelled,
    /// The user said no to updating. Nothing was touched.
    Declined,
}

/// Where to sync and in which mode, or why not.
enum Resolution {
    Proceed(PathBuf, InstallMode),
    Stop(RunOutcome),
}

/// Installs or updates from `bundle`.
///
/// # Returns
///
/// The outcome of the run. Per-file failures are inside the report; only fatal conditions
/// (unusable manifest or rules, a target that cannot be created) are errors.
pub fn run_install<S: InstallRecordStore>(
    bundle: &Bundle,
    locator: &InstallLocator<S>,
    system: &impl SystemOps,
    options: &InstallOptions,
) -> Result<RunOutcome> {
    let manifest = bundle
        .load_manifest()
        .with_context(|| format!("Cannot install from bundle {:?}", bundle.root()))?;
    let rules = bundle.load_rules()?;

    let (target, mode) = match resolve_target(locator, system, options, &manifest)? {
        Resolution::Proceed(target, mode) => (target, mode),
        Resolution::Stop(outcome) => return Ok(outcome),
    };

    info!("Target directory: {:?}", target);
    info!("Operation: {}", mode);

    let plan = planner::plan(&manifest, &rules, &target, mode)?;
    let report = executor::execute(&plan, &bundle.source_root(), &target);

    locator.save(&target);

    info!(
        "Done: {} installed, {} updated, {} errors",
        report.installed, report.updated, report.failed
    );
    system.present_summary(&render_summary(&report, &target, mode));

    if report.changed_anything() {
        if let Some(exe) = &options.self_remove {
            if let Err(e) = system.schedule_self_removal(exe) {
                warn!("Could not schedule installer removal: {:#}", e);
            }
        }
    } else {
        info!("Nothing needed installing or updating");
    }

    if options.open_when_done {
        if let Err(e) = system.open_directory(&target) {
            warn!("Could not open {:?}: {:#}", target, e);
        }
    }

    Ok(RunOutcome::Completed(report))
}

fn resolve_target<S: InstallRecordStore>(
    locator: &InstallLocator<S>,
    system: &impl SystemOps,
    options: &InstallOptions,
    manifest: &crate::manifest::Manifest,
) -> Result<Resolution> {
    let detection = locator.detect(manifest);
    let requested = options.target.as_deref().map(absolute_target).transpose()?;

    if options.force_update {
        let target = match requested.or(detection.target) {
            Some(t) => t,
            None => bail!("--force-update needs --target when no previous installation is recorded"),
        };
        return Ok(Resolution::Proceed(target, InstallMode::Update));
    }

    if let (InstallMode::Update, Some(found)) = (detection.mode, detection.target) {
        let explicit_elsewhere = requested.as_ref().is_some_and(|t| t != &found);
        if !explicit_elsewhere {
            info!("Existing installation detected; updating");
            if !options.assume_yes && !system.confirm_update(&found) {
                info!("Update declined");
                return Ok(Resolution::Stop(RunOutcome::Declined));
            }
            return Ok(Resolution::Proceed(found, InstallMode::Update));
        }
    }

    info!("First installation");
    let target = match requested {
        Some(t) => t,
        None => {
            let default = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            match system.select_install_path(&default) {
                Some(t) => t,
                None => {
                    info!("Installation cancelled");
                    return Ok(Resolution::Stop(RunOutcome::Cancelled));
                }
            }
        }
    };

    std::fs::create_dir_all(&target)
        .with_context(|| format!("Cannot create install directory {:?}", target))?;
    Ok(Resolution::Proceed(absolute_target(&target)?, InstallMode::FirstInstall))
}

/// Anchors `target` to the current directory so the saved record means the same place from
/// any later working directory.
fn absolute_target(target: &Path) -> Result<PathBuf> {
    std::path::absolute(target).with_context(|| format!("Cannot resolve install directory {:?}", target))
}

/// Computes what a run would do, without copying anything.
///
/// The target is `target` or the recorded installation. Update mode applies when `update` is
/// set or when the target is the detected installation.
pub fn run_plan_preview<S: InstallRecordStore>(
    bundle: &Bundle,
    locator: &InstallLocator<S>,
    target: Option<&Path>,
    update: bool,
) -> Result<SyncPlan> {
    let manifest = bundle
        .load_manifest()
        .with_context(|| format!("Cannot read bundle {:?}", bundle.root()))?;
    let rules = bundle.load_rules()?;
    let detection = locator.detect(&manifest);

    let requested = target.map(absolute_target).transpose()?;
    let target = match requested.or_else(|| detection.target.clone()) {
        Some(t) => t,
        None => bail!("No previous installation recorded; pass --target to preview one"),
    };
    let detected_here = detection.mode == InstallMode::Update && detection.target.as_deref() == Some(target.as_path());
    let mode = if update || detected_here { InstallMode::Update } else { InstallMode::FirstInstall };

    Ok(planner::plan(&manifest, &rules, &target, mode)?)
}

/// The end-of-run report shown to the user.
pub fn render_summary(report: &SyncReport, target: &Path, mode: InstallMode) -> String {
    let title = match mode {
        InstallMode::FirstInstall => "Installation Complete",
        InstallMode::Update => "Update Complete",
    };
    let mut out = String::new();
    out.push_str("═══════════════════════════════════════════════════════════════\n");
    out.push_str(&format!("                   {}\n", title));
    out.push_str("═══════════════════════════════════════════════════════════════\n");
    out.push_str(&format!("  Target:      {}\n", target.display()));
    out.push_str(&format!("  Installed:   {}\n", report.installed));
    out.push_str(&format!("  Updated:     {}\n", report.updated));
    out.push_str(&format!("  Up to date:  {}\n", report.up_to_date));
    out.push_str(&format!("  Ignored:     {}\n", report.ignored));
    out.push_str(&format!("  Errors:      {}\n", report.failed));
    if report.failed > 0 {
        out.push_str("\n  Some files could not be written; see the log above.\n");
    }
    out
}

/// The per-file listing printed by `plan`.
pub fn render_plan(plan: &SyncPlan) -> String {
    let mut out = String::new();
    out.push_str("═══════════════════════════════════════════════════════════════\n");
    out.push_str("                 What The Installer Will Do\n");
    out.push_str("═══════════════════════════════════════════════════════════════\n");
    out.push_str(&format!("  Target: {}\n", plan.target_dir.display()));
    out.push_str(&format!("  Mode:   {}\n\n", plan.mode));

    for file in &plan.files {
        let line = match (file.decision, file.ignored_by) {
            (FileDecision::Install, _) => format!("    + {}", file.entry.relative_path),
            (FileDecision::Update, _) => format!("    ~ {}", file.entry.relative_path),
            (FileDecision::SkipUpToDate, _) => format!("    = {}", file.entry.relative_path),
            (FileDecision::SkipIgnored, Some(tier)) => format!("    - {} (ignored: {})", file.entry.relative_path, tier),
            (FileDecision::SkipIgnored, None) => format!("    - {} (ignored)", file.entry.relative_path),
        };
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str("───────────────────────────────────────────────────────────────\n");
    let scheduled = plan.scheduled().count();
    if scheduled == 0 {
        out.push_str("✓ Nothing to do! The target is already up to date.\n");
    } else {
        out.push_str(&format!(
            "{} to install, {} to update. Run 'smartinstall install' to apply.\n",
            plan.count(FileDecision::Install),
            plan.count(FileDecision::Update)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle;
    use crate::ignore_rules::IgnoreRuleSet;
    use crate::locator::MemoryRecordStore;
    use crate::system::MockSystem;

    /// A packed bundle for `{a.txt, sub/b.txt}` with `always: *.tmp`, `update: sub/`.
    fn packed_bundle() -> (tempfile::TempDir, Bundle) {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(src.path().join("sub").join("b.txt"), "beta").unwrap();

        let out = tempfile::tempdir().unwrap();
        let rules = IgnoreRuleSet::parse_rule_source("ALWAYS: *.tmp\nUPDATE: sub/\n");
        bundle::pack(src.path(), out.path(), &rules).unwrap();
        let b = Bundle::open(out.path());
        (out, b)
    }

    fn completed(outcome: RunOutcome) -> SyncReport {
        match outcome {
            RunOutcome::Completed(r) => r,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[test]
    fn first_run_prompts_installs_and_remembers() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let system = MockSystem::selecting(target.path());

        let report = completed(run_install(&bundle, &locator, &system, &InstallOptions::default()).unwrap());

        assert_eq!((report.installed, report.updated, report.failed), (2, 0, 0));
        assert!(*system.prompted_for_path.lock().unwrap());
        assert_eq!(locator.load().as_deref(), Some(target.path()));
        let summaries = system.summaries.lock().unwrap();
        assert!(summaries[0].contains("Installed:   2"));
        assert!(summaries[0].contains("Errors:      0"));
    }

    #[test]
    fn relative_selection_is_remembered_as_an_absolute_path() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir_in(".").unwrap();
        let relative = PathBuf::from(target.path().file_name().unwrap());
        assert!(relative.is_relative());
        let locator = InstallLocator::new(MemoryRecordStore::default());

        completed(run_install(&bundle, &locator, &MockSystem::selecting(&relative), &InstallOptions::default()).unwrap());

        let recorded = locator.load().unwrap();
        assert!(recorded.is_absolute());
        assert_eq!(recorded, std::path::absolute(&relative).unwrap());
        assert!(recorded.join("a.txt").is_file());
    }

    #[test]
    fn relative_target_option_is_remembered_as_an_absolute_path() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir_in(".").unwrap();
        let relative = PathBuf::from(target.path().file_name().unwrap());
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let options = InstallOptions { target: Some(relative.clone()), ..Default::default() };

        completed(run_install(&bundle, &locator, &MockSystem::default(), &options).unwrap());
        assert_eq!(locator.load(), Some(std::path::absolute(&relative).unwrap()));

        // The same relative --target on the next run is recognised as the recorded installation.
        let system = MockSystem::confirming();
        completed(run_install(&bundle, &locator, &system, &options).unwrap());
        assert!(*system.prompted_for_update.lock().unwrap());
    }

    #[test]
    fn second_run_is_an_update_that_changes_nothing() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        run_install(&bundle, &locator, &MockSystem::selecting(target.path()), &InstallOptions::default()).unwrap();

        std::fs::write(target.path().join("sub").join("b.txt"), "user settings").unwrap();
        let system = MockSystem::confirming();
        let options = InstallOptions { self_remove: Some(PathBuf::from("/tmp/installer")), ..Default::default() };
        let report = completed(run_install(&bundle, &locator, &system, &options).unwrap());

        assert!(*system.prompted_for_update.lock().unwrap());
        assert!(!*system.prompted_for_path.lock().unwrap());
        assert_eq!((report.installed, report.updated), (0, 0));
        assert_eq!((report.up_to_date, report.ignored), (1, 1));
        assert_eq!(std::fs::read_to_string(target.path().join("sub").join("b.txt")).unwrap(), "user settings");
        // Nothing changed, so the installer stays.
        assert!(system.removal_scheduled.lock().unwrap().is_none());
    }

    #[test]
    fn update_replaces_changed_files_and_schedules_removal() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        run_install(&bundle, &locator, &MockSystem::selecting(target.path()), &InstallOptions::default()).unwrap();
        std::fs::write(target.path().join("a.txt"), "tampered").unwrap();

        let system = MockSystem::default();
        let options = InstallOptions {
            assume_yes: true,
            open_when_done: true,
            self_remove: Some(PathBuf::from("/tmp/installer")),
            ..Default::default()
        };
        let report = completed(run_install(&bundle, &locator, &system, &options).unwrap());

        assert_eq!(report.updated, 1);
        assert!(!*system.prompted_for_update.lock().unwrap());
        assert_eq!(std::fs::read_to_string(target.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(system.removal_scheduled.lock().unwrap().as_deref(), Some(Path::new("/tmp/installer")));
        assert_eq!(system.opened.lock().unwrap().as_slice(), &[target.path().to_path_buf()]);
    }

    #[test]
    fn declined_update_touches_nothing() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        run_install(&bundle, &locator, &MockSystem::selecting(target.path()), &InstallOptions::default()).unwrap();
        std::fs::write(target.path().join("a.txt"), "tampered").unwrap();

        let system = MockSystem::default();
        let outcome = run_install(&bundle, &locator, &system, &InstallOptions::default()).unwrap();

        assert_eq!(outcome, RunOutcome::Declined);
        assert_eq!(std::fs::read_to_string(target.path().join("a.txt")).unwrap(), "tampered");
        assert!(system.summaries.lock().unwrap().is_empty());
    }

    #[test]
    fn cancelled_selection_touches_nothing() {
        let (_keep, bundle) = packed_bundle();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let system = MockSystem::default();

        let outcome = run_install(&bundle, &locator, &system, &InstallOptions::default()).unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(locator.load(), None);
    }

    #[test]
    fn explicit_target_is_created() {
        let (_keep, bundle) = packed_bundle();
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("fresh").join("app");
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let system = MockSystem::default();
        let options = InstallOptions { target: Some(target.clone()), ..Default::default() };

        let report = completed(run_install(&bundle, &locator, &system, &options).unwrap());

        assert_eq!(report.installed, 2);
        assert!(target.join("sub").join("b.txt").is_file());
        assert!(!*system.prompted_for_path.lock().unwrap());
    }

    #[test]
    fn forced_update_on_empty_target_still_ignores_update_only_files() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let options = InstallOptions { target: Some(target.path().to_path_buf()), force_update: true, ..Default::default() };

        let report = completed(run_install(&bundle, &locator, &MockSystem::default(), &options).unwrap());

        assert_eq!((report.installed, report.ignored), (1, 1));
        assert!(!target.path().join("sub").join("b.txt").exists());
    }

    #[test]
    fn missing_manifest_aborts_before_touching_anything() {
        let empty = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        let system = MockSystem::selecting(target.path());

        let result = run_install(&Bundle::open(empty.path()), &locator, &system, &InstallOptions::default());

        assert!(result.is_err());
        assert!(!*system.prompted_for_path.lock().unwrap());
        assert_eq!(std::fs::read_dir(target.path()).unwrap().count(), 0);
    }

    #[test]
    fn broken_record_store_does_not_stop_an_install() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore { fail: true, ..Default::default() });

        let report = completed(run_install(&bundle, &locator, &MockSystem::selecting(target.path()), &InstallOptions::default()).unwrap());
        assert_eq!(report.installed, 2);
    }

    #[test]
    fn preview_does_not_copy() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());

        let plan = run_plan_preview(&bundle, &locator, Some(target.path()), false).unwrap();

        assert_eq!(plan.count(FileDecision::Install), 2);
        assert_eq!(std::fs::read_dir(target.path()).unwrap().count(), 0);
        let text = render_plan(&plan);
        assert!(text.contains("+ a.txt"));
        assert!(text.contains("2 to install, 0 to update"));
    }

    #[test]
    fn preview_uses_the_recorded_installation() {
        let (_keep, bundle) = packed_bundle();
        let target = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        run_install(&bundle, &locator, &MockSystem::selecting(target.path()), &InstallOptions::default()).unwrap();

        let plan = run_plan_preview(&bundle, &locator, None, false).unwrap();

        assert_eq!(plan.mode, InstallMode::Update);
        assert_eq!(plan.scheduled().count(), 0);
        assert!(render_plan(&plan).contains("sub/b.txt (ignored: update-only)"));
    }

    #[test]
    fn preview_without_any_target_fails() {
        let (_keep, bundle) = packed_bundle();
        let locator = InstallLocator::new(MemoryRecordStore::default());
        assert!(run_plan_preview(&bundle, &locator, None, false).is_err());
    }

    #[test]
    fn summary_mentions_errors() {
        let report = SyncReport { installed: 1, failed: 2, ..Default::default() };
        let text = render_summary(&report, Path::new("/opt/app"), InstallMode::FirstInstall);
        assert!(text.contains("Installation Complete"));
        assert!(text.contains("Errors:      2"));
        assert!(text.contains("could not be written"));
    }
}
