use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use anyhow::Result;
use crate::shell;

/// Abstraction over everything outside the sync core: prompts, the final report, and the
/// platform side effects that follow a run. Orchestration takes `&impl SystemOps` so tests
/// can run it without a terminal or a file browser.
pub trait SystemOps {
    /// Ask where to install. `None` means the user cancelled.
    fn select_install_path(&self, default: &Path) -> Option<PathBuf>;

    /// Ask before refreshing an existing installation.
    fn confirm_update(&self, dir: &Path) -> bool;

    /// Show the end-of-run report.
    fn present_summary(&self, summary: &str);

    /// Open `dir` in the platform file browser.
    fn open_directory(&self, dir: &Path) -> Result<()>;

    /// Arrange for `executable` to be deleted shortly after this process exits.
    fn schedule_self_removal(&self, executable: &Path) -> Result<()>;
}

/// Interactive terminal implementation (Production).
pub struct ConsoleSystem;

impl ConsoleSystem {
    fn prompt(&self, question: &str) -> Option<String> {
        print!("{}", question);
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None, // EOF or a closed stdin
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl SystemOps for ConsoleSystem {
    fn select_install_path(&self, default: &Path) -> Option<PathBuf> {
        let answer = self.prompt(&format!(
            "Install location [{}] (q to cancel): ",
            default.display()
        ))?;
        match answer.as_str() {
            "q" | "Q" => None,
            "" => Some(default.to_path_buf()),
            other => Some(PathBuf::from(other)),
        }
    }

    fn confirm_update(&self, dir: &Path) -> bool {
        let answer = self.prompt(&format!(
            "Found an existing installation at {}\nUpdate it? [y/N]: ",
            dir.display()
        ));
        matches!(answer.as_deref(), Some("y" | "Y" | "yes" | "Yes"))
    }

    fn present_summary(&self, summary: &str) {
        println!("{}", summary);
    }

    fn open_directory(&self, dir: &Path) -> Result<()> {
        shell::open_directory(dir)
    }

    fn schedule_self_removal(&self, executable: &Path) -> Result<()> {
        shell::schedule_self_removal(executable)
    }
}

/// A scripted System for Testing.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSystem {
    /// Answer to the path prompt. `None` simulates a cancel.
    pub selection: Option<PathBuf>,
    pub confirm: bool,
    pub prompted_for_path: std::sync::Mutex<bool>,
    pub prompted_for_update: std::sync::Mutex<bool>,
    pub summaries: std::sync::Mutex<Vec<String>>,
    pub opened: std::sync::Mutex<Vec<PathBuf>>,
    pub removal_scheduled: std::sync::Mutex<Option<PathBuf>>,
}

#[cfg(test)]
impl MockSystem {
    pub fn selecting(dir: &Path) -> Self {
        Self { selection: Some(dir.to_path_buf()), ..Default::default() }
    }

    pub fn confirming() -> Self {
        Self { confirm: true, ..Default::default() }
    }
}

#[cfg(test)]
impl SystemOps for MockSystem {
    fn select_install_path(&self, _default: &Path) -> Option<PathBuf> {
        *self.prompted_for_path.lock().unwrap() = true;
        self.selection.clone()
    }

    fn confirm_update(&self, _dir: &Path) -> bool {
        *self.prompted_for_update.lock().unwrap() = true;
        self.confirm
    }

    fn present_summary(&self, summary: &str) {
        self.summaries.lock().unwrap().push(summary.to_string());
    }

    fn open_directory(&self, dir: &Path) -> Result<()> {
        self.opened.lock().unwrap().push(dir.to_path_buf());
        Ok(())
    }

    fn schedule_self_removal(&self, executable: &Path) -> Result<()> {
        *self.removal_scheduled.lock().unwrap() = Some(executable.to_path_buf());
        Ok(())
    }
}
