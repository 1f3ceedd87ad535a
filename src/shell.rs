//! # Shell Module
//!
//! Best-effort platform side effects that follow a successful run:
//!
//! - Opening the install directory in the platform file browser.
//! - Deleting the installer executable once this process has exited.
//!
//! Neither is part of the sync itself; failures are returned to the caller, who logs them and
//! moves on.

use std::path::Path;
use std::process::Command;
use anyhow::{Context, Result};
use log::info;

/// Seconds the removal helper waits so the running executable is no longer locked.
const REMOVAL_DELAY_SECS: u32 = 2;

/// Opens `dir` with the shell's "open" verb (Explorer).
///
/// # Safety
/// Uses `unsafe` Win32 calls. The path and verb are passed as wide strings that outlive the call.
#[cfg(windows)]
pub fn open_directory(dir: &Path) -> Result<()> {
    use windows::Win32::UI::Shell::ShellExecuteW;
    use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
    use windows::core::{HSTRING, PCWSTR, w};

    let target = HSTRING::from(dir.as_os_str());
    let result = unsafe {
        ShellExecuteW(
            None, // Parent window (None = Desktop)
            w!("open"),
            &target,
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };

    // ShellExecute returns an HINSTANCE > 32 on success.
    if result.0 as isize > 32 {
        Ok(())
    } else {
        anyhow::bail!("ShellExecute failed with code {}", result.0 as isize)
    }
}

/// Opens `dir` with `open` (macOS) or `xdg-open` (everything else).
#[cfg(not(windows))]
pub fn open_directory(dir: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    Command::new(opener)
        .arg(dir)
        .spawn()
        .with_context(|| format!("Failed to run {} for {:?}", opener, dir))?;
    Ok(())
}

/// Writes a small batch file into the temp directory that waits, deletes the installer,
/// then deletes itself, and launches it without a console window.
#[cfg(windows)]
pub fn schedule_self_removal(executable: &Path) -> Result<()> {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    let script_path = std::env::temp_dir().join(format!("smartinstall_cleanup_{}.bat", std::process::id()));
    let script = format!(
        "@echo off\r\nchcp 65001 >nul\r\ntimeout /t {} /nobreak >nul\r\ndel \"{}\"\r\ndel \"%~f0\"\r\n",
        REMOVAL_DELAY_SECS,
        executable.display()
    );
    std::fs::write(&script_path, script)
        .with_context(|| format!("Failed to write cleanup script {:?}", script_path))?;

    Command::new("cmd")
        .arg("/C")
        .arg(&script_path)
        .creation_flags(CREATE_NO_WINDOW.0)
        .spawn()
        .context("Failed to launch cleanup script")?;

    info!("Installer will be removed in {} seconds", REMOVAL_DELAY_SECS);
    Ok(())
}

/// Spawns a detached `sh` that sleeps, then removes the installer.
///
/// The path travels as `$0`, never spliced into the script text.
#[cfg(not(windows))]
pub fn schedule_self_removal(executable: &Path) -> Result<()> {
    Command::new("sh")
        .arg("-c")
        .arg(format!("sleep {}; rm -f -- \"$0\"", REMOVAL_DELAY_SECS))
        .arg(executable)
        .spawn()
        .context("Failed to launch cleanup shell")?;

    info!("Installer will be removed in {} seconds", REMOVAL_DELAY_SECS);
    Ok(())
}
