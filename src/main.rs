//! # Smartinstall: The Main Entry Point
//!
//! This module handles Command Line Interface (CLI) parsing, logging initialization,
//! and dispatching commands to the appropriate sub-modules.
//!
//! Run without arguments, the binary behaves like a double-clicked installer: it looks for the
//! bundle beside itself, detects a previous installation, and installs or updates.

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info, warn};
use simplelog::{Config, SimpleLogger};

mod bundle;
mod error;
mod executor;
mod hash_store;
mod ignore_rules;
mod installer;
mod invariant_ppt;
mod locator;
mod manifest;
mod planner;
mod shell;
mod system;

use bundle::Bundle;
use installer::{InstallOptions, RunOutcome};
use locator::{FileRecordStore, InstallLocator, RECORD_FILE_NAME};
use system::{ConsoleSystem, SystemOps};

/// The primary Command Line Interface (CLI) configuration.
#[derive(Parser)]
#[command(name = "smartinstall")]
#[command(about = "Installs a bundled file tree, then keeps it up to date", long_about = None)]
struct Cli {
    /// The sub-command to execute (install when omitted).
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Available sub-commands.
#[derive(Subcommand)]
enum Commands {
    /// Package a source tree into a bundle.
    ///
    /// Walks the source directory, drops files matched by ALWAYS rules, fingerprints the
    /// rest, and writes `source_files/`, `file_manifest.json` and `ignore_rules.json`.
    Pack {
        /// Directory holding the files to ship.
        #[arg(long, default_value = "source_files")]
        source: PathBuf,
        /// Where to write the bundle.
        #[arg(long, default_value = bundle::DEFAULT_BUNDLE_DIR)]
        out: PathBuf,
        /// Rule source with `ALWAYS:` / `UPDATE:` tagged patterns.
        #[arg(long, default_value = bundle::RULE_SOURCE_FILE_NAME)]
        ignore_file: PathBuf,
    },
    /// Install into a new directory, or update the previous installation.
    Install {
        #[command(flatten)]
        common: CommonArgs,
        /// Don't ask before updating an existing installation.
        #[arg(short, long)]
        yes: bool,
        /// Treat the run as an update even without a recorded installation.
        #[arg(long)]
        force_update: bool,
        /// Open the install directory when done.
        #[arg(long)]
        open: bool,
        /// Delete this executable after a run that installed or updated something.
        #[arg(long)]
        self_remove: bool,
    },
    /// Show what `install` would do, without copying anything.
    Plan {
        #[command(flatten)]
        common: CommonArgs,
        /// Evaluate as an update (applies UPDATE rules).
        #[arg(long)]
        update: bool,
    },
}

#[derive(clap::Args, Default)]
struct CommonArgs {
    /// Bundle directory (defaults to `bundle/` beside the executable).
    #[arg(long)]
    bundle: Option<PathBuf>,
    /// Install directory; skips the location prompt.
    #[arg(long)]
    target: Option<PathBuf>,
    /// File remembering the last install directory.
    #[arg(long)]
    record_file: Option<PathBuf>,
}

impl CommonArgs {
    fn bundle(&self) -> Bundle {
        Bundle::open(self.bundle.clone().unwrap_or_else(Bundle::default_location))
    }

    fn locator(&self) -> InstallLocator<FileRecordStore> {
        let path = self.record_file.clone().or_else(FileRecordStore::default_location).unwrap_or_else(|| {
            warn!("No home directory found; keeping the install record in the current directory");
            PathBuf::from(RECORD_FILE_NAME)
        });
        InstallLocator::new(FileRecordStore::new(path))
    }
}

fn main() {
    let cli = Cli::parse();

    // Determine log level based on verbosity flag
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Logging failure shouldn't stop an install
    let _ = SimpleLogger::init(log_level, Config::default());

    let command = cli.command.unwrap_or(Commands::Install {
        common: CommonArgs::default(),
        yes: false,
        force_update: false,
        open: false,
        self_remove: false,
    });

    if let Err(e) = dispatch(command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Pack { source, out, ignore_file } => {
            let rules = bundle::load_rule_source(&ignore_file)?;
            let manifest = bundle::pack(&source, &out, &rules)?;
            println!("Bundle ready at {} ({} files)", out.display(), manifest.len());
        }
        Commands::Install { common, yes, force_update, open, self_remove } => {
            let self_remove = if self_remove {
                match std::env::current_exe() {
                    Ok(exe) => Some(exe),
                    Err(e) => {
                        warn!("Cannot locate the running executable ({}); it will not be removed", e);
                        None
                    }
                }
            } else {
                None
            };
            let options = InstallOptions {
                target: common.target.clone(),
                assume_yes: yes,
                force_update,
                open_when_done: open,
                self_remove,
            };

            let system = ConsoleSystem;
            match installer::run_install(&common.bundle(), &common.locator(), &system, &options)? {
                RunOutcome::Completed(_) => {}
                RunOutcome::Cancelled => info!("Installation cancelled; nothing was changed"),
                RunOutcome::Declined => info!("Update declined; nothing was changed"),
            }
        }
        Commands::Plan { common, update } => {
            let plan = installer::run_plan_preview(&common.bundle(), &common.locator(), common.target.as_deref(), update)?;
            ConsoleSystem.present_summary(&installer::render_plan(&plan));
        }
    }
    Ok(())
}
