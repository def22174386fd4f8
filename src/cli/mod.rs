//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod diff;
mod init;
mod tools;

use clap::{Parser, Subcommand};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::build::{BuildContext, StepKind};
use crate::config::loader::{
    find_config_from, find_xdg_config, load_config, merge_cli_overrides, project_root,
    CliOverrides,
};
use crate::config::{default_config, ConfigError};
use crate::output::OutputBuffer;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// mapc - incremental compile orchestrator for brush-based level maps
#[derive(Parser)]
#[command(name = "mapc")]
#[command(about = "mapc - Compile .map files to .bsp, rerunning only the tools an edit needs")]
#[command(version)]
pub struct Cli {
    /// Show debug diagnostics (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the map, skipping tools the last edit did not affect
    Build {
        /// Run every configured step regardless of what changed
        #[arg(long)]
        full: bool,

        /// Launch the engine after a successful build
        #[arg(long)]
        run: bool,

        /// Path to mapc.toml (default: search upward from the current directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the working directory tools run in
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Override the directory compiled maps are copied to
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Override the map source file
        #[arg(long)]
        map: Option<PathBuf>,

        /// Run the full step list even when a reduced plan would do
        #[arg(long)]
        no_reduce: bool,

        /// Maximum worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Rebuild whenever the map file is saved
    Watch {
        /// Launch the engine after each successful build
        #[arg(long)]
        run: bool,

        /// Path to mapc.toml (default: search upward from the current directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two map files and show which tools a rebuild would run
    Diff {
        /// Previous version of the map
        old: PathBuf,

        /// Current version of the map
        new: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one configured tool against the map in the working directory
    Tool {
        /// Tool to run
        #[arg(value_enum)]
        kind: StepKind,
    },

    /// Run a shell command in the working directory
    Exec {
        /// Command line; ${MAP}, ${MAP_NAME}, ${WORK_DIR}, ${OUT_DIR} and ${BSP} are expanded
        command: String,
    },

    /// Write a default mapc.toml
    Init {
        /// Project directory (default: current directory)
        path: Option<PathBuf>,

        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Map source file, relative to the project
        #[arg(long)]
        map: Option<PathBuf>,
    },
}

/// Entry point for the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    match cli.command {
        Commands::Build { full, run, config, work_dir, out_dir, map, no_reduce, jobs } => {
            let overrides = CliOverrides {
                map,
                work_dir,
                out_dir,
                auto_reduce: no_reduce.then_some(false),
                launch: run.then_some(true),
                jobs,
            };
            build::run_build(config.as_deref(), &overrides, full, cli.verbose)
        }
        Commands::Watch { run, config } => {
            let overrides = CliOverrides { launch: run.then_some(true), ..Default::default() };
            build::run_watch(config.as_deref(), &overrides, cli.verbose)
        }
        Commands::Diff { old, new, json } => diff::run_diff(&old, &new, json),
        Commands::Tool { kind } => tools::run_tool(kind, cli.verbose),
        Commands::Exec { command } => tools::run_exec(&command, cli.verbose),
        Commands::Init { path, name, map } => {
            init::run_init(path.as_deref(), name.as_deref(), map.as_deref())
        }
    }
}

/// Load the project configuration and apply CLI overrides.
///
/// A config found next to or above the current directory roots the
/// project at its own directory; the XDG fallback and the built-in
/// defaults root it at the current directory.
pub(crate) fn load_context(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<BuildContext, ConfigError> {
    let cwd = env::current_dir()?;
    let (mut config, root) = match config_path.map(Path::to_path_buf).or_else(|| find_config_from(&cwd)) {
        Some(path) => {
            tracing::debug!(config = %path.display(), "using config");
            let config = load_config(Some(&path))?;
            let root = match project_root(&path) {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => cwd,
            };
            (config, root)
        }
        None => match find_xdg_config() {
            Some(path) => {
                tracing::debug!(config = %path.display(), "using user config");
                (load_config(Some(&path))?, cwd)
            }
            None => {
                tracing::debug!("no mapc.toml found, using defaults");
                (default_config(), cwd)
            }
        },
    };

    merge_cli_overrides(&mut config, overrides);
    Ok(BuildContext::new(config, root).with_verbose(verbose))
}

/// Print whatever jobs have written since the last call.
pub(crate) fn print_output(output: &OutputBuffer) {
    let text = output.drain();
    if !text.is_empty() {
        print!("{}", text);
        let _ = io::stdout().flush();
    }
}

/// Load the project, printing the error and mapping it to an exit code.
pub(crate) fn context_or_exit(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<BuildContext, ExitCode> {
    load_context(config_path, overrides, verbose).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_ERROR)
    })
}
