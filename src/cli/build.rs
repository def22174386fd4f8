//! Build command implementations (build, watch)

use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use super::{context_or_exit, print_output, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildController, BuildOptions};
use crate::config::loader::CliOverrides;
use crate::parser;
use crate::watch::{watch_and_rebuild, WatchOptions};

/// Run the build command
pub fn run_build(config_path: Option<&Path>, overrides: &CliOverrides, full: bool, verbose: bool) -> ExitCode {
    let ctx = match context_or_exit(config_path, overrides, verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    let map_path = ctx.map_path();
    let doc = match parser::parse_file(&map_path) {
        Ok(doc) => Arc::new(doc),
        Err(e) => {
            eprintln!("Error: Cannot read map '{}': {}", map_path.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let options = BuildOptions { run_target: ctx.config().engine.launch, force_full: full };
    let tick = Duration::from_millis(ctx.config().watch.poll_ms.max(1));
    let controller = BuildController::new(ctx);

    if full {
        println!("Building {} (full rebuild)...", map_path.display());
    } else {
        match controller.load_last_built() {
            Ok(true) => println!("Building {} (incremental)...", map_path.display()),
            Ok(false) => println!("Building {} (no previous build)...", map_path.display()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read last-built snapshot");
                println!("Building {} (snapshot unreadable, full rebuild)...", map_path.display());
            }
        }
    }

    let Some(rx) = controller.start_build(doc, options) else {
        print_output(controller.output());
        return ExitCode::from(EXIT_ERROR);
    };

    let report = loop {
        match rx.recv_timeout(tick) {
            Ok(report) => break Some(report),
            Err(RecvTimeoutError::Timeout) => print_output(controller.output()),
            Err(RecvTimeoutError::Disconnected) => break None,
        }
    };
    print_output(controller.output());

    match report {
        Some(report) if report.is_success() => {
            println!("{}", report.summary());
            ExitCode::from(EXIT_SUCCESS)
        }
        Some(report) => {
            eprintln!("{}", report.summary());
            ExitCode::from(EXIT_ERROR)
        }
        None => {
            eprintln!("Error: Build job ended without a report");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the watch command
pub fn run_watch(config_path: Option<&Path>, overrides: &CliOverrides, verbose: bool) -> ExitCode {
    let ctx = match context_or_exit(config_path, overrides, verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    let mut watch_config = ctx.config().watch.clone();
    watch_config.clear_screen = watch_config.clear_screen && atty::is(atty::Stream::Stdout);
    let options = WatchOptions::new(ctx.map_path(), watch_config).with_run_target(ctx.config().engine.launch);

    let controller = BuildController::new(ctx);
    if let Err(e) = controller.load_last_built() {
        tracing::warn!(error = %e, "could not read last-built snapshot");
    }

    println!("Starting watch mode...");
    println!("Press Ctrl+C to stop");
    println!();

    match watch_and_rebuild(&controller, options) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
