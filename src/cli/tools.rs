//! Single-job commands (tool, exec)

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use super::{context_or_exit, print_output, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{BuildController, BuildPhase, StepKind};
use crate::config::loader::CliOverrides;

/// Run one configured tool in the working directory
pub fn run_tool(kind: StepKind, verbose: bool) -> ExitCode {
    let ctx = match context_or_exit(None, &CliOverrides::default(), verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let controller = BuildController::new(ctx);
    let started = controller.run_tool(kind);
    finish(&controller, started)
}

/// Run a shell command in the working directory
pub fn run_exec(command: &str, verbose: bool) -> ExitCode {
    if command.trim().is_empty() {
        eprintln!("Error: Empty command");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }
    let ctx = match context_or_exit(None, &CliOverrides::default(), verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let controller = BuildController::new(ctx);
    let started = controller.run_shell(command);
    finish(&controller, started)
}

fn finish(controller: &BuildController, started: bool) -> ExitCode {
    if started {
        let tick = Duration::from_millis(controller.context().config().watch.poll_ms.max(1));
        while controller.is_running() {
            print_output(controller.output());
            thread::sleep(tick);
        }
        controller.wait_for_idle();
    }
    print_output(controller.output());

    if started && controller.status().phase == BuildPhase::Done {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
