//! Diff command implementation

use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use super::{load_context, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::plan::{describe_plan, plan_steps};
use crate::build::BuildStep;
use crate::config::loader::CliOverrides;
use crate::diff::{diff_files, format_diff, MapDiff};

/// JSON shape of `mapc diff --json`
#[derive(Debug, Serialize)]
struct DiffOutput<'a> {
    old: String,
    new: String,
    diff: MapDiff,
    steps: &'a [BuildStep],
}

/// Run the diff command
pub fn run_diff(old: &Path, new: &Path, json: bool) -> ExitCode {
    // Field rules come from the project config when there is one.
    let config = match load_context(None, &CliOverrides::default(), false) {
        Ok(ctx) => ctx.config().clone(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let diff = match diff_files(old, new, &config.diff.classify_options()) {
        Ok(diff) => diff,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let steps = plan_steps(&diff, &config.steps, &config.diff.entities_only_arg);

    if json {
        let output = DiffOutput {
            old: old.display().to_string(),
            new: new.display().to_string(),
            diff,
            steps: &steps,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        println!("{}", format_diff(&diff, &old.display().to_string(), &new.display().to_string()));
        println!();
        println!("Plan:");
        println!("{}", describe_plan(&steps));
    }

    ExitCode::from(EXIT_SUCCESS)
}
