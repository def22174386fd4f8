//! mapc - Command-line tool for incremental map compiles

use std::process::ExitCode;

use mapc::cli;

fn main() -> ExitCode {
    cli::run()
}
