//! Shared fixtures for build tests.

use crate::build::cancel::CancellationToken;
use crate::build::error::BuildError;
use crate::build::executor::{Invocation, StepExecutor, StepExit};
use crate::build::step::StepKind;
use crate::build::BuildContext;
use crate::config::default_config;
use crate::output::OutputBuffer;
use crate::process::CommandLine;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const BASE: &str = "{\n\"classname\" \"worldspawn\"\n\"_sunlight\" \"1\"\n{\n( 0 0 0 ) ( 1 0 0 ) ( 0 1 0 ) tex 0 0 0 1 1\n}\n}\n";

/// Records invocations and writes the artifacts a real tool would.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    pub calls: Mutex<Vec<Invocation>>,
    /// Cancel this token once the n-th call completes
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub fail_on: Option<StepKind>,
    /// Write `start.bsp`/`start.lit` like the real tools
    pub produce: bool,
    /// Hold the first call until its build is cancelled
    pub block_first: bool,
}

impl RecordingExecutor {
    pub fn producing() -> Self {
        Self { produce: true, ..Self::default() }
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|i| i.label.clone()).collect()
    }

    pub fn commands(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().iter().map(|i| i.command.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl StepExecutor for RecordingExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: &OutputBuffer,
    ) -> Result<StepExit, BuildError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };

        if self.block_first && count == 1 {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            return Ok(StepExit::Cancelled);
        }
        if self.fail_on == Some(invocation.kind) {
            return Err(BuildError::ToolNotFound(PathBuf::from("missing-tool")));
        }
        if self.produce && invocation.kind.is_tool() {
            fs::write(invocation.working_dir.join("start.bsp"), b"BSP2").unwrap();
            if invocation.kind == StepKind::Light {
                fs::write(invocation.working_dir.join("start.lit"), b"QLIT").unwrap();
            }
        }
        if let Some((n, token)) = &self.cancel_after {
            if count == *n {
                token.cancel();
            }
        }
        output.push_line("tool output");
        Ok(StepExit::Finished)
    }
}

/// Project directory with `maps/start.map` and the default config.
pub(crate) fn project(map: &str) -> (TempDir, BuildContext) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("maps")).unwrap();
    fs::write(dir.path().join("maps/start.map"), map).unwrap();
    let ctx = BuildContext::new(default_config(), dir.path().to_path_buf());
    (dir, ctx)
}
