//! Step execution.
//!
//! [`Invocation::for_step`] turns a configured step into a concrete command;
//! a [`StepExecutor`] runs it. The orchestrator only talks to the trait, so
//! tests can record invocations without spawning anything.

use crate::build::cancel::CancellationToken;
use crate::build::error::BuildError;
use crate::build::step::{flags, BuildStep, StepKind};
use crate::build::vars::Variables;
use crate::build::BuildContext;
use crate::output::OutputBuffer;
use crate::process::{find_executable, split_command_line, CommandLine, Poll, ProcessRunner};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A step ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Step kind
    pub kind: StepKind,
    /// Human-readable label
    pub label: String,
    /// Command with variables expanded; program names are not yet resolved
    pub command: CommandLine,
    /// Directory the command runs in
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Build the invocation for `step` in the context's working directory.
    ///
    /// Tool steps get the map file appended unless `NO_MAP_ARG` is set.
    /// Relative tool paths with a directory part are resolved against the
    /// project root; bare names are looked up on `PATH` at execution time.
    pub fn for_step(step: &BuildStep, ctx: &BuildContext, vars: &Variables) -> Self {
        let map_arg = (step.kind.is_tool() && !step.has_flag(flags::NO_MAP_ARG))
            .then(|| ctx.work_file("map"));

        let command = if step.kind == StepKind::Custom {
            CommandLine::shell(vars.expand(step.command.as_deref().unwrap_or_default()))
        } else if step.uses_shell() {
            let mut line = vars.expand(&format!("{} {}", step.exe, step.args)).trim().to_string();
            if let Some(map) = &map_arg {
                line.push(' ');
                line.push_str(map);
            }
            CommandLine::shell(line)
        } else {
            let exe = vars.expand(&step.exe);
            let exe_path = Path::new(&exe);
            let exe = if exe_path.components().count() > 1 {
                ctx.resolve_path(exe_path)
            } else {
                PathBuf::from(exe)
            };
            let mut args = split_command_line(&vars.expand(&step.args));
            args.extend(map_arg);
            CommandLine::Program { exe, args }
        };

        Self { kind: step.kind, label: step.label(), command, working_dir: ctx.work_dir() }
    }

    /// Invocation of an ad-hoc shell command.
    pub fn shell(command: &str, working_dir: PathBuf) -> Self {
        Self {
            kind: StepKind::Custom,
            label: format!("custom: {}", command),
            command: CommandLine::shell(command),
            working_dir,
        }
    }
}

/// How a step ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    /// Output ended
    Finished,
    /// Cancellation was observed; the process was killed
    Cancelled,
}

/// Runs invocations.
pub trait StepExecutor: Send + Sync {
    /// Run `invocation`, streaming its output into `output`.
    fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: &OutputBuffer,
    ) -> Result<StepExit, BuildError>;
}

/// Executor backed by real processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    poll_interval: Duration,
}

impl ProcessExecutor {
    /// Create an executor that checks for cancellation every `poll_interval`
    /// while a tool is silent.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    fn resolve(command: &CommandLine) -> Result<CommandLine, BuildError> {
        match command {
            CommandLine::Program { exe, args } => {
                let found = find_executable(&exe.to_string_lossy())
                    .ok_or_else(|| BuildError::ToolNotFound(exe.clone()))?;
                Ok(CommandLine::Program { exe: found, args: args.clone() })
            }
            CommandLine::Shell(_) => Ok(command.clone()),
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl StepExecutor for ProcessExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: &OutputBuffer,
    ) -> Result<StepExit, BuildError> {
        let command = Self::resolve(&invocation.command)?;
        output.push_line(&format!("> {}", command));

        let mut runner = ProcessRunner::spawn(&command, &invocation.working_dir);
        if let Some(e) = runner.spawn_error() {
            return Err(BuildError::Spawn {
                command: command.to_string(),
                source: io::Error::new(e.kind(), e.to_string()),
            });
        }

        loop {
            if cancel.is_cancelled() {
                tracing::info!(step = %invocation.label, "step cancelled");
                return Ok(StepExit::Cancelled);
            }
            match runner.poll_byte(self.poll_interval) {
                Poll::Byte(byte) => output.push_byte(byte),
                Poll::Pending => {}
                Poll::End => break,
            }
        }

        tracing::debug!(step = %invocation.label, "step finished");
        Ok(StepExit::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    fn ctx() -> BuildContext {
        BuildContext::new(default_config(), PathBuf::from("/project"))
    }

    fn invocation(step: &BuildStep) -> Invocation {
        let ctx = ctx();
        Invocation::for_step(step, &ctx, &Variables::for_context(&ctx))
    }

    #[test]
    fn test_tool_invocation_appends_map() {
        let inv = invocation(&BuildStep::tool(StepKind::Light, "light", "-extra4 -soft"));
        assert_eq!(
            inv.command,
            CommandLine::program("light", vec!["-extra4".into(), "-soft".into(), "start.map".into()])
        );
        assert_eq!(inv.working_dir, PathBuf::from("/project/build/work"));
        assert_eq!(inv.label, "light (light)");
    }

    #[test]
    fn test_no_map_arg_flag() {
        let step = BuildStep::tool(StepKind::Vis, "vis", "${MAP_NAME}").with_flags(flags::NO_MAP_ARG);
        assert_eq!(invocation(&step).command, CommandLine::program("vis", vec!["start".into()]));
    }

    #[test]
    fn test_relative_tool_path_resolved() {
        let inv = invocation(&BuildStep::tool(StepKind::Bsp, "tools/qbsp", ""));
        match inv.command {
            CommandLine::Program { exe, .. } => assert_eq!(exe, PathBuf::from("/project/tools/qbsp")),
            other => panic!("expected program, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_invocation_expands_vars() {
        let inv = invocation(&BuildStep::custom("cp ${BSP} /tmp"));
        assert_eq!(inv.command, CommandLine::shell("cp start.bsp /tmp"));
        assert_eq!(inv.kind, StepKind::Custom);
    }

    #[test]
    fn test_shell_flag_on_tool() {
        let step = BuildStep::tool(StepKind::Bsp, "qbsp", "-onlyents").with_flags(flags::SHELL);
        assert_eq!(invocation(&step).command, CommandLine::shell("qbsp -onlyents start.map"));
    }

    #[test]
    fn test_missing_tool() {
        let inv = Invocation {
            kind: StepKind::Bsp,
            label: "bsp (nope)".to_string(),
            command: CommandLine::program("definitely-not-a-real-tool-xyz", vec![]),
            working_dir: PathBuf::from("."),
        };
        let result =
            ProcessExecutor::default().execute(&inv, &CancellationToken::new(), &OutputBuffer::new());
        assert!(matches!(result, Err(BuildError::ToolNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_output() {
        let output = OutputBuffer::new();
        let inv = Invocation::shell("echo compiled", PathBuf::from("."));
        let exit = ProcessExecutor::default()
            .execute(&inv, &CancellationToken::new(), &output)
            .unwrap();

        assert_eq!(exit, StepExit::Finished);
        assert_eq!(output.drain(), "> echo compiled\ncompiled\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_silent_tool() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let inv = Invocation::shell("sleep 30", PathBuf::from("."));
        let exit = ProcessExecutor::new(Duration::from_millis(10))
            .execute(&inv, &cancel, &OutputBuffer::new())
            .unwrap();
        handle.join().unwrap();

        assert_eq!(exit, StepExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
