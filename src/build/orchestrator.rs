//! The build pipeline as a schedulable job.
//!
//! One [`BuildOrchestrator`] runs one build: check directories, copy the map
//! into the working directory, plan (reduced when a previous snapshot is
//! available), run each step, copy artifacts out and optionally launch the
//! engine. Cancellation is checked before every phase and, through the
//! executor, between output bytes.
//!
//! Failures never escape the job. They end the build in
//! [`BuildPhase::Stopped`] with a status message and a line in the output
//! buffer.

use crate::build::cancel::CancellationToken;
use crate::build::error::BuildError;
use crate::build::executor::{Invocation, StepExecutor, StepExit};
use crate::build::manifest::{self, BuildManifest};
use crate::build::plan::{describe_plan, plan_steps};
use crate::build::result::{BuildOutcome, BuildReport, StepResult, StopReason};
use crate::build::status::{BuildPhase, StatusHandle};
use crate::build::step::{BuildStep, StepKind};
use crate::build::vars::Variables;
use crate::build::BuildContext;
use crate::diff::classify;
use crate::models::MapDocument;
use crate::output::OutputBuffer;
use crate::process::{find_executable, launch_detached, split_command_line, CommandLine};
use crate::scheduler::{Job, JobKind};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How often a build checks whether the job it superseded has ended.
pub(crate) const PREDECESSOR_POLL: Duration = Duration::from_millis(5);

/// Last successfully built document, shared with the controller.
pub type SharedSnapshot = Arc<Mutex<Option<Arc<MapDocument>>>>;

/// Per-build switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Launch the engine after a successful build
    pub run_target: bool,
    /// Ignore the previous snapshot and run the full step list
    pub force_full: bool,
}

/// Why the pipeline stopped early.
enum Halt {
    Cancelled,
    Failed(BuildError),
}

impl From<BuildError> for Halt {
    fn from(e: BuildError) -> Self {
        Halt::Failed(e)
    }
}

/// A single build, runnable inline or as a scheduler job.
pub struct BuildOrchestrator {
    ctx: BuildContext,
    current: Arc<MapDocument>,
    previous: Option<Arc<MapDocument>>,
    options: BuildOptions,
    executor: Arc<dyn StepExecutor>,
    cancel: CancellationToken,
    output: OutputBuffer,
    status: StatusHandle,
    last_built: Option<SharedSnapshot>,
    predecessor: Option<StatusHandle>,
    report_tx: Option<Sender<BuildReport>>,
}

impl BuildOrchestrator {
    /// Create a full build of `current`.
    pub fn new(ctx: BuildContext, current: Arc<MapDocument>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            ctx,
            current,
            previous: None,
            options: BuildOptions::default(),
            executor,
            cancel: CancellationToken::new(),
            output: OutputBuffer::new(),
            status: StatusHandle::new(),
            last_built: None,
            predecessor: None,
            report_tx: None,
        }
    }

    /// Document the compiled map was last built from.
    ///
    /// Without one, the build reads the last-built slot when it plans.
    pub fn with_previous(mut self, previous: Option<Arc<MapDocument>>) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_output(mut self, output: OutputBuffer) -> Self {
        self.output = output;
        self
    }

    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    /// Slot updated with `current` when the build reaches `Done`.
    pub fn with_last_built(mut self, last_built: SharedSnapshot) -> Self {
        self.last_built = Some(last_built);
        self
    }

    /// Status of the job this build replaces.
    ///
    /// The build waits for it to end before touching the working directory.
    pub fn with_predecessor(mut self, status: StatusHandle) -> Self {
        self.predecessor = Some(status);
        self
    }

    /// Channel that receives the report when run as a job.
    pub fn with_report_sender(mut self, tx: Sender<BuildReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Run the whole pipeline on the calling thread.
    pub fn run(&self) -> BuildReport {
        let start = Instant::now();
        let mut report = BuildReport::new();
        let mut record = BuildManifest::new(self.ctx.map_path());
        let mut touched = false;

        let halted = match self.execute(&mut report, &mut record, &mut touched) {
            Ok(()) => {
                self.finish(&mut record);
                None
            }
            Err(Halt::Cancelled) => Some((StopReason::Cancelled, "Build cancelled".to_string())),
            Err(Halt::Failed(e)) => {
                tracing::warn!(error = %e, "build stopped");
                let message = e.to_string();
                let line = format!("Build stopped: {}", message);
                Some((StopReason::Failed(message), line))
            }
        };

        report.outcome = match halted {
            None => BuildOutcome::Done,
            Some((reason, line)) => {
                if touched {
                    self.forget_last_built();
                }
                self.status.set(BuildPhase::Stopped, line.as_str());
                self.output.push_line(&line);
                BuildOutcome::Stopped(reason)
            }
        };
        report.total_duration = start.elapsed();
        report
    }

    /// Move to `phase` unless cancellation was requested.
    fn enter(&self, phase: BuildPhase, message: &str) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        tracing::debug!(%phase, "build phase");
        self.status.set(phase, message);
        Ok(())
    }

    fn execute(
        &self,
        report: &mut BuildReport,
        record: &mut BuildManifest,
        touched: &mut bool,
    ) -> Result<(), Halt> {
        if let Some(previous) = &self.predecessor {
            self.status.set(BuildPhase::Preparing, "Waiting for previous job");
            if previous.wait_settled(&self.cancel, PREDECESSOR_POLL) {
                tracing::debug!("previous job ended");
            }
        }

        self.enter(BuildPhase::Preparing, "Checking directories")?;
        check_context(&self.ctx)?;

        self.enter(BuildPhase::CopyingSource, "Copying source")?;
        copy_source(&self.ctx)?;

        self.enter(BuildPhase::Planning, "Planning")?;
        if self.current.worldspawn().is_none() {
            tracing::warn!("map has no worldspawn entity");
            self.output.push_line("Warning: map has no worldspawn entity");
        }
        if self.ctx.is_verbose() {
            self.output.push_line(&format!(
                "Map: {} entities, {} brushes",
                self.current.entities().len(),
                self.current.geometry_count()
            ));
        }
        let steps = self.plan(report, record);
        self.output.push_line(&describe_plan(&steps));

        let vars = Variables::for_context(&self.ctx);
        let mut ran = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            self.enter(BuildPhase::ExecutingStep(i), &step.label())?;
            if !step.enabled {
                report.add_result(StepResult::skipped(step.label()));
                continue;
            }

            self.output.push_line(&format!("==> [{}/{}] {}", i + 1, steps.len(), step.label()));
            let invocation = Invocation::for_step(step, &self.ctx, &vars);
            let started = Instant::now();
            *touched = true;
            match self.executor.execute(&invocation, &self.cancel, &self.output) {
                Ok(StepExit::Finished) => {
                    if self.ctx.is_verbose() {
                        self.output.push_line(&format!(
                            "{} took {:.2}s",
                            step.label(),
                            started.elapsed().as_secs_f64()
                        ));
                    }
                    report.add_result(StepResult::success(step.label(), started.elapsed()));
                    record.record_step(step.kind, &step.label(), started.elapsed());
                    ran.push(step.kind);
                }
                Ok(StepExit::Cancelled) => return Err(Halt::Cancelled),
                Err(e) => {
                    report.add_result(StepResult::failed(step.label(), e.to_string(), started.elapsed()));
                    return Err(e.into());
                }
            }
        }

        self.enter(BuildPhase::CopyingResults, "Copying results")?;
        report.artifacts = self.copy_results(&ran)?;

        if self.options.run_target {
            self.enter(BuildPhase::RunningTarget, "Launching engine")?;
            self.launch_engine(&vars)?;
        }
        Ok(())
    }

    /// Reduced plan when a previous snapshot is usable, otherwise the
    /// enabled-or-not full step list.
    fn plan(&self, report: &mut BuildReport, record: &mut BuildManifest) -> Vec<BuildStep> {
        let config = self.ctx.config();
        let previous = self.previous.clone().or_else(|| {
            let slot = self.last_built.as_ref()?;
            let last = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
            last
        });
        let previous = match previous {
            Some(previous) if config.diff.auto_reduce && !self.options.force_full => previous,
            _ => return config.steps.clone(),
        };

        let diff = classify(&previous, &self.current, &config.diff.classify_options());
        tracing::info!(
            geometry = diff.geometry,
            entity = diff.entity,
            light = diff.light,
            "classified changes"
        );
        self.output.push_line(&diff.summary());
        report.diff = Some(diff);
        record.reduced = true;
        plan_steps(&diff, &config.steps, &config.diff.entities_only_arg)
    }

    /// Copy the artifacts of steps that ran into the output directory.
    fn copy_results(&self, ran: &[StepKind]) -> Result<Vec<PathBuf>, BuildError> {
        let mut wanted: Vec<(&str, bool)> = Vec::new();
        for (ext, required) in ran.iter().flat_map(|kind| kind.artifacts()) {
            match wanted.iter_mut().find(|(e, _)| e == ext) {
                Some(entry) => entry.1 |= *required,
                None => wanted.push((*ext, *required)),
            }
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let work_dir = self.ctx.work_dir();
        let out_dir = self.ctx.out_dir();
        fs::create_dir_all(&out_dir)?;

        let mut copied = Vec::new();
        for (ext, required) in wanted {
            let name = self.ctx.work_file(ext);
            let from = work_dir.join(&name);
            let to = out_dir.join(&name);
            if !from.exists() {
                if required {
                    return Err(BuildError::Copy {
                        from,
                        to,
                        source: io::Error::new(io::ErrorKind::NotFound, "artifact was not produced"),
                    });
                }
                continue;
            }
            copy_file(&from, &to)?;
            self.output.push_line(&format!("Copied {}", to.display()));
            copied.push(to);
        }
        Ok(copied)
    }

    fn launch_engine(&self, vars: &Variables) -> Result<(), BuildError> {
        let engine = &self.ctx.config().engine;
        let exe = engine.exe.as_deref().ok_or(BuildError::NoEngine)?;
        let exe = vars.expand(exe);
        let exe_path = Path::new(&exe);
        let resolved = if exe_path.components().count() > 1 {
            let path = self.ctx.resolve_path(exe_path);
            path.is_file().then_some(path)
        } else {
            find_executable(&exe)
        };
        let resolved = resolved.ok_or_else(|| BuildError::ToolNotFound(PathBuf::from(&exe)))?;

        let mut args = split_command_line(&vars.expand(&engine.args));
        args.push("+map".to_string());
        args.push(self.ctx.map_name());

        let dir = resolved.parent().map(Path::to_path_buf).unwrap_or_else(|| self.ctx.work_dir());
        let command = CommandLine::program(resolved, args);
        let pid = launch_detached(&command, &dir)
            .map_err(|source| BuildError::Spawn { command: command.to_string(), source })?;
        self.output.push_line(&format!("Launched {} (pid {})", command, pid));
        Ok(())
    }

    /// Drop the last-built snapshot after a build that stopped part way.
    ///
    /// The working directory then holds artifacts of neither document, so
    /// the next build must not reduce its plan against the old one.
    fn forget_last_built(&self) {
        let slot = self.last_built.clone().unwrap_or_default();
        if let Err(e) = forget_build_state(&slot, &self.ctx.work_dir()) {
            tracing::warn!(error = %e, "failed to clear build state");
            self.output.push_line(&format!("Warning: {}", e));
        }
        tracing::info!("partial build, next build runs every step");
    }

    /// Record the successful build in memory and in the working directory.
    fn finish(&self, record: &mut BuildManifest) {
        if let Some(slot) = &self.last_built {
            let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(Arc::clone(&self.current));
        }

        let work_dir = self.ctx.work_dir();
        let saved = manifest::save_snapshot(&work_dir, &self.current)
            .map_err(BuildError::Io)
            .and_then(|()| record.save_to_dir(&work_dir).map_err(BuildError::from));
        if let Err(e) = saved {
            tracing::warn!(error = %e, "failed to record build state");
            self.output.push_line(&format!("Warning: {}", e));
        }

        self.status.set(BuildPhase::Done, "Build finished");
        self.output.push_line("Build finished");
    }
}

impl Job for BuildOrchestrator {
    fn run(mut self: Box<Self>) {
        let tx = self.report_tx.take();
        let report = BuildOrchestrator::run(&self);
        if let Some(tx) = tx {
            // receiver may have stopped caring (superseded build)
            let _ = tx.send(report);
        }
    }

    fn kind(&self) -> JobKind {
        JobKind::Build
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), BuildError> {
    fs::copy(from, to).map(|_| ()).map_err(|source| BuildError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Clear the last-built document in memory and on disk.
pub fn forget_build_state(last_built: &SharedSnapshot, work_dir: &Path) -> Result<(), BuildError> {
    *last_built.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    manifest::clear_build_state(work_dir)?;
    Ok(())
}

/// Check the context's directories for aliasing.
pub fn check_context(ctx: &BuildContext) -> Result<(), BuildError> {
    check_aliasing(&ctx.work_dir(), &ctx.source_dir(), &ctx.out_dir())
}

/// Copy the map into the working directory, creating it if needed.
pub fn copy_source(ctx: &BuildContext) -> Result<(), BuildError> {
    fs::create_dir_all(ctx.work_dir())?;
    copy_file(&ctx.map_path(), &ctx.work_map())
}

/// Fail when the working directory is the source or output directory.
pub fn check_aliasing(work_dir: &Path, source_dir: &Path, out_dir: &Path) -> Result<(), BuildError> {
    let work = comparable(work_dir);
    for (other, name) in [(source_dir, "source"), (out_dir, "output")] {
        if comparable(other) == work {
            return Err(BuildError::SafetyViolation { work: work_dir.to_path_buf(), other: name });
        }
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet.
///
/// `.` and `..` are folded lexically, then the deepest existing ancestor is
/// canonicalized and the remainder re-appended.
fn comparable(path: &Path) -> PathBuf {
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other),
        }
    }

    let mut existing = folded.clone();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            existing = canonical;
            break;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return folded,
        }
    }

    for name in rest.into_iter().rev() {
        existing.push(name);
    }
    existing
}
