//! Front-end facing build control.
//!
//! [`BuildController`] owns everything a front end needs to drive builds:
//! the scheduler, the shared output buffer, the active build's cancellation
//! token and status, and the last successfully built document. Starting
//! anything new cancels whatever is running, and the new job waits for the
//! cancelled one to end before it touches the working directory.

use crate::build::cancel::CancellationToken;
use crate::build::executor::{Invocation, ProcessExecutor, StepExecutor, StepExit};
use crate::build::manifest;
use crate::build::orchestrator::{self, BuildOptions, BuildOrchestrator, SharedSnapshot};
use crate::build::result::BuildReport;
use crate::build::status::{BuildPhase, BuildState, StatusHandle};
use crate::build::step::StepKind;
use crate::build::vars::Variables;
use crate::build::BuildContext;
use crate::models::MapDocument;
use crate::output::OutputBuffer;
use crate::scheduler::{FnJob, JobKind, JobScheduler};
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Token and status of the most recently started job.
#[derive(Clone, Default)]
struct ActiveJob {
    cancel: CancellationToken,
    status: StatusHandle,
}

/// Owns the scheduler and the state shared with running builds.
pub struct BuildController {
    ctx: BuildContext,
    scheduler: JobScheduler,
    executor: Arc<dyn StepExecutor>,
    output: OutputBuffer,
    active: Mutex<ActiveJob>,
    last_built: SharedSnapshot,
}

impl BuildController {
    /// Controller that runs real processes.
    pub fn new(ctx: BuildContext) -> Self {
        let poll = Duration::from_millis(ctx.config().watch.poll_ms.max(1));
        Self::with_executor(ctx, Arc::new(ProcessExecutor::new(poll)))
    }

    /// Controller with a custom step executor.
    pub fn with_executor(ctx: BuildContext, executor: Arc<dyn StepExecutor>) -> Self {
        let scheduler = JobScheduler::new(
            ctx.config().scheduler.max_workers,
            ctx.config().scheduler.queue_capacity,
        );
        Self {
            ctx,
            scheduler,
            executor,
            output: OutputBuffer::new(),
            active: Mutex::new(ActiveJob::default()),
            last_built: SharedSnapshot::default(),
        }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Buffer all jobs write their output to.
    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// State of the most recently started job.
    pub fn status(&self) -> BuildState {
        self.lock_active().status.snapshot()
    }

    /// Whether the most recently started job is still going.
    pub fn is_running(&self) -> bool {
        self.lock_active().status.phase().is_active()
    }

    /// Document the compiled map was last successfully built from.
    pub fn last_built(&self) -> Option<Arc<MapDocument>> {
        self.last_built.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Replace the last-built document.
    pub fn set_last_built(&self, doc: Option<Arc<MapDocument>>) {
        *self.last_built.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = doc;
    }

    /// Seed the last-built document from the working directory snapshot.
    ///
    /// Returns whether a snapshot was found.
    pub fn load_last_built(&self) -> io::Result<bool> {
        let snapshot = manifest::load_snapshot(&self.ctx.work_dir())?;
        let found = snapshot.is_some();
        self.set_last_built(snapshot.map(Arc::new));
        Ok(found)
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveJob> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel the active job and install a fresh token and status.
    ///
    /// Returns the new job and the status of the one it replaced.
    fn supersede(&self) -> (ActiveJob, StatusHandle) {
        let mut active = self.lock_active();
        if active.status.phase().is_active() {
            tracing::info!("cancelling active job");
        }
        active.cancel.cancel();
        let previous = std::mem::take(&mut *active);
        (active.clone(), previous.status)
    }

    /// Start a build of `doc`, diffed against the last built document as it
    /// stands once the replaced job has ended.
    ///
    /// Returns a receiver for the build report, or `None` when the
    /// scheduler has no room.
    pub fn start_build(&self, doc: Arc<MapDocument>, options: BuildOptions) -> Option<Receiver<BuildReport>> {
        let (job, previous) = self.supersede();
        job.status.set(BuildPhase::Preparing, "Queued");

        let (tx, rx) = mpsc::channel();
        let build = BuildOrchestrator::new(self.ctx.clone(), doc, Arc::clone(&self.executor))
            .with_options(options)
            .with_cancel(job.cancel.clone())
            .with_output(self.output.clone())
            .with_status(job.status.clone())
            .with_last_built(Arc::clone(&self.last_built))
            .with_predecessor(previous)
            .with_report_sender(tx);

        if self.scheduler.submit(build) {
            Some(rx)
        } else {
            self.reject(&job);
            None
        }
    }

    /// Run one configured tool against the map in the working directory.
    ///
    /// Returns false when no step of that kind is configured or the
    /// scheduler has no room.
    pub fn run_tool(&self, kind: StepKind) -> bool {
        let Some(step) = self.ctx.config().step(kind) else {
            self.output.push_line(&format!("No {} step configured", kind));
            return false;
        };
        let invocation = Invocation::for_step(step, &self.ctx, &Variables::for_context(&self.ctx));
        self.run_invocation(JobKind::Tool, invocation, true)
    }

    /// Run a shell command in the working directory.
    pub fn run_shell(&self, command: &str) -> bool {
        let vars = Variables::for_context(&self.ctx);
        let invocation = Invocation::shell(&vars.expand(command), self.ctx.work_dir());
        self.run_invocation(JobKind::Shell, invocation, false)
    }

    fn run_invocation(&self, kind: JobKind, invocation: Invocation, copy_source: bool) -> bool {
        let (job, previous) = self.supersede();
        job.status.set(BuildPhase::ExecutingStep(0), invocation.label.clone());

        let ctx = self.ctx.clone();
        let executor = Arc::clone(&self.executor);
        let output = self.output.clone();
        let last_built = Arc::clone(&self.last_built);
        let ActiveJob { cancel, status } = job.clone();

        let accepted = self.scheduler.submit(FnJob::new(kind, move || {
            previous.wait_settled(&cancel, orchestrator::PREDECESSOR_POLL);
            let result = if cancel.is_cancelled() {
                Ok(StepExit::Cancelled)
            } else {
                orchestrator::check_context(&ctx)
                    .and_then(|()| {
                        if copy_source {
                            orchestrator::copy_source(&ctx)
                        } else {
                            std::fs::create_dir_all(ctx.work_dir()).map_err(Into::into)
                        }
                    })
                    .and_then(|()| {
                        if copy_source {
                            // A lone tool leaves artifacts the snapshot does not describe.
                            orchestrator::forget_build_state(&last_built, &ctx.work_dir())?;
                        }
                        executor.execute(&invocation, &cancel, &output)
                    })
            };

            let (phase, message) = match result {
                Ok(StepExit::Finished) => (BuildPhase::Done, format!("{} finished", invocation.label)),
                Ok(StepExit::Cancelled) => (BuildPhase::Stopped, format!("{} cancelled", invocation.label)),
                Err(e) => {
                    tracing::warn!(job = %kind, error = %e, "job failed");
                    (BuildPhase::Stopped, format!("{} failed: {}", invocation.label, e))
                }
            };
            output.push_line(&message);
            status.set(phase, message);
        }));

        if !accepted {
            self.reject(&job);
        }
        accepted
    }

    fn reject(&self, job: &ActiveJob) {
        let message = "Scheduler is full; job not started";
        tracing::warn!("{}", message);
        self.output.push_line(message);
        job.status.set(BuildPhase::Stopped, message);
    }

    /// Cancel whatever is running.
    pub fn stop(&self) {
        let active = self.lock_active();
        active.cancel.cancel();
    }

    /// Block until every submitted job has finished.
    pub fn wait_for_idle(&self) {
        self.scheduler.wait_for_idle();
    }
}

impl Drop for BuildController {
    fn drop(&mut self) {
        self.stop();
    }
}
