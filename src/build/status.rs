//! Build phase tracking shared with the front end.

use crate::build::cancel::CancellationToken;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Where a build is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildPhase {
    /// No build has started
    #[default]
    Idle,
    /// Checking directories
    Preparing,
    /// Copying the map into the working directory
    CopyingSource,
    /// Diffing and choosing steps
    Planning,
    /// Running the step at this plan index
    ExecutingStep(usize),
    /// Copying compiled artifacts to the output directory
    CopyingResults,
    /// Launching the engine
    RunningTarget,
    /// Finished successfully
    Done,
    /// Aborted
    Stopped,
}

impl BuildPhase {
    /// Whether the build has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildPhase::Done | BuildPhase::Stopped)
    }

    /// Whether a build is in progress.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != BuildPhase::Idle
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Idle => write!(f, "idle"),
            BuildPhase::Preparing => write!(f, "preparing"),
            BuildPhase::CopyingSource => write!(f, "copying source"),
            BuildPhase::Planning => write!(f, "planning"),
            BuildPhase::ExecutingStep(i) => write!(f, "running step {}", i + 1),
            BuildPhase::CopyingResults => write!(f, "copying results"),
            BuildPhase::RunningTarget => write!(f, "launching engine"),
            BuildPhase::Done => write!(f, "done"),
            BuildPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Phase plus a one-line status message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    pub phase: BuildPhase,
    pub message: String,
}

/// Cloneable handle to the current build state.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<Mutex<BuildState>>);

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BuildState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace phase and message.
    pub fn set(&self, phase: BuildPhase, message: impl Into<String>) {
        let mut state = self.lock();
        state.phase = phase;
        state.message = message.into();
    }

    pub fn phase(&self) -> BuildPhase {
        self.lock().phase
    }

    pub fn message(&self) -> String {
        self.lock().message.clone()
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> BuildState {
        self.lock().clone()
    }

    /// Block until the job behind this handle has ended.
    ///
    /// Also returns once no other clone is left to move the phase on, or
    /// when `cancel` is set. Returns whether it had to wait.
    pub fn wait_settled(&self, cancel: &CancellationToken, poll: Duration) -> bool {
        let mut waited = false;
        while self.phase().is_active() && Arc::strong_count(&self.0) > 1 && !cancel.is_cancelled() {
            waited = true;
            thread::sleep(poll);
        }
        waited
    }
}
