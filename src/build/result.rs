//! Build result types.
//!
//! Contains types for representing the outcome of a build job.

use crate::diff::MapDiff;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Step ran to completion
    Success,
    /// Step disabled in configuration
    Skipped,
    /// Step could not run
    Failed(String),
}

impl StepStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step label, e.g. `light (light)`
    pub label: String,
    /// Step status
    pub status: StepStatus,
    /// Step duration
    pub duration: Duration,
}

impl StepResult {
    /// Create a successful result.
    pub fn success(label: String, duration: Duration) -> Self {
        Self { label, status: StepStatus::Success, duration }
    }

    /// Create a skipped result.
    pub fn skipped(label: String) -> Self {
        Self { label, status: StepStatus::Skipped, duration: Duration::ZERO }
    }

    /// Create a failed result.
    pub fn failed(label: String, error: String, duration: Duration) -> Self {
        Self { label, status: StepStatus::Failed(error), duration }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Why a build stopped before reaching `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Superseded by a newer build or stopped by the user
    Cancelled,
    /// Safety violation, missing tool, spawn or copy failure
    Failed(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Terminal outcome of a build job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BuildOutcome {
    /// Every phase succeeded
    #[default]
    Done,
    /// The pipeline was aborted
    Stopped(StopReason),
}

impl BuildOutcome {
    /// Whether the build reached `Done`.
    pub fn is_done(&self) -> bool {
        matches!(self, BuildOutcome::Done)
    }

    /// Whether the build was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildOutcome::Stopped(StopReason::Cancelled))
    }
}

/// Report for one build job.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Results for each step, in plan order
    pub steps: Vec<StepResult>,
    /// Classifier output when the plan was reduced
    pub diff: Option<MapDiff>,
    /// Artifacts copied to the output directory
    pub artifacts: Vec<PathBuf>,
    /// Terminal outcome
    pub outcome: BuildOutcome,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step result.
    pub fn add_result(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Number of steps that ran to completion.
    pub fn success_count(&self) -> usize {
        self.steps.iter().filter(|r| matches!(r.status, StepStatus::Success)).count()
    }

    /// Number of disabled steps.
    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|r| matches!(r.status, StepStatus::Skipped)).count()
    }

    /// Get failed step results.
    pub fn failures(&self) -> Vec<&StepResult> {
        self.steps.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Whether the build reached `Done`.
    pub fn is_success(&self) -> bool {
        self.outcome.is_done()
    }

    /// Format a summary of the build report.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        if let Some(diff) = &self.diff {
            lines.push(diff.summary());
        }

        let ran = self.success_count();
        let skipped = self.skipped_count();
        match &self.outcome {
            BuildOutcome::Done if self.steps.is_empty() => {
                lines.push("Build succeeded: map is up to date".to_string());
            }
            BuildOutcome::Done => lines.push(format!(
                "Build succeeded: {} ran, {} skipped in {:?}",
                ran, skipped, self.total_duration
            )),
            BuildOutcome::Stopped(StopReason::Cancelled) => {
                lines.push(format!("Build cancelled after {} step(s)", ran));
            }
            BuildOutcome::Stopped(StopReason::Failed(err)) => {
                lines.push(format!("Build stopped: {}", err));
                for step in self.failures() {
                    lines.push(format!("  - {}: {}", step.label, step.status));
                }
            }
        }

        for artifact in &self.artifacts {
            lines.push(format!("  -> {}", artifact.display()));
        }

        lines.join("\n")
    }
}
